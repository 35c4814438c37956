//! This module contains the reaches analysis, which inverts the reaching
//! definitions to record, for each instruction, the sites at which the values
//! it produces are read.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use itertools::Itertools;
use log::debug;

use crate::{
    analysis::reaching::ReachingDefinition,
    error::{
        analysis::{Error, Result},
        container::Locatable,
    },
    program::{InstructionId, Program},
};

/// A place where a stack value is read: slot `slot` (counting from the top of
/// the stack) of the instruction `consumer`.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StackSite {
    pub consumer: InstructionId,
    pub slot:     usize,
}

impl Display for StackSite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.consumer, self.slot)
    }
}

/// The sites at which the value produced by an instruction may be read.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReachesSet {
    sites: BTreeSet<StackSite>,
}

impl ReachesSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the value is read at `site`.
    pub fn insert(&mut self, site: StackSite) -> bool {
        self.sites.insert(site)
    }

    /// Checks if the value is read at `site`.
    #[must_use]
    pub fn contains(&self, site: &StackSite) -> bool {
        self.sites.contains(site)
    }

    /// Gets the sites in order of consumer and then slot.
    pub fn sites(&self) -> impl Iterator<Item = &StackSite> {
        self.sites.iter()
    }

    /// Gets the number of sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Checks if the value is never read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Gets the sites whose consumer actually uses the value, rather than
    /// merely moving it on the stack as `DUPN` and `SWAPN` do.
    pub fn consuming_sites<'a>(
        &'a self,
        program: &'a Program,
    ) -> impl Iterator<Item = &'a StackSite> + 'a {
        self.sites.iter().filter(|site| {
            program
                .instruction(site.consumer)
                .is_some_and(|i| !i.opcode().is_stack_manipulation())
        })
    }
}

impl Display for ReachesSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.sites.iter().join(", "))
    }
}

/// Runs the reaches analysis over `program`.
///
/// Every instruction is annotated with a [`ReachesSet`], which is empty if
/// its values are never read. Any sets from a previous run are replaced.
///
/// # Errors
///
/// Returns [`Err`] if an instruction has no [`ReachingDefinition`], or if one
/// names a producer that is not in the program.
pub fn perform_reaches_analysis(program: &mut Program) -> Result<()> {
    let mut sets = vec![ReachesSet::new(); program.instructions().len()];

    for instruction in program.instructions() {
        let reaching = instruction
            .annotations()
            .get::<ReachingDefinition>()
            .ok_or(Error::MissingAnnotation {
                pass:        "reaches",
                requirement: "reaching definition",
            })
            .locate(instruction.offset())?;

        for (slot, stack_slot) in reaching.slots().iter().enumerate() {
            for producer in stack_slot.producing_instructions() {
                let set = sets
                    .get_mut(producer.index())
                    .ok_or(Error::MissingProducer {
                        producer: producer.index(),
                    })
                    .locate(instruction.offset())?;
                set.insert(StackSite {
                    consumer: instruction.id(),
                    slot,
                });
            }
        }
    }

    let mut site_count = 0;
    for (index, set) in sets.into_iter().enumerate() {
        site_count += set.len();
        if let Some(instruction) = program.instruction_mut(InstructionId::new(index)) {
            instruction.annotations_mut().set(set);
        }
    }
    debug!("Recorded {site_count} reaching sites");

    Ok(())
}
