//! This module contains the creation of symbolic labels for the jump
//! destinations that are known statically.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use log::debug;

use crate::{
    analysis::reaching::ReachingDefinition,
    error::{
        analysis::{Error, Result},
        container::Locatable,
    },
    program::{BlockId, Program},
};

/// A symbolic name for a block that is the target of a statically-known jump.
///
/// The name is derived from the offset of the block alone, so it is stable
/// across runs and unique within a program.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JumpLabel {
    offset: usize,
    name:   String,
}

impl JumpLabel {
    /// Constructs the label for the block at `offset`.
    #[must_use]
    pub fn for_offset(offset: usize) -> Self {
        let name = format!("label_0x{offset:x}");
        Self { offset, name }
    }

    /// Gets the offset of the labelled block.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Gets the name of the label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for JumpLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Labels every block that some `JUMP` or `JUMPI` in `program` targets with a
/// statically-known offset.
///
/// Jumps whose target is not known exactly, or whose target is not the start
/// of a block beginning with `JUMPDEST`, are left unlabelled.
///
/// # Errors
///
/// Returns [`Err`] if a jump has no [`ReachingDefinition`].
pub fn create_labels(program: &mut Program) -> Result<()> {
    let mut targets: BTreeSet<BlockId> = BTreeSet::new();

    for instruction in program.instructions() {
        if !instruction.opcode().is_jump() {
            continue;
        }
        let reaching = instruction
            .annotations()
            .get::<ReachingDefinition>()
            .ok_or(Error::MissingAnnotation {
                pass:        "labels",
                requirement: "reaching definition",
            })
            .locate(instruction.offset())?;

        let target = reaching
            .slot(0)
            .and_then(|slot| slot.constant().exact())
            .and_then(|offset| program.jump_destination(offset));
        if let Some(target) = target {
            targets.insert(target);
        }
    }

    debug!("Labelling {} jump destinations", targets.len());
    for target in targets {
        if let Some(block) = program.block_mut(target) {
            let label = JumpLabel::for_offset(block.offset());
            block.annotations_mut().set(label);
        }
    }

    Ok(())
}
