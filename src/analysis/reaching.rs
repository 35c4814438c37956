//! This module contains the reaching definitions analysis, a forward dataflow
//! analysis that determines which instructions may have produced each stack
//! slot that an instruction consumes.
//!
//! # Fixpoint
//!
//! The analysis simulates an [`AbstractStack`] through each block, starting
//! from the program entry with nothing modelled on the stack. The stack at the
//! end of a block is merged into the entry stack of each of its successors,
//! and any block whose entry stack changes is queued to be visited again.
//! Merging only ever grows the sets of producers and forgets constants, so
//! the analysis terminates unless the stack height grows around a loop. That
//! case is caught by bounding the number of block visits.
//!
//! # Successors
//!
//! Jump targets are resolved from the abstract stack itself. A target slot
//! with a statically-known constant names a single destination, while a slot
//! that merges several values names the destinations pushed by each of its
//! producers that is a `PUSH`. A destination is only valid if it begins a
//! block that starts with `JUMPDEST`.

use std::{
    collections::VecDeque,
    fmt::{Display, Formatter},
};

use ethnum::U256;
use itertools::Itertools;
use log::{debug, trace};

use crate::{
    analysis::{
        fold::{fold, is_foldable},
        stack::{AbstractStack, Constant, StackSlot, StackValue},
        Config,
    },
    error::{
        analysis::{Error, Result},
        container::Locatable,
    },
    opcode::{Flow, Opcode},
    program::{BlockId, Instruction, InstructionId, Program},
    watchdog::{DynWatchdog, Poller},
};

/// The stack slots that reach a program element, ordered from the top of the
/// stack down.
///
/// On an instruction these are the slots that it reads, of which there are
/// at least as many as it pops. On a block they are the abstract stack at the
/// entry to the block.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReachingDefinition {
    slots: Vec<StackSlot>,
}

impl ReachingDefinition {
    /// Constructs a reaching definition from `slots`, ordered from the top of
    /// the stack down.
    #[must_use]
    pub fn new(slots: Vec<StackSlot>) -> Self {
        Self { slots }
    }

    /// Gets the slots, ordered from the top of the stack down.
    #[must_use]
    pub fn slots(&self) -> &[StackSlot] {
        &self.slots
    }

    /// Gets the slot at `depth`, if there is one.
    #[must_use]
    pub fn slot(&self, depth: usize) -> Option<&StackSlot> {
        self.slots.get(depth)
    }

    /// Gets the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Checks if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl From<&AbstractStack> for ReachingDefinition {
    fn from(value: &AbstractStack) -> Self {
        Self::new(value.slots_top_first().cloned().collect())
    }
}

impl Display for ReachingDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.slots.iter().join(", "))
    }
}

/// Runs the reaching definitions analysis over `program`.
///
/// On success every instruction is annotated with the [`ReachingDefinition`]
/// of the slots that it reads, and every block with the
/// [`ReachingDefinition`] of its entry stack. Blocks that cannot be reached
/// from the program entry are analysed as if entered with nothing modelled on
/// the stack.
///
/// # Errors
///
/// Returns [`Err`] if the fixpoint does not converge within the visit budget
/// given by `config`, or if `watchdog` requests that analysis stop.
pub fn perform_reaching_analysis(
    program: &mut Program,
    config: &Config,
    watchdog: &DynWatchdog,
) -> Result<()> {
    let block_count = program.blocks().len();
    if block_count == 0 {
        return Ok(());
    }

    let entry_stacks = solve(program, config, watchdog)?;

    for (index, entry_stack) in entry_stacks.into_iter().enumerate() {
        let block = BlockId::new(index);
        let entry_stack = entry_stack.unwrap_or_else(|| {
            trace!("Block {index} is unreachable from the program entry");
            AbstractStack::new()
        });

        let mut definitions: Vec<(InstructionId, ReachingDefinition)> = Vec::new();
        simulate(program, block, entry_stack.clone(), |instruction, stack| {
            let slots = stack.top(instruction.opcode().arg_count());
            definitions.push((instruction.id(), ReachingDefinition::new(slots)));
        });

        for (id, definition) in definitions {
            if let Some(instruction) = program.instruction_mut(id) {
                instruction.annotations_mut().set(definition);
            }
        }
        if let Some(block) = program.block_mut(block) {
            block.annotations_mut().set(ReachingDefinition::from(&entry_stack));
        }
    }

    Ok(())
}

/// Computes the successors of `block` from the reaching definitions attached
/// to the program.
///
/// This returns no jump targets if the reaching definitions analysis has not
/// been run.
#[must_use]
pub fn successors(program: &Program, block: BlockId) -> Vec<BlockId> {
    let target = program
        .last_instruction(block)
        .and_then(|i| i.annotations().get::<ReachingDefinition>())
        .and_then(|definition| definition.slot(0));

    successors_with_target(program, block, target)
}

/// Runs the worklist to a fixpoint, returning the entry stack of every block
/// that is reachable from the program entry.
fn solve(
    program: &Program,
    config: &Config,
    watchdog: &DynWatchdog,
) -> Result<Vec<Option<AbstractStack>>> {
    let block_count = program.blocks().len();
    let limit = block_count.saturating_mul(config.max_block_visits_factor);

    let mut entry_stacks: Vec<Option<AbstractStack>> = vec![None; block_count];
    let mut queued = vec![false; block_count];
    let mut worklist = VecDeque::new();

    entry_stacks[0] = Some(AbstractStack::new());
    queued[0] = true;
    worklist.push_back(BlockId::new(0));

    let mut poller = Poller::new(watchdog.as_ref());
    while let Some(block) = worklist.pop_front() {
        queued[block.index()] = false;
        let stop = poller.tick();
        let block_offset = program.block(block).map_or(0, |b| b.offset());

        if poller.ticks() > limit {
            return Err(Error::CircularDependency {
                limit,
                blocks: block_count,
            }
            .locate(block_offset));
        }

        // If we have been told to stop, stop and return an error.
        if stop {
            return Err(Error::StoppedByWatchdog.locate(block_offset));
        }

        let entry_stack = entry_stacks[block.index()].clone().unwrap_or_default();
        let last = program.last_instruction(block).map(Instruction::id);
        let mut target: Option<StackSlot> = None;
        let exit_stack = simulate(program, block, entry_stack, |instruction, stack| {
            if Some(instruction.id()) == last && instruction.opcode().is_jump() {
                target = Some(stack.read(0));
            }
        });

        for successor in successors_with_target(program, block, target.as_ref()) {
            let entry = &mut entry_stacks[successor.index()];
            let changed = match entry {
                Some(existing) => existing.join(&exit_stack),
                None => {
                    *entry = Some(exit_stack.clone());
                    true
                }
            };

            if changed && !queued[successor.index()] {
                queued[successor.index()] = true;
                worklist.push_back(successor);
            }
        }
    }

    debug!(
        "Reaching definitions converged after {} visits over {block_count} blocks",
        poller.ticks()
    );

    Ok(entry_stacks)
}

/// Simulates `block` from `stack`, calling `observe` with each instruction and
/// the stack immediately before it executes, and returning the stack at the
/// end of the block.
fn simulate(
    program: &Program,
    block: BlockId,
    mut stack: AbstractStack,
    mut observe: impl FnMut(&Instruction, &AbstractStack),
) -> AbstractStack {
    for instruction in program.block_instructions(block) {
        observe(instruction, &stack);
        step(&mut stack, instruction);
    }

    stack
}

/// Applies the stack effect of `instruction` to `stack`.
fn step(stack: &mut AbstractStack, instruction: &Instruction) {
    let opcode = instruction.opcode();
    match opcode {
        Opcode::Dup(n) => stack.dup(usize::from(n) - 1),
        Opcode::Swap(n) => stack.swap(usize::from(n)),
        _ => {
            let operands = stack.pop_many(opcode.arg_count());
            let constant = constant_result(instruction, &operands);
            for index in 0..opcode.push_count() {
                let value = StackValue::Produced {
                    instruction: instruction.id(),
                    offset: instruction.offset(),
                    index,
                };
                let constant = if index == 0 {
                    constant
                } else {
                    Constant::Unknown
                };
                stack.push(StackSlot::new(value, constant));
            }
        }
    }
}

/// Computes the statically-known value pushed by `instruction` given the slots
/// it consumes.
fn constant_result(instruction: &Instruction, operands: &[StackSlot]) -> Constant {
    let opcode = instruction.opcode();
    if let Some(value) = instruction.immediate_value() {
        return Constant::Exact(value);
    }
    if opcode == Opcode::PC {
        return Constant::Exact(U256::from(instruction.offset() as u64));
    }
    if !is_foldable(opcode) {
        return Constant::Unknown;
    }

    operands
        .iter()
        .map(|slot| slot.constant().exact())
        .collect::<Option<Vec<_>>>()
        .and_then(|words| fold(opcode, &words))
        .map_or(Constant::Unknown, Constant::Exact)
}

/// Computes the successors of `block` given the slot holding the target of
/// the jump that ends it, if it ends with one.
fn successors_with_target(
    program: &Program,
    block: BlockId,
    target: Option<&StackSlot>,
) -> Vec<BlockId> {
    let Some(last) = program.last_instruction(block) else {
        return Vec::new();
    };
    let flow = last.opcode().flow();
    let mut successors = Vec::new();

    if matches!(flow, Flow::Jump | Flow::ConditionalJump) {
        if let Some(target) = target {
            successors.extend(jump_targets(program, target));
        }
        if successors.is_empty() {
            trace!("Unresolved jump target at 0x{:x}", last.offset());
        }
    }

    if flow.falls_through() {
        if let Some(next) = program.next_block(block) {
            successors.push(next);
        }
    }

    successors.into_iter().unique().collect()
}

/// Resolves the blocks that a jump whose target is held in `slot` may land
/// on.
fn jump_targets(program: &Program, slot: &StackSlot) -> Vec<BlockId> {
    if let Some(offset) = slot.constant().exact() {
        return program.jump_destination(offset).into_iter().collect();
    }

    slot.producing_instructions()
        .filter_map(|id| program.instruction(id))
        .filter_map(Instruction::immediate_value)
        .filter_map(|offset| program.jump_destination(offset))
        .unique()
        .collect()
}

#[cfg(test)]
mod test {
    use std::sync::{atomic::AtomicBool, Arc};

    use ethnum::U256;

    use crate::{
        analysis::{
            reaching::{perform_reaching_analysis, successors, ReachingDefinition},
            stack::{Constant, StackValue},
            Config,
        },
        bytecode,
        error::analysis::Error,
        opcode::{Opcode, PushN},
        program::{BlockId, InstructionId, Program},
        watchdog::{FlagWatchdog, LazyWatchdog},
    };

    mod util {
        use crate::{
            analysis::{reaching::perform_reaching_analysis, Config},
            error::analysis::Result,
            program::Program,
            watchdog::LazyWatchdog,
        };

        /// Disassembles `bytes` and runs the analysis with the default
        /// configuration.
        pub fn analyze(bytes: &[u8]) -> Result<Program> {
            let mut program = Program::new(bytes);
            perform_reaching_analysis(&mut program, &Config::default(), &LazyWatchdog.in_rc())?;
            Ok(program)
        }
    }

    fn reaching_at(program: &Program, offset: usize) -> &ReachingDefinition {
        program
            .instructions()
            .iter()
            .find(|i| i.offset() == offset)
            .and_then(|i| i.annotations().get::<ReachingDefinition>())
            .expect("Instruction was not annotated")
    }

    fn producers_of(definition: &ReachingDefinition, depth: usize) -> Vec<usize> {
        definition
            .slot(depth)
            .expect("Slot was missing")
            .producers()
            .iter()
            .filter_map(|value| match value {
                StackValue::Produced { offset, .. } => Some(*offset),
                StackValue::External => None,
            })
            .collect()
    }

    #[test]
    fn straight_line_code_names_its_producers() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?,
            PushN::new(1, vec![0x02])?,
            Opcode::Add,
            Opcode::Stop,
        ];
        let program = util::analyze(&bytes)?;

        let add = reaching_at(&program, 0x04);
        assert_eq!(add.len(), 2);
        assert_eq!(producers_of(add, 0), vec![0x02]);
        assert_eq!(producers_of(add, 1), vec![0x00]);
        assert_eq!(
            add.slot(0).map(|s| s.constant()),
            Some(Constant::Exact(U256::new(2)))
        );

        let stop = reaching_at(&program, 0x05);
        assert!(stop.is_empty());

        Ok(())
    }

    #[test]
    fn every_instruction_and_block_is_annotated() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x04])?,
            Opcode::Jump,
            Opcode::Invalid(0xfe),
            Opcode::JumpDest,
            Opcode::Stop,
        ];
        let program = util::analyze(&bytes)?;

        assert!(program
            .instructions()
            .iter()
            .all(|i| i.annotations().contains::<ReachingDefinition>()));
        assert!(program
            .blocks()
            .iter()
            .all(|b| b.annotations().contains::<ReachingDefinition>()));

        Ok(())
    }

    #[test]
    fn merges_values_from_converging_paths() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::CallValue,          // 0x00
            PushN::new(1, vec![0x0a])?, // 0x01
            Opcode::JumpI,              // 0x03
            PushN::new(1, vec![0x05])?, // 0x04
            PushN::new(1, vec![0x0d])?, // 0x06
            Opcode::Jump,               // 0x08
            Opcode::Invalid(0xfe),      // 0x09
            Opcode::JumpDest,           // 0x0a
            PushN::new(1, vec![0x07])?, // 0x0b
            Opcode::JumpDest,           // 0x0d
            Opcode::Pop,                // 0x0e
            Opcode::Stop,               // 0x0f
        ];
        let program = util::analyze(&bytes)?;

        let pop = reaching_at(&program, 0x0e);
        assert_eq!(producers_of(pop, 0), vec![0x04, 0x0b]);
        assert_eq!(pop.slot(0).map(|s| s.constant()), Some(Constant::Unknown));
        assert!(!pop.slot(0).is_some_and(|s| s.may_be_external()));

        let merge = program.block_at(0x0d).expect("Block was missing");
        let entry = program.blocks()[merge.index()]
            .annotations()
            .get::<ReachingDefinition>()
            .expect("Block was not annotated");
        assert_eq!(entry.len(), 1);

        Ok(())
    }

    #[test]
    fn resolves_ambiguous_jumps_through_push_producers() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::CallValue,          // 0x00
            PushN::new(1, vec![0x0a])?, // 0x01
            Opcode::JumpI,              // 0x03
            PushN::new(1, vec![0x10])?, // 0x04
            PushN::new(1, vec![0x0d])?, // 0x06
            Opcode::Jump,               // 0x08
            Opcode::Invalid(0xfe),      // 0x09
            Opcode::JumpDest,           // 0x0a
            PushN::new(1, vec![0x12])?, // 0x0b
            Opcode::JumpDest,           // 0x0d
            Opcode::Jump,               // 0x0e
            Opcode::Invalid(0xfe),      // 0x0f
            Opcode::JumpDest,           // 0x10
            Opcode::Stop,               // 0x11
            Opcode::JumpDest,           // 0x12
            Opcode::Stop,               // 0x13
        ];
        let program = util::analyze(&bytes)?;

        let merge = program.block_at(0x0d).expect("Block was missing");
        let targets: Vec<usize> = successors(&program, merge)
            .into_iter()
            .map(|b| program.blocks()[b.index()].offset())
            .collect();
        assert_eq!(targets, vec![0x10, 0x12]);

        let entry = program.block_at(0x00).expect("Block was missing");
        let targets: Vec<usize> = successors(&program, entry)
            .into_iter()
            .map(|b| program.blocks()[b.index()].offset())
            .collect();
        assert_eq!(targets, vec![0x0a, 0x04]);

        Ok(())
    }

    #[test]
    fn jumps_to_non_jumpdest_offsets_have_no_successors() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x03])?,
            Opcode::Jump,
            Opcode::Stop,
            Opcode::Stop,
        ];
        let program = util::analyze(&bytes)?;

        assert!(successors(&program, BlockId::new(0)).is_empty());

        Ok(())
    }

    #[test]
    fn folds_constants_into_jump_targets() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x02])?, // 0x00
            PushN::new(1, vec![0x04])?, // 0x02
            Opcode::Add,                // 0x04
            Opcode::Jump,               // 0x05
            Opcode::JumpDest,           // 0x06
            Opcode::Stop,               // 0x07
        ];
        let program = util::analyze(&bytes)?;

        let jump = reaching_at(&program, 0x05);
        assert_eq!(
            jump.slot(0).map(|s| s.constant()),
            Some(Constant::Exact(U256::new(6)))
        );
        assert_eq!(successors(&program, BlockId::new(0)), vec![BlockId::new(1)]);

        Ok(())
    }

    #[test]
    fn dup_and_swap_move_values_without_producing_them() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?, // 0x00
            PushN::new(1, vec![0x02])?, // 0x02
            Opcode::Swap(1),            // 0x04
            Opcode::Dup(2),             // 0x05
            Opcode::Add,                // 0x06
            Opcode::Stop,               // 0x07
        ];
        let program = util::analyze(&bytes)?;

        let swap = reaching_at(&program, 0x04);
        assert_eq!(swap.len(), 2);

        // After the swap, 0x00 is on top and 0x02 below it. The dup copies
        // 0x02 to the top.
        let add = reaching_at(&program, 0x06);
        assert_eq!(producers_of(add, 0), vec![0x02]);
        assert_eq!(producers_of(add, 1), vec![0x00]);

        Ok(())
    }

    #[test]
    fn reading_below_the_entry_stack_gives_external_values() -> anyhow::Result<()> {
        let bytes = bytecode![Opcode::Add, Opcode::Stop];
        let program = util::analyze(&bytes)?;

        let add = reaching_at(&program, 0x00);
        assert!(add.slots().iter().all(|s| s.may_be_external()));
        assert_eq!(add.to_string(), "[?, ?]");

        Ok(())
    }

    #[test]
    fn converging_loops_are_analyzed() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::JumpDest,
            PushN::new(1, vec![0x00])?,
            Opcode::Jump,
        ];
        let program = util::analyze(&bytes)?;

        let jump = reaching_at(&program, 0x03);
        assert_eq!(producers_of(jump, 0), vec![0x01]);

        Ok(())
    }

    #[test]
    fn keeps_values_left_below_a_shallower_path() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::CallValue,          // 0x00
            PushN::new(1, vec![0x07])?, // 0x01
            Opcode::JumpI,              // 0x03
            Opcode::Caller,             // 0x04
            Opcode::Dup(1),             // 0x05
            Opcode::Pop,                // 0x06
            Opcode::JumpDest,           // 0x07
            Opcode::Pop,                // 0x08
            Opcode::Stop,               // 0x09
        ];
        let program = util::analyze(&bytes)?;

        let pop = reaching_at(&program, 0x08);
        assert_eq!(producers_of(pop, 0), vec![0x04]);
        assert!(pop.slot(0).is_some_and(|s| s.may_be_external()));
        assert_eq!(pop.slot(0).map(|s| s.constant()), Some(Constant::Unknown));

        Ok(())
    }

    #[test]
    fn loops_that_grow_the_stack_converge() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::JumpDest,
            Opcode::Caller,
            PushN::new(1, vec![0x00])?,
            Opcode::Jump,
        ];
        let program = util::analyze(&bytes)?;

        let entry = program.blocks()[0]
            .annotations()
            .get::<ReachingDefinition>()
            .expect("Block was not annotated");
        assert!(entry.is_empty());

        Ok(())
    }

    #[test]
    fn loops_with_changing_values_converge() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?, // 0x00
            Opcode::JumpDest,           // 0x02
            Opcode::Pop,                // 0x03
            PushN::new(1, vec![0x02])?, // 0x04
            PushN::new(1, vec![0x02])?, // 0x06
            Opcode::Jump,               // 0x08
        ];
        let program = util::analyze(&bytes)?;

        let pop = reaching_at(&program, 0x03);
        assert_eq!(producers_of(pop, 0), vec![0x00, 0x04]);
        assert_eq!(pop.slot(0).map(|s| s.constant()), Some(Constant::Unknown));

        Ok(())
    }

    #[test]
    fn exceeding_the_visit_budget_is_a_circular_dependency() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?, // 0x00
            Opcode::JumpDest,           // 0x02
            Opcode::Pop,                // 0x03
            PushN::new(1, vec![0x02])?, // 0x04
            PushN::new(1, vec![0x02])?, // 0x06
            Opcode::Jump,               // 0x08
        ];
        let mut program = Program::new(&bytes);
        let config = Config::default().with_max_block_visits_factor(1);
        let error =
            perform_reaching_analysis(&mut program, &config, &LazyWatchdog.in_rc()).unwrap_err();

        assert_eq!(error.location, 0x02);
        assert_eq!(
            error.payload,
            Error::CircularDependency {
                limit:  2,
                blocks: 2,
            }
        );

        Ok(())
    }

    #[test]
    fn stops_when_the_watchdog_says_so() -> anyhow::Result<()> {
        let bytes = bytecode![PushN::new(1, vec![0x01])?, Opcode::Stop];
        let mut program = Program::new(&bytes);
        let watchdog = FlagWatchdog::new(Arc::new(AtomicBool::new(true)))
            .polling_every(1)
            .in_rc();
        let error =
            perform_reaching_analysis(&mut program, &Config::default(), &watchdog).unwrap_err();

        assert_eq!(error.payload, Error::StoppedByWatchdog);
        assert!(!program.instructions()[0]
            .annotations()
            .contains::<ReachingDefinition>());

        Ok(())
    }

    #[test]
    fn empty_programs_are_trivially_analyzed() -> anyhow::Result<()> {
        let program = util::analyze(&[])?;
        assert!(program.is_empty());

        Ok(())
    }

    #[test]
    fn producers_are_identified_by_instruction() -> anyhow::Result<()> {
        let bytes = bytecode![PushN::new(2, vec![0x01, 0x02])?, Opcode::Pop];
        let program = util::analyze(&bytes)?;

        let pop = reaching_at(&program, 0x03);
        assert_eq!(
            pop.slot(0).and_then(|s| s.single_producer()),
            Some(InstructionId::new(0))
        );

        Ok(())
    }
}
