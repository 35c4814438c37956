//! This module contains the abstract stack that the reaching definitions
//! analysis simulates over each block.
//!
//! # Indexing
//!
//! Indexing into this stack is zero-based, where slot 0 is the top of the
//! stack. Only the top of the stack is modelled slot by slot. Everything below
//! it is summarised by a single floor slot, which holds every value that may
//! sit anywhere down there. On a fresh stack the floor is just
//! [`StackValue::External`], a value from before the analysed region began.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use ethnum::U256;
use itertools::Itertools;

use crate::{constant::MAXIMUM_STACK_DEPTH, program::InstructionId};

/// A reference to a value that may occupy a stack slot.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StackValue {
    /// The value was on the stack before the analysed region began.
    External,

    /// The value was pushed by `instruction`, which sits at `offset` in the
    /// bytecode.
    ///
    /// The `index` disambiguates between the values of an instruction that
    /// pushes more than once, counting from the first value pushed.
    Produced {
        instruction: InstructionId,
        offset:      usize,
        index:       usize,
    },
}

impl StackValue {
    /// Constructs a reference to the first value pushed by `instruction`.
    #[must_use]
    pub fn produced(instruction: InstructionId, offset: usize) -> Self {
        Self::Produced {
            instruction,
            offset,
            index: 0,
        }
    }

    /// Gets the instruction that produced the value, if it is not external.
    #[must_use]
    pub fn producer(&self) -> Option<InstructionId> {
        match self {
            Self::External => None,
            Self::Produced { instruction, .. } => Some(*instruction),
        }
    }
}

impl Display for StackValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::External => write!(f, "?"),
            Self::Produced { offset, index, .. } => {
                write!(f, "@0x{offset:x}")?;
                if *index > 0 {
                    write!(f, ".{index}")?;
                }
                Ok(())
            }
        }
    }
}

/// The statically-known value of a stack slot.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum Constant {
    /// The slot holds exactly this word on every path.
    Exact(U256),

    /// Nothing is known about the word in the slot.
    #[default]
    Unknown,
}

impl Constant {
    /// Gets the word if it is known exactly.
    #[must_use]
    pub fn exact(self) -> Option<U256> {
        match self {
            Self::Exact(value) => Some(value),
            Self::Unknown => None,
        }
    }

    /// Computes the least upper bound of `self` and `other`.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) if a == b => self,
            _ => Self::Unknown,
        }
    }
}

/// The possible contents of a single stack slot.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StackSlot {
    producers: BTreeSet<StackValue>,
    constant:  Constant,
}

impl StackSlot {
    /// Constructs a slot holding a value from before the analysed region.
    #[must_use]
    pub fn external() -> Self {
        let producers = BTreeSet::from([StackValue::External]);
        let constant = Constant::Unknown;
        Self {
            producers,
            constant,
        }
    }

    /// Constructs a slot holding the single `value` with the known `constant`.
    #[must_use]
    pub fn new(value: StackValue, constant: Constant) -> Self {
        let producers = BTreeSet::from([value]);
        Self {
            producers,
            constant,
        }
    }

    /// Gets the values that may occupy the slot.
    #[must_use]
    pub fn producers(&self) -> &BTreeSet<StackValue> {
        &self.producers
    }

    /// Gets the statically-known word in the slot.
    #[must_use]
    pub fn constant(&self) -> Constant {
        self.constant
    }

    /// Gets the instructions that may have produced the value in the slot.
    pub fn producing_instructions(&self) -> impl Iterator<Item = InstructionId> + '_ {
        self.producers.iter().filter_map(StackValue::producer)
    }

    /// Gets the producing instruction if the slot is occupied by exactly one
    /// value, and that value is not external.
    #[must_use]
    pub fn single_producer(&self) -> Option<InstructionId> {
        self.producers
            .iter()
            .exactly_one()
            .ok()
            .and_then(StackValue::producer)
    }

    /// Checks if the value in the slot may pre-date the analysed region.
    #[must_use]
    pub fn may_be_external(&self) -> bool {
        self.producers.contains(&StackValue::External)
    }

    /// Merges `other` into `self`, returning `true` if `self` changed.
    pub fn join(&mut self, other: &Self) -> bool {
        let size_before = self.producers.len();
        self.producers.extend(other.producers.iter().copied());
        let constant = self.constant.join(other.constant);
        let changed = self.producers.len() != size_before || constant != self.constant;
        self.constant = constant;

        changed
    }
}

impl Display for StackSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.producers.len() == 1 {
            write!(f, "{}", self.producers.iter().join(""))
        } else {
            write!(f, "[{}]", self.producers.iter().join("|"))
        }
    }
}

/// The abstract stack at one point in a block.
///
/// The stack models at most [`MAXIMUM_STACK_DEPTH`] slots. Pushing beyond that
/// depth folds the bottom slot into the floor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AbstractStack {
    // Bottom first.
    slots: Vec<StackSlot>,

    /// Every value that may occupy a slot below `slots`.
    floor: StackSlot,
}

impl Default for AbstractStack {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            floor: StackSlot::external(),
        }
    }
}

impl AbstractStack {
    /// Creates a stack with no modelled slots, so every slot reads as
    /// external.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stack from `slots`, ordered from the top of the stack down.
    #[must_use]
    pub fn from_top_first(slots: impl IntoIterator<Item = StackSlot>) -> Self {
        let mut slots: Vec<StackSlot> = slots.into_iter().collect();
        slots.reverse();
        Self {
            slots,
            ..Self::default()
        }
    }

    /// Gets the number of modelled slots.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Checks if no slots are modelled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Gets the slot that stands for everything below the modelled slots.
    #[must_use]
    pub fn floor(&self) -> &StackSlot {
        &self.floor
    }

    /// Gets the modelled slots, ordered from the top of the stack down.
    pub fn slots_top_first(&self) -> impl Iterator<Item = &StackSlot> {
        self.slots.iter().rev()
    }

    /// Reads the slot at `depth`, where depth 0 is the top of the stack.
    #[must_use]
    pub fn read(&self, depth: usize) -> StackSlot {
        self.slots
            .len()
            .checked_sub(depth + 1)
            .map_or_else(|| self.floor.clone(), |index| self.slots[index].clone())
    }

    /// Reads the top `count` slots, ordered from the top of the stack down.
    #[must_use]
    pub fn top(&self, count: usize) -> Vec<StackSlot> {
        (0..count).map(|depth| self.read(depth)).collect()
    }

    /// Pushes `slot` onto the top of the stack.
    pub fn push(&mut self, slot: StackSlot) {
        if self.slots.len() >= MAXIMUM_STACK_DEPTH {
            let bottom = self.slots.remove(0);
            self.floor.join(&bottom);
        }
        self.slots.push(slot);
    }

    /// Pops the top slot from the stack, which is the floor if the modelled
    /// part of the stack is exhausted.
    pub fn pop(&mut self) -> StackSlot {
        self.slots.pop().unwrap_or_else(|| self.floor.clone())
    }

    /// Pops `count` slots from the stack, ordered from the top of the stack
    /// down.
    pub fn pop_many(&mut self, count: usize) -> Vec<StackSlot> {
        (0..count).map(|_| self.pop()).collect()
    }

    /// Duplicates the slot at `depth` onto the top of the stack, as `DUPN`
    /// does for `N = depth + 1`.
    pub fn dup(&mut self, depth: usize) {
        let slot = self.read(depth);
        self.push(slot);
    }

    /// Swaps the top slot with the slot at `depth`, as `SWAPN` does for
    /// `N = depth`.
    pub fn swap(&mut self, depth: usize) {
        if depth == 0 {
            return;
        }
        self.materialize(depth + 1);
        let top = self.slots.len() - 1;
        self.slots.swap(top, top - depth);
    }

    /// Merges `other` into `self`, returning `true` if `self` changed.
    ///
    /// The stacks are aligned at the top and joined slot by slot down to the
    /// depth of the shallower one. Any slots of the deeper one below that are
    /// joined into the floor, so no producer is lost, and the modelled depth
    /// never grows.
    pub fn join(&mut self, other: &Self) -> bool {
        let depth = self.depth().min(other.depth());
        let mut changed = false;

        let excess = self.depth() - depth;
        for slot in self.slots.drain(..excess) {
            self.floor.join(&slot);
            changed = true;
        }
        let other_excess = other.depth() - depth;
        for slot in &other.slots[..other_excess] {
            changed |= self.floor.join(slot);
        }
        changed |= self.floor.join(&other.floor);

        for (self_slot, other_slot) in self.slots.iter_mut().zip(&other.slots[other_excess..]) {
            changed |= self_slot.join(other_slot);
        }

        changed
    }

    /// Ensures that at least `depth` slots are modelled, filling them from the
    /// floor at the bottom as needed.
    fn materialize(&mut self, depth: usize) {
        let depth = depth.min(MAXIMUM_STACK_DEPTH);
        if self.slots.len() < depth {
            let missing = depth - self.slots.len();
            let floor = self.floor.clone();
            self.slots.splice(0..0, std::iter::repeat(floor).take(missing));
        }
    }
}

impl Display for AbstractStack {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}", self.slots_top_first().join(", "))?;
        if self.floor != StackSlot::external() {
            let separator = if self.slots.is_empty() { "" } else { ", " };
            write!(f, "{separator}..{}", self.floor)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::{
        analysis::stack::{AbstractStack, Constant, StackSlot, StackValue},
        constant::MAXIMUM_STACK_DEPTH,
        program::InstructionId,
    };

    fn slot(index: usize, value: u64) -> StackSlot {
        StackSlot::new(
            StackValue::produced(InstructionId::new(index), index),
            Constant::Exact(U256::from(value)),
        )
    }

    #[test]
    fn reads_below_the_model_are_external() {
        let stack = AbstractStack::new();
        assert_eq!(stack.read(0), StackSlot::external());
        assert_eq!(stack.read(7), StackSlot::external());
        assert!(stack.read(3).may_be_external());
    }

    #[test]
    fn can_push_and_pop() {
        let mut stack = AbstractStack::new();
        stack.push(slot(0, 1));
        stack.push(slot(1, 2));

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop(), slot(1, 2));
        assert_eq!(stack.pop(), slot(0, 1));
        assert_eq!(stack.pop(), StackSlot::external());
    }

    #[test]
    fn can_dup_and_swap() {
        let mut stack = AbstractStack::from_top_first([slot(1, 2), slot(0, 1)]);
        stack.dup(1);
        assert_eq!(stack.top(3), vec![slot(0, 1), slot(1, 2), slot(0, 1)]);

        stack.swap(2);
        assert_eq!(stack.top(3), vec![slot(0, 1), slot(1, 2), slot(0, 1)]);

        stack.swap(1);
        assert_eq!(stack.top(3), vec![slot(1, 2), slot(0, 1), slot(0, 1)]);
    }

    #[test]
    fn swap_below_the_model_brings_up_an_external_value() {
        let mut stack = AbstractStack::from_top_first([slot(0, 1)]);
        stack.swap(2);

        assert_eq!(stack.depth(), 3);
        assert_eq!(stack.read(0), StackSlot::external());
        assert_eq!(stack.read(2), slot(0, 1));
    }

    #[test]
    fn join_unions_producers_and_forgets_differing_constants() {
        let mut left = AbstractStack::from_top_first([slot(0, 1), slot(2, 5)]);
        let right = AbstractStack::from_top_first([slot(1, 9), slot(2, 5)]);

        assert!(left.join(&right));
        let top = left.read(0);
        assert_eq!(top.producers().len(), 2);
        assert_eq!(top.constant(), Constant::Unknown);
        assert_eq!(left.read(1), slot(2, 5));

        // Joining again is a no-op.
        assert!(!left.join(&right));
    }

    #[test]
    fn join_keeps_agreeing_constants() {
        let mut left = AbstractStack::from_top_first([slot(0, 4)]);
        let right = AbstractStack::from_top_first([slot(1, 4)]);
        left.join(&right);

        assert_eq!(left.read(0).constant(), Constant::Exact(U256::from(4u64)));
    }

    #[test]
    fn join_keeps_producers_from_below_the_shallower_stack() {
        let mut left = AbstractStack::from_top_first([slot(1, 2), slot(2, 3)]);
        let right = AbstractStack::from_top_first([slot(0, 1)]);

        assert!(left.join(&right));
        assert_eq!(left.depth(), 1);
        assert!(left.read(0).producing_instructions().eq([
            InstructionId::new(0),
            InstructionId::new(1)
        ]));

        // The slot cut off from the deeper stack may still be read below.
        let below = left.read(1);
        assert!(below.may_be_external());
        assert!(below.producing_instructions().eq([InstructionId::new(2)]));
        assert_eq!(below.constant(), Constant::Unknown);
        assert_eq!(left.read(5), below);
    }

    #[test]
    fn joining_a_deeper_stack_extends_the_floor() {
        let mut shallow = AbstractStack::new();
        let deep = AbstractStack::from_top_first([slot(4, 1)]);

        assert!(shallow.join(&deep));
        assert_eq!(shallow.depth(), 0);
        assert!(shallow.pop().producers().iter().eq(&[
            StackValue::External,
            StackValue::produced(InstructionId::new(4), 4)
        ]));

        // Both sides agree now, so nothing else changes.
        assert!(!shallow.join(&deep));
    }

    #[test]
    fn swap_below_the_model_brings_up_the_floor() {
        let mut stack = AbstractStack::new();
        stack.join(&AbstractStack::from_top_first([slot(4, 1)]));
        stack.push(slot(0, 7));
        stack.swap(1);

        assert!(stack.read(0).producing_instructions().eq([InstructionId::new(4)]));
        assert_eq!(stack.read(1), slot(0, 7));
    }

    #[test]
    fn pushing_beyond_the_maximum_depth_keeps_the_bottom_in_the_floor() {
        let mut stack = AbstractStack::new();
        for i in 0..=MAXIMUM_STACK_DEPTH {
            stack.push(slot(i, i as u64));
        }

        assert_eq!(stack.depth(), MAXIMUM_STACK_DEPTH);
        assert_eq!(stack.read(MAXIMUM_STACK_DEPTH - 1), slot(1, 1));
        assert!(stack.floor().producing_instructions().eq([InstructionId::new(0)]));
    }

    #[test]
    fn displays_slots_top_first() {
        let mut stack = AbstractStack::from_top_first([slot(0x1f, 0), StackSlot::external()]);
        assert_eq!(stack.to_string(), "[@0x1f, ?]");

        stack.join(&AbstractStack::from_top_first([slot(0x03, 0)]));
        assert_eq!(stack.to_string(), "[[@0x3|@0x1f]]");

        let mut empty = AbstractStack::new();
        empty.join(&AbstractStack::from_top_first([slot(0x04, 0)]));
        assert_eq!(empty.to_string(), "[..[?|@0x4]]");
    }

    #[test]
    fn single_producer_ignores_external_and_ambiguous_slots() {
        assert_eq!(slot(3, 0).single_producer(), Some(InstructionId::new(3)));
        assert_eq!(StackSlot::external().single_producer(), None);

        let mut ambiguous = slot(3, 0);
        ambiguous.join(&slot(4, 0));
        assert_eq!(ambiguous.single_producer(), None);
    }
}
