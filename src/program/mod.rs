//! This module contains the [`Program`], the representation of a sequence of
//! bytecode instructions partitioned into basic blocks, along with the
//! [`Block`] and [`Instruction`] types that it owns.
//!
//! # Ownership and Handles
//!
//! The program is the sole owner of its instructions and blocks. Instructions
//! live in a single flat table in bytecode order, and each block describes a
//! contiguous run of that table. Analysis results refer to instructions and
//! blocks through [`InstructionId`] and [`BlockId`], which are stable indices
//! into these tables for the lifetime of the program.
//!
//! # Byte-Instruction Correspondence
//!
//! Where most opcodes occupy a single byte, the `PUSHN` opcodes are followed in
//! the bytecode by `N` bytes of immediate data. These are stored on the
//! instruction, and the offset of each instruction is its true byte offset in
//! the bytecode.

mod builder;

use std::{
    fmt::{Display, Formatter},
    ops::Range,
};

use ethnum::U256;

pub use builder::disassemble;

use crate::{
    annotation::Annotations,
    error::{container::Locatable, disassembly},
    opcode::{word_from_be_slice, Opcode},
};

/// A stable handle to an instruction in a [`Program`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstructionId(usize);

impl InstructionId {
    /// Constructs a handle to the instruction at `index` in the program's
    /// instruction table.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Gets the index of the instruction in the program's instruction table.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for InstructionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A stable handle to a block in a [`Program`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlockId(usize);

impl BlockId {
    /// Constructs a handle to the block at `index` in the program's block
    /// table.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Gets the index of the block in the program's block table.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single decoded instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    id:          InstructionId,
    block:       BlockId,
    offset:      usize,
    opcode:      Opcode,
    immediate:   Vec<u8>,
    annotations: Annotations,
}

impl Instruction {
    /// Gets the handle for this instruction.
    #[must_use]
    pub fn id(&self) -> InstructionId {
        self.id
    }

    /// Gets the handle for the block that contains this instruction.
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Gets the byte offset of the instruction in the bytecode.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Gets the opcode of the instruction.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Gets the immediate operand bytes that follow the opcode.
    ///
    /// These may be fewer than [`Opcode::operand_size`] if the bytecode ended
    /// before the operand was complete.
    #[must_use]
    pub fn immediate(&self) -> &[u8] {
        &self.immediate
    }

    /// Checks if the bytecode ended before the immediate operand was complete.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.immediate.len() < self.opcode.operand_size()
    }

    /// Gets the number of bytes that the instruction occupies in the bytecode.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.immediate.len()
    }

    /// Gets the range of bytes that the instruction occupies in the bytecode.
    #[must_use]
    pub fn byte_range(&self) -> Range<usize> {
        self.offset..self.offset + self.size()
    }

    /// Gets the value that the instruction pushes from its immediate, if it is
    /// a push.
    ///
    /// A truncated immediate is treated as the EVM treats it: the missing
    /// trailing bytes read as zero.
    #[must_use]
    pub fn immediate_value(&self) -> Option<U256> {
        match self.opcode {
            Opcode::Push0 => Some(U256::ZERO),
            Opcode::Push(_) => {
                let mut bytes = self.immediate.clone();
                bytes.resize(self.opcode.operand_size(), 0x0);
                Some(word_from_be_slice(&bytes))
            }
            _ => None,
        }
    }

    /// Gets the analysis results attached to this instruction.
    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// Gets the analysis results attached to this instruction for
    /// modification.
    pub fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }

    /// Encodes the instruction back to the bytes it was decoded from.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![self.opcode.as_byte()];
        bytes.extend(self.immediate.iter().copied());
        bytes
    }
}

/// Displays the instruction as it would appear in a classic disassembly.
impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.opcode)?;
        if !self.immediate.is_empty() {
            write!(f, " 0x{}", hex::encode(&self.immediate))?;
        }

        Ok(())
    }
}

/// A basic block: a maximal run of instructions that can only be entered at
/// its first instruction and only left after its last.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    id:           BlockId,
    offset:       usize,
    instructions: Range<usize>,
    size:         usize,
    annotations:  Annotations,
}

impl Block {
    /// Gets the handle for this block.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Gets the byte offset of the first instruction in the block.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Gets the range of bytes that the block occupies in the bytecode.
    #[must_use]
    pub fn byte_range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }

    /// Gets the handles of the instructions in the block, in bytecode order.
    pub fn instruction_ids(&self) -> impl DoubleEndedIterator<Item = InstructionId> {
        self.instructions.clone().map(InstructionId::new)
    }

    /// Gets the number of instructions in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Checks if the block contains no instructions. This never holds for
    /// blocks constructed by the disassembler.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Gets the analysis results attached to this block.
    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// Gets the analysis results attached to this block for modification.
    pub fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }
}

/// The program is the disassembled form of a single buffer of bytecode.
///
/// # Invariants
///
/// - Block offsets are strictly increasing, and the blocks' byte ranges
///   partition the bytecode without gaps or overlaps.
/// - No block is empty.
/// - Instructions are stored in bytecode order, and each belongs to exactly
///   one block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
    blocks:       Vec<Block>,
    size:         usize,
    warnings:     Vec<disassembly::LocatedError>,
}

impl Program {
    /// Disassembles `bytes` into a program.
    ///
    /// This never fails. Malformed trailing data is decoded on a best-effort
    /// basis and reported through [`Self::warnings`].
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        disassemble(bytes)
    }

    /// Gets the blocks of the program in bytecode order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Gets the block with the provided `id`, if it exists.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// Gets the block with the provided `id` for modification, if it exists.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.index())
    }

    /// Gets all instructions of the program in bytecode order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Gets the instruction with the provided `id`, if it exists.
    #[must_use]
    pub fn instruction(&self, id: InstructionId) -> Option<&Instruction> {
        self.instructions.get(id.index())
    }

    /// Gets the instruction with the provided `id` for modification, if it
    /// exists.
    pub fn instruction_mut(&mut self, id: InstructionId) -> Option<&mut Instruction> {
        self.instructions.get_mut(id.index())
    }

    /// Gets the instructions contained in the block with the provided `id`.
    ///
    /// Returns an empty slice if no such block exists.
    #[must_use]
    pub fn block_instructions(&self, id: BlockId) -> &[Instruction] {
        match self.block(id) {
            Some(block) => &self.instructions[block.instructions.clone()],
            None => &[],
        }
    }

    /// Gets the last instruction of the block with the provided `id`.
    #[must_use]
    pub fn last_instruction(&self, id: BlockId) -> Option<&Instruction> {
        self.block_instructions(id).last()
    }

    /// Gets the block that immediately follows `id` in the bytecode.
    #[must_use]
    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        let next = id.index() + 1;
        (next < self.blocks.len()).then(|| BlockId::new(next))
    }

    /// Gets the block that begins exactly at `offset`, if there is one.
    #[must_use]
    pub fn block_at(&self, offset: usize) -> Option<BlockId> {
        self.blocks
            .binary_search_by_key(&offset, Block::offset)
            .ok()
            .map(BlockId::new)
    }

    /// Gets the block that a jump to `offset` would land on, if `offset` is a
    /// valid jump destination.
    ///
    /// A valid destination is the start of a block whose first instruction is
    /// a `JUMPDEST`.
    #[must_use]
    pub fn jump_destination(&self, offset: U256) -> Option<BlockId> {
        if offset >= U256::from(self.size as u64) {
            return None;
        }
        let block = self.block_at(offset.as_usize())?;
        let first = self.block_instructions(block).first()?;

        (first.opcode() == Opcode::JumpDest).then_some(block)
    }

    /// Gets the length of the bytecode that the program was built from, in
    /// bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Checks if the program contains no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Gets the non-fatal problems found while disassembling the bytecode.
    #[must_use]
    pub fn warnings(&self) -> &[disassembly::LocatedError] {
        &self.warnings
    }

    /// Converts the instructions in the program back to their corresponding
    /// bytecode.
    ///
    /// This always results in the same bytecode as the input to the
    /// disassembly process.
    #[must_use]
    pub fn as_bytecode(&self) -> Vec<u8> {
        self.instructions.iter().flat_map(Instruction::encode).collect()
    }
}

/// A [`Program`] is usually created from a byte array of bytecode.
impl From<&[u8]> for Program {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

/// A [`Program`] can be created from a string as long as that string is a
/// hexadecimal encoding of the equivalent bytes.
impl TryFrom<&str> for Program {
    type Error = disassembly::LocatedError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes = crate::preprocess::decode_hex(value)?;
        Ok(Self::new(&bytes))
    }
}

/// Allows converting the [`Program`] back to the corresponding bytecode
/// representation.
impl From<Program> for Vec<u8> {
    fn from(value: Program) -> Self {
        value.as_bytecode()
    }
}

/// The builder needs to construct the program's parts directly.
impl Program {
    pub(crate) fn from_parts(
        instructions: Vec<Instruction>,
        blocks: Vec<Block>,
        size: usize,
        warnings: Vec<disassembly::LocatedError>,
    ) -> Self {
        Self {
            instructions,
            blocks,
            size,
            warnings,
        }
    }
}

impl Instruction {
    pub(crate) fn new(
        id: InstructionId,
        block: BlockId,
        offset: usize,
        opcode: Opcode,
        immediate: Vec<u8>,
    ) -> Self {
        let annotations = Annotations::default();
        Self {
            id,
            block,
            offset,
            opcode,
            immediate,
            annotations,
        }
    }
}

impl Block {
    pub(crate) fn new(id: BlockId, offset: usize, instructions: Range<usize>, size: usize) -> Self {
        let annotations = Annotations::default();
        Self {
            id,
            offset,
            instructions,
            size,
            annotations,
        }
    }
}

/// Attaches the location of a truncated operand to the warning describing it.
pub(crate) fn truncation_warning(
    offset: usize,
    expected: usize,
    available: usize,
) -> disassembly::LocatedError {
    disassembly::Error::TruncatedOperand {
        expected,
        available,
    }
    .locate(offset)
}
