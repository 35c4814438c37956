//! This module contains the disassembler that turns a stream of bytes into a
//! [`Program`] of instructions partitioned into basic blocks.
//!
//! # Implementation Note
//!
//! The scan is a single linear pass. Block boundaries are decided purely from
//! the flow class of each opcode, so no control-flow information is needed to
//! build the blocks; that is the job of the analysis passes.

use log::{debug, warn};

use crate::{
    opcode::{Flow, Opcode},
    program::{truncation_warning, Block, BlockId, Instruction, InstructionId, Program},
};

/// Disassembles the input `bytes` into a [`Program`].
///
/// A new block begins at every `JUMPDEST`, and immediately after every jump,
/// conditional jump, or terminal instruction. Blocks are never empty.
///
/// # Unknown Bytes
///
/// Any byte that is not a known opcode is decoded as [`Opcode::Invalid`].
/// Such bytes usually belong to data or CBOR metadata, and are only reachable
/// if execution intends to revert.
///
/// # Truncated Operands
///
/// Solc has generated valid code that ends with an incomplete push. When the
/// bytecode ends before a push's immediate operand is complete, the available
/// bytes are kept as a truncated operand and a
/// [`crate::error::disassembly::Error::TruncatedOperand`] warning is recorded
/// on the program rather than failing.
#[must_use]
pub fn disassemble(bytes: &[u8]) -> Program {
    let mut instructions: Vec<Instruction> = Vec::with_capacity(bytes.len());
    let mut blocks: Vec<Block> = Vec::new();
    let mut warnings = Vec::new();

    let mut offset = 0;
    let mut block_start_offset = 0;
    let mut block_start_index = 0;
    let mut previous_flow: Option<Flow> = None;

    while offset < bytes.len() {
        let opcode = Opcode::from_byte(bytes[offset]);
        let flow = opcode.flow();

        // A block ends before a block-entry marker, or after anything that
        // leaves the block.
        let starts_block = flow == Flow::BlockEntry || previous_flow.is_some_and(Flow::ends_block);
        if starts_block && instructions.len() > block_start_index {
            let id = BlockId::new(blocks.len());
            blocks.push(Block::new(
                id,
                block_start_offset,
                block_start_index..instructions.len(),
                offset - block_start_offset,
            ));
            block_start_offset = offset;
            block_start_index = instructions.len();
        }

        // Consume the immediate operand, keeping whatever is available if the
        // bytecode ends early.
        let operand_start = offset + 1;
        let operand_end = (operand_start + opcode.operand_size()).min(bytes.len());
        let immediate = bytes[operand_start..operand_end].to_vec();
        if immediate.len() < opcode.operand_size() {
            let warning = truncation_warning(offset, opcode.operand_size(), immediate.len());
            warn!("{warning}");
            warnings.push(warning);
        }

        let id = InstructionId::new(instructions.len());
        let block = BlockId::new(blocks.len());
        instructions.push(Instruction::new(id, block, offset, opcode, immediate));

        previous_flow = Some(flow);
        offset = operand_end;
    }

    if instructions.len() > block_start_index {
        let id = BlockId::new(blocks.len());
        blocks.push(Block::new(
            id,
            block_start_offset,
            block_start_index..instructions.len(),
            offset - block_start_offset,
        ));
    }

    debug!(
        "Disassembled {} bytes into {} instructions in {} blocks",
        bytes.len(),
        instructions.len(),
        blocks.len()
    );

    Program::from_parts(instructions, blocks, bytes.len(), warnings)
}
