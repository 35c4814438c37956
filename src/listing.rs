//! This module contains the renderings of an analysed [`Program`]: a textual
//! listing in the style of a classic disassembler, and a structured document
//! that serializes to JSON.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::{
    analysis::{reaching::successors, Expression, JumpLabel, ReachesSet, ReachingDefinition},
    analyzer::{ConstructorSplit, SplitPart},
    error,
    program::{Block, Instruction, Program},
};

/// The textual listing of an analysed program.
///
/// Each block is introduced by its label, if it has one, and by the stack it
/// is entered with. Every instruction that carries an expression is then
/// printed on its own line, prefixed with its offset. An instruction whose
/// result is left on the stack has its expression wrapped in `PUSH(..)`.
#[derive(Clone, Copy, Debug)]
pub struct Listing<'a> {
    program: &'a Program,
}

impl<'a> Listing<'a> {
    /// Creates the listing of `program`.
    #[must_use]
    pub fn new(program: &'a Program) -> Self {
        Self { program }
    }

    fn write_block(&self, f: &mut Formatter<'_>, block: &Block) -> std::fmt::Result {
        if let Some(label) = block.annotations().get::<JumpLabel>() {
            writeln!(f, "{label}:")?;
        }
        match block.annotations().get::<ReachingDefinition>() {
            Some(reaching) => writeln!(f, "# Stack: {reaching}")?,
            None => writeln!(f, "# Stack: []")?,
        }

        for instruction in self.program.block_instructions(block.id()) {
            let Some(expression) = instruction.annotations().get::<Expression>() else {
                continue;
            };
            let offset = instruction.offset();
            if leaves_result(instruction) {
                writeln!(f, "0x{offset:X}\tPUSH({expression})")?;
            } else {
                writeln!(f, "0x{offset:X}\t{expression}")?;
            }
        }

        writeln!(f)
    }
}

impl Display for Listing<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for block in self.program.blocks() {
            self.write_block(f, block)?;
        }
        Ok(())
    }
}

/// The textual listing of creation bytecode that was analysed as its two
/// halves.
///
/// A half whose analysis failed is listed as its errors instead.
#[derive(Clone, Copy, Debug)]
pub struct SplitListing<'a> {
    split: &'a ConstructorSplit,
}

impl<'a> SplitListing<'a> {
    #[must_use]
    pub fn new(split: &'a ConstructorSplit) -> Self {
        Self { split }
    }
}

impl Display for SplitListing<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for part in SplitPart::ALL {
            match part {
                SplitPart::Constructor => {
                    writeln!(f, "# Constructor part -------------------------")?;
                }
                SplitPart::Code => writeln!(f, "# Code part -------------------------")?,
            }
            match self.split.part(part) {
                Ok(program) => write!(f, "{}", Listing::new(program))?,
                Err(errors) => {
                    writeln!(f, "# Analysis of the {part} part failed")?;
                    for error in errors {
                        writeln!(f, "# {error}")?;
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

/// Checks if the value `instruction` computes stays on the stack for a later
/// instruction, rather than being consumed by the instruction itself.
fn leaves_result(instruction: &Instruction) -> bool {
    let opcode = instruction.opcode();
    opcode.push_count() == 1 && !opcode.is_dup()
}

/// A structured description of an analysed program.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProgramDocument {
    /// The number of bytes in the program.
    pub size:     usize,
    pub blocks:   Vec<BlockDocument>,
    /// Problems found while disassembling.
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BlockDocument {
    pub offset:       usize,
    pub end:          usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label:        Option<String>,
    /// The stack on entry to the block, from the top down.
    pub entry_stack:  Vec<String>,
    /// The offsets of the blocks that control may pass to.
    pub successors:   Vec<usize>,
    pub instructions: Vec<InstructionDocument>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstructionDocument {
    pub offset:     usize,
    pub opcode:     String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub immediate:  Option<String>,
    /// The values that may occupy each slot the instruction reads, from the
    /// top down.
    pub reads:      Vec<String>,
    /// The sites that read the value the instruction produces.
    pub reaches:    Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl From<&Program> for ProgramDocument {
    fn from(program: &Program) -> Self {
        let blocks = program
            .blocks()
            .iter()
            .map(|block| {
                let entry_stack = block
                    .annotations()
                    .get::<ReachingDefinition>()
                    .map(|r| r.slots().iter().map(ToString::to_string).collect())
                    .unwrap_or_default();
                let successors = successors(program, block.id())
                    .into_iter()
                    .filter_map(|id| program.block(id).map(Block::offset))
                    .collect();
                let instructions = program
                    .block_instructions(block.id())
                    .iter()
                    .map(InstructionDocument::from)
                    .collect();

                BlockDocument {
                    offset: block.offset(),
                    end: block.byte_range().end,
                    label: block.annotations().get::<JumpLabel>().map(ToString::to_string),
                    entry_stack,
                    successors,
                    instructions,
                }
            })
            .collect();
        let warnings = program.warnings().iter().map(ToString::to_string).collect();

        Self {
            size: program.size(),
            blocks,
            warnings,
        }
    }
}

impl From<&Instruction> for InstructionDocument {
    fn from(instruction: &Instruction) -> Self {
        let annotations = instruction.annotations();
        let immediate = (!instruction.immediate().is_empty())
            .then(|| format!("0x{}", hex::encode(instruction.immediate())));
        let reads = annotations
            .get::<ReachingDefinition>()
            .map(|r| r.slots().iter().map(ToString::to_string).collect())
            .unwrap_or_default();
        let reaches = annotations
            .get::<ReachesSet>()
            .map(|r| r.sites().map(ToString::to_string).collect())
            .unwrap_or_default();

        Self {
            offset: instruction.offset(),
            opcode: instruction.opcode().to_string(),
            immediate,
            reads,
            reaches,
            expression: annotations.get::<Expression>().map(ToString::to_string),
        }
    }
}

/// A structured description of creation bytecode analysed as its two halves.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SplitDocument {
    pub entry_point: usize,
    pub constructor: PartDocument,
    pub runtime:     PartDocument,
}

impl From<&ConstructorSplit> for SplitDocument {
    fn from(split: &ConstructorSplit) -> Self {
        Self {
            entry_point: split.entry_point,
            constructor: PartDocument::from(&split.constructor),
            runtime:     PartDocument::from(&split.runtime),
        }
    }
}

/// The description of one half of creation bytecode.
///
/// An analysed half serializes as its [`ProgramDocument`], and a failed one as
/// an object holding its `errors`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PartDocument {
    Analyzed(ProgramDocument),
    Failed { errors: Vec<String> },
}

impl From<&error::Result<Program>> for PartDocument {
    fn from(result: &error::Result<Program>) -> Self {
        match result {
            Ok(program) => Self::Analyzed(ProgramDocument::from(program)),
            Err(errors) => Self::Failed {
                errors: errors.iter().map(ToString::to_string).collect(),
            },
        }
    }
}
