//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]
#![allow(unused)] // Each test binary only uses some of the helpers

use bytecode_structure_analyzer as bsa;
use bytecode_structure_analyzer::{
    analysis,
    analysis::{Expression, ReachesSet, ReachingDefinition},
    contract::Contract,
    program::Program,
    watchdog::{DynWatchdog, LazyWatchdog},
    InitialAnalyzer,
};

/// Constructs a new analyzer for the hex-encoded (with or without the `0x`
/// prefix) contract bytecode provided in `code`.
///
/// It uses the default configuration for the analyzer.
pub fn new_analyzer_from_bytecode(
    code: impl AsRef<str>,
    watchdog: DynWatchdog,
) -> anyhow::Result<InitialAnalyzer> {
    let contract = Contract::from_hex(code.as_ref())?;
    Ok(bsa::new(contract, analysis::Config::default(), watchdog))
}

/// Runs the whole analysis over the raw `bytes` with the default
/// configuration.
pub fn analyze_bytes(bytes: &[u8]) -> anyhow::Result<Program> {
    let program = bsa::new(
        Contract::new(bytes.to_vec()),
        analysis::Config::default(),
        LazyWatchdog.in_rc(),
    )
    .analyze()?;
    Ok(program)
}

/// Gets the rendered expression of every instruction that has one, along with
/// the offset of that instruction.
pub fn expressions(program: &Program) -> Vec<(usize, String)> {
    program
        .instructions()
        .iter()
        .filter_map(|i| {
            i.annotations()
                .get::<Expression>()
                .map(|e| (i.offset(), e.to_string()))
        })
        .collect()
}

/// Checks that the blocks of `program` partition the `bytes` it was built
/// from, and that no block is empty.
pub fn assert_partition(program: &Program, bytes: &[u8]) {
    assert_eq!(program.size(), bytes.len());
    assert_eq!(program.as_bytecode(), bytes);

    let mut next = 0;
    for block in program.blocks() {
        assert!(!block.is_empty(), "Block at {} is empty", block.offset());
        assert_eq!(block.offset(), next, "Gap or overlap before block");
        let instructions = program.block_instructions(block.id());
        assert_eq!(instructions[0].offset(), block.offset());
        for instruction in instructions {
            assert_eq!(instruction.block(), block.id());
        }
        next = block.byte_range().end;
    }
    assert_eq!(next, bytes.len());
}

/// Checks that every instruction reads as many slots as it pops.
pub fn assert_pop_counts(program: &Program) {
    for instruction in program.instructions() {
        let reaching = instruction
            .annotations()
            .get::<ReachingDefinition>()
            .expect("Instruction was not annotated");
        assert_eq!(
            reaching.len(),
            instruction.opcode().arg_count(),
            "Wrong slot count at {}",
            instruction.offset()
        );
    }
}

/// Checks that the reaches sets are exactly the inverse of the reaching
/// definitions.
pub fn assert_duality(program: &Program) {
    let mut expected: Vec<Vec<(usize, usize)>> = vec![vec![]; program.instructions().len()];
    for consumer in program.instructions() {
        let reaching = consumer
            .annotations()
            .get::<ReachingDefinition>()
            .expect("Instruction was not annotated");
        for (slot, stack_slot) in reaching.slots().iter().enumerate() {
            for producer in stack_slot.producing_instructions() {
                expected[producer.index()].push((consumer.id().index(), slot));
            }
        }
    }

    for (instruction, mut expected) in program.instructions().iter().zip(expected) {
        let mut actual: Vec<(usize, usize)> = instruction
            .annotations()
            .get::<ReachesSet>()
            .expect("Instruction had no reaches set")
            .sites()
            .map(|site| (site.consumer.index(), site.slot))
            .collect();
        expected.sort_unstable();
        expected.dedup();
        actual.sort_unstable();
        assert_eq!(actual, expected, "Mismatch at {}", instruction.offset());
    }
}

/// Checks that an instruction lost its expression to inlining only if it
/// produces a value with exactly one consuming site, and that the site is a
/// later instruction in the same block that can only read that value.
pub fn assert_inlining_sound(program: &Program) {
    for instruction in program.instructions() {
        let opcode = instruction.opcode();
        let expects_expression = !opcode.is_stack_manipulation()
            && (opcode.arg_count() > 0 || opcode.push_count() > 0 || opcode.is_push());
        if !expects_expression || instruction.annotations().contains::<Expression>() {
            continue;
        }

        let sites: Vec<_> = instruction
            .annotations()
            .get::<ReachesSet>()
            .expect("Instruction had no reaches set")
            .consuming_sites(program)
            .collect();
        assert_eq!(
            sites.len(),
            1,
            "Expression at {} was taken without a single use",
            instruction.offset()
        );

        let site = sites[0];
        let consumer = program
            .instruction(site.consumer)
            .expect("Consuming site named a missing instruction");
        assert_eq!(
            consumer.block(),
            instruction.block(),
            "Expression at {} was taken across blocks",
            instruction.offset()
        );
        assert!(
            consumer.offset() > instruction.offset(),
            "Expression at {} was taken by an earlier instruction",
            instruction.offset()
        );

        let slot = consumer
            .annotations()
            .get::<ReachingDefinition>()
            .and_then(|reaching| reaching.slot(site.slot))
            .expect("Consuming site named a missing slot");
        assert_eq!(
            slot.single_producer(),
            Some(instruction.id()),
            "Expression at {} was taken by a slot it may not occupy alone",
            instruction.offset()
        );
    }
}
