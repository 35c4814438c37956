//! This library recovers structure from [EVM](https://ethereum.org/en/developers/docs/evm/)
//! bytecode. It splits the bytecode into basic blocks, works out which
//! instructions may have produced each stack value, names the statically-known
//! jump destinations, and rebuilds nested expressions from the flat stack
//! code. It is a _best effort_ analysis.
//!
//! Note that this library is not intended to be nor expected to evolve into a
//! full decompiler for EVM bytecode.
//!
//! # How it Works
//!
//! From a very high level, the analysis is performed as follows:
//!
//! 1. Bytecode is ingested and turned into a [`program::Program`] of basic
//!    blocks, each holding a run of [`opcode::Opcode`]s.
//! 2. A fixpoint over the blocks computes, for every stack slot an instruction
//!    reads, the instructions that may have produced it. These are attached
//!    as [`analysis::ReachingDefinition`] annotations.
//! 3. The relation is inverted into [`analysis::ReachesSet`]s, recording where
//!    each produced value is read.
//! 4. Jump destinations that are known statically get an
//!    [`analysis::JumpLabel`].
//! 5. Every instruction gets an [`analysis::Expression`], into which the
//!    single-use values computed earlier in its block are inlined.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct an
//! `Analyzer` and call the `.analyze` method, passing your contract.
//!
//! ```
//! use bytecode_structure_analyzer as bsa;
//! use bytecode_structure_analyzer::{
//!     analysis,
//!     analysis::Expression,
//!     bytecode,
//!     contract::Contract,
//!     opcode::{Opcode, PushN},
//!     watchdog::LazyWatchdog,
//! };
//!
//! let bytes = bytecode![
//!     PushN::new(1, vec![0x01]).unwrap(), // Value to store
//!     PushN::new(1, vec![0x00]).unwrap(), // Key under which to store it
//!     Opcode::SStore,                     // Storage
//!     Opcode::Stop,                       // Return from this thread
//! ];
//!
//! let program = bsa::new(
//!     Contract::new(bytes),
//!     analysis::Config::default(),
//!     LazyWatchdog.in_rc(),
//! )
//! .analyze()
//! .unwrap();
//!
//! let store = &program.instructions()[2];
//! let expression = store.annotations().get::<Expression>().unwrap();
//! assert_eq!(expression.to_string(), "SSTORE(0x0, 0x1)");
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod analysis;
pub mod analyzer;
pub mod annotation;
pub mod constant;
pub mod contract;
pub mod error;
pub mod listing;
pub mod opcode;
pub mod preprocess;
pub mod program;
pub mod watchdog;

// Re-exports to provide the library interface.
pub use analyzer::{new, Analyzer, ConstructorSplit, InitialAnalyzer, SplitPart};
pub use program::Program;
