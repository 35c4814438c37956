//! This module contains the error type that pertains to the disassembly
//! process.

use thiserror::Error;

use crate::error::container;

/// Errors that occur during the process of ingesting bytecode and
/// disassembling it into a [`crate::program::Program`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Invalid size {_0:?} provided to the `PUSH` opcode")]
    InvalidPushSize(u8),

    #[error("The immediate operand expected {expected} bytes but only {available} remained")]
    TruncatedOperand { expected: usize, available: usize },

    #[error("The provided hexadecimal input had an odd length")]
    InvalidHexLength,

    #[error("Encountered invalid hex char {_0:?} at index {_1:?}")]
    InvalidHexCharacter(char, usize),
}

/// The result type for functions that may return disassembly errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

container::locatable!(Error);
