//! This module contains the errors that pertain to preparing bytecode for
//! analysis, such as splitting constructor code from runtime code.

use ethnum::U256;
use thiserror::Error;

use crate::error::container;

/// Errors that occur while preparing the input for analysis.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("No code entry point was found in the constructor")]
    NoCodeEntryPoint,

    #[error("Code entry point {offset} lies outside the available code of length {length}")]
    CodeEntryPointOutOfRange { offset: U256, length: usize },
}

/// The result type for functions that may return preprocessing errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

container::locatable!(Error);
