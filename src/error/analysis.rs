//! This module contains the errors that pertain to the analysis passes that
//! run over a disassembled [`crate::program::Program`].

use thiserror::Error;

use crate::error::container;

/// Errors that occur while running the analysis passes.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error(
        "Reaching definitions did not reach a fixpoint within {limit} block visits over {blocks} \
         blocks"
    )]
    CircularDependency { limit: usize, blocks: usize },

    #[error("Instruction {producer} is named as a producer but has no expression to provide")]
    MissingProducer { producer: usize },

    #[error("The {pass} pass requires the {requirement} annotation, which is missing")]
    MissingAnnotation {
        pass:        &'static str,
        requirement: &'static str,
    },

    #[error("Analysis was stopped by the watchdog")]
    StoppedByWatchdog,
}

impl Error {
    /// Checks if the error indicates a defect in the analysis itself rather
    /// than a property of the input bytecode.
    #[must_use]
    pub fn is_internal_defect(&self) -> bool {
        matches!(
            self,
            Self::MissingProducer { .. } | Self::MissingAnnotation { .. }
        )
    }
}

/// The result type for functions that may return analysis errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

container::locatable!(Error);
