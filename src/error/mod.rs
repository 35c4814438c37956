//! This module contains the primary error type for the analyzer's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.

pub mod analysis;
pub mod container;
pub mod disassembly;
pub mod preprocess;

use thiserror::Error;

/// The interface result type for the library.
///
/// # Usage
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems should return the more-specific
/// child error types as appropriate.
pub type Result<T> = std::result::Result<T, Errors>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by the
/// clients of the library) should be members of this enum.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// Errors that come from the disassembly process.
    #[error(transparent)]
    Disassembly(#[from] disassembly::Error),

    /// Errors from the analysis passes.
    #[error(transparent)]
    Analysis(#[from] analysis::Error),

    /// Errors from preparing the input for analysis.
    #[error(transparent)]
    Preprocess(#[from] preprocess::Error),

    /// An unknown error, represented as a string.
    #[error("Unknown Error: {_0:?}")]
    Other(String),
}

impl Error {
    /// Constructs an unknown error with the provided `message`.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

container::locatable!(Error);

/// A container of errors that may occur in the analyzer.
pub type Errors = container::Errors<LocatedError>;

/// Implements the conversions from a subsystem's located error (and from its
/// container of errors) into the general located error and error container.
macro_rules! located_conversions {
    ($($subsystem:ident),*$(,)?) => {$(
        /// Allow simple conversions from located subsystem errors by re-wrapping
        /// the located error around the more general payload.
        impl From<$subsystem::LocatedError> for LocatedError {
            fn from(value: $subsystem::LocatedError) -> Self {
                value.map(Error::from)
            }
        }

        /// Allow simple conversions from located subsystem errors into the
        /// general errors container.
        impl From<$subsystem::LocatedError> for Errors {
            fn from(value: $subsystem::LocatedError) -> Self {
                let re_wrapped: LocatedError = value.into();
                re_wrapped.into()
            }
        }

        /// Allow conversion from a subsystem's errors container to the general
        /// errors container.
        impl From<container::Errors<$subsystem::LocatedError>> for Errors {
            fn from(value: container::Errors<$subsystem::LocatedError>) -> Self {
                value.into_iter().map(LocatedError::from).collect()
            }
        }
    )*};
}

located_conversions!(analysis, disassembly, preprocess);
