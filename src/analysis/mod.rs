//! This module contains the analysis passes that recover structure from a
//! disassembled [`crate::program::Program`].
//!
//! The passes must run in a fixed order, as each builds on the annotations
//! left by those before it:
//!
//! 1. [`reaching::perform_reaching_analysis`] computes, for every stack slot
//!    that an instruction consumes, the instructions that may have produced
//!    it.
//! 2. [`reaches::perform_reaches_analysis`] inverts that relation, recording
//!    for each producer the sites that consume its value.
//! 3. [`label::create_labels`] names the jump destinations that are known
//!    statically.
//! 4. [`expression::build_expressions`] builds an expression tree for each
//!    instruction, inlining single-use producers into their consumers.
//!
//! The [`crate::analyzer::Analyzer`] enforces this order.

pub mod expression;
pub mod fold;
pub mod label;
pub mod reaches;
pub mod reaching;
pub mod stack;

pub use expression::{build_expressions, Expression};
pub use label::{create_labels, JumpLabel};
pub use reaches::{perform_reaches_analysis, ReachesSet, StackSite};
pub use reaching::{perform_reaching_analysis, ReachingDefinition};
pub use stack::{AbstractStack, Constant, StackSlot, StackValue};

use crate::constant::{DEFAULT_MAX_BLOCK_VISITS_FACTOR, DEFAULT_STRIP_METADATA_ENABLED};

/// The configuration for the analysis of a program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The number of times, per block in the program, that the reaching
    /// definitions fixpoint may visit a block before it gives up with
    /// [`crate::error::analysis::Error::CircularDependency`].
    ///
    /// Defaults to [`DEFAULT_MAX_BLOCK_VISITS_FACTOR`].
    pub max_block_visits_factor: usize,

    /// Whether the swarm metadata trailer that solc appends to the bytecode is
    /// removed before disassembly.
    ///
    /// Defaults to [`DEFAULT_STRIP_METADATA_ENABLED`].
    pub strip_metadata: bool,
}

impl Config {
    /// Sets the `max_block_visits_factor` config parameter to `value`.
    #[must_use]
    pub fn with_max_block_visits_factor(mut self, value: usize) -> Self {
        self.max_block_visits_factor = value;
        self
    }

    /// Sets the `strip_metadata` config parameter to `value`.
    #[must_use]
    pub fn with_strip_metadata(mut self, value: bool) -> Self {
        self.strip_metadata = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let max_block_visits_factor = DEFAULT_MAX_BLOCK_VISITS_FACTOR;
        let strip_metadata = DEFAULT_STRIP_METADATA_ENABLED;
        Self {
            max_block_visits_factor,
            strip_metadata,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        analysis::Config,
        constant::{DEFAULT_MAX_BLOCK_VISITS_FACTOR, DEFAULT_STRIP_METADATA_ENABLED},
    };

    #[test]
    fn defaults_come_from_constants() {
        let config = Config::default();
        assert_eq!(config.max_block_visits_factor, DEFAULT_MAX_BLOCK_VISITS_FACTOR);
        assert_eq!(config.strip_metadata, DEFAULT_STRIP_METADATA_ENABLED);
    }

    #[test]
    fn setters_override_defaults() {
        let config = Config::default()
            .with_max_block_visits_factor(3)
            .with_strip_metadata(false);
        assert_eq!(config.max_block_visits_factor, 3);
        assert!(!config.strip_metadata);
    }
}
