//! This module contains the state tracking functionality for the analyzer.

use std::fmt::Debug;

use crate::{analysis, program::Program, watchdog::DynWatchdog};

/// A marker trait that says that the type implementing it is an analyzer
/// state.
///
/// Analyzer states can be transitioned between as part of the
/// [`crate::analyzer::Analyzer`] state machine, and are intended to enforce
/// that the analysis passes run in the correct order.
pub trait State
where
    Self: Debug + Sized,
{
}

/// The initial state for the analyzer.
#[derive(Debug)]
pub struct HasContract {
    /// The analysis configuration.
    pub config: analysis::Config,

    /// The watchdog that is monitoring the progress of the analyzer.
    pub watchdog: DynWatchdog,
}
impl State for HasContract {}

/// The state for an analyzer that has disassembled the bytecode into basic
/// blocks.
#[derive(Debug)]
pub struct DisassemblyComplete {
    /// The disassembled program, as yet without annotations.
    pub program: Program,

    /// The analysis configuration.
    pub config: analysis::Config,

    /// The watchdog that is monitoring the progress of the analyzer.
    pub watchdog: DynWatchdog,
}
impl State for DisassemblyComplete {}

/// The analyzer has computed the reaching definitions for the program.
#[derive(Debug)]
pub struct ReachingComplete {
    pub program: Program,
}
impl State for ReachingComplete {}

/// The analyzer has inverted the reaching definitions into reaches sets.
#[derive(Debug)]
pub struct ReachesComplete {
    pub program: Program,
}
impl State for ReachesComplete {}

/// The analyzer has labelled the statically-known jump destinations.
#[derive(Debug)]
pub struct LabelsComplete {
    pub program: Program,
}
impl State for LabelsComplete {}

/// The analyzer has run every pass, and the program carries all of its
/// annotations.
#[derive(Debug)]
pub struct AnalysisComplete {
    /// The fully-annotated program.
    pub program: Program,
}
impl State for AnalysisComplete {}
