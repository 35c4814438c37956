//! This module contains the definition of the analyzer itself.

pub mod state;

use std::fmt::{Display, Formatter};

use log::{debug, info, warn};

use crate::{
    analysis,
    analyzer::state::State,
    contract::Contract,
    error,
    preprocess,
    program::Program,
    watchdog::DynWatchdog,
};

/// Creates a new analyzer wrapping the provided `contract`, and with the
/// provided `config`.
#[must_use]
pub fn new(
    contract: Contract,
    config: analysis::Config,
    watchdog: DynWatchdog,
) -> Analyzer<state::HasContract> {
    let state = state::HasContract { config, watchdog };
    Analyzer { contract, state }
}

/// The core of the structure recovery, the `Analyzer` is responsible for
/// ingesting user data and outputting an annotated [`Program`].
///
/// # Enforcing Valid State Transitions
///
/// The analyzer enforces that only correct state transitions can occur through
/// use of structs that implement the exact state required by it at any given
/// point. Each pass can only be run once the passes it depends on have been
/// run.
///
/// There is the [`Self::state`] function that provides access to the state data
/// of whichever state the analyzer is currently in.
pub struct Analyzer<S: State> {
    /// The contract that is being analyzed.
    contract: Contract,

    /// The internal state of the analyzer.
    state: S,
}

/// The safe operations available in all states.
impl<S: State> Analyzer<S> {
    /// Gets a reference to the contract being analyzed.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Gets an immutable reference to the current state of the analyzer.
    pub fn state(&self) -> &S {
        &self.state
    }
}

/// Unsafe operations available in all states.
///
/// These operations are capable of **violating the state invariants** of the
/// analyzer, and must be used with the _utmost_ care.
impl<S: State> Analyzer<S> {
    /// Gets a mutable reference to the current state of the analyzer.
    ///
    /// # Safety
    ///
    /// Do not mutate the state instance unless you totally understand the
    /// state that the analyzer is in, and the implications of doing so.
    pub unsafe fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Forces the analyzer into the state `NS`, with the value of the state
    /// created by applying `transform` to the analyzer's current state and
    /// disregarding any safety with regard to state transitions.
    ///
    /// # Safety
    ///
    /// Do not force a state transition for the analyzer unless you totally
    /// understand the state that the analyzer is in, and the implications
    /// of doing so.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the provided `transform` returns [`Err`].
    pub unsafe fn transform_state<NS: State>(
        self,
        transform: impl FnOnce(S) -> error::Result<NS>,
    ) -> error::Result<Analyzer<NS>> {
        let state = transform(self.state)?;
        let contract = self.contract;

        Ok(Analyzer { contract, state })
    }
}

/// A type that allows the user to easily name the initial state of the
/// analyzer.
pub type InitialAnalyzer = Analyzer<state::HasContract>;

/// One of the two halves of creation bytecode.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SplitPart {
    /// The code that runs once, when the contract is deployed.
    Constructor,

    /// The code that the constructor deploys.
    Code,
}

impl SplitPart {
    pub const ALL: [SplitPart; 2] = [SplitPart::Constructor, SplitPart::Code];
}

impl Display for SplitPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constructor => write!(f, "constructor"),
            Self::Code => write!(f, "code"),
        }
    }
}

/// The result of analysing creation bytecode as its two halves.
///
/// The halves are analysed independently, so one of them failing does not
/// lose the other.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConstructorSplit {
    /// The offset in the creation bytecode at which the runtime code starts.
    pub entry_point: usize,

    /// The analysed constructor, covering the bytes before the entry point.
    pub constructor: error::Result<Program>,

    /// The analysed runtime code, covering the bytes from the entry point on.
    /// Its offsets are relative to the entry point.
    pub runtime: error::Result<Program>,
}

impl ConstructorSplit {
    /// Gets the result of analysing `part`.
    #[must_use]
    pub fn part(&self, part: SplitPart) -> &error::Result<Program> {
        match part {
            SplitPart::Constructor => &self.constructor,
            SplitPart::Code => &self.runtime,
        }
    }

    /// Gets the halves whose analysis failed, along with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (SplitPart, &error::Errors)> + '_ {
        SplitPart::ALL
            .into_iter()
            .filter_map(move |part| self.part(part).as_ref().err().map(|errors| (part, errors)))
    }

    /// Checks if both halves were analysed successfully.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Operations available on a newly-created analyzer.
impl Analyzer<state::HasContract> {
    /// Executes the analysis process from beginning to end, performing all the
    /// intermediate steps automatically and returning the annotated program.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if any step in the process fails.
    pub fn analyze(self) -> error::Result<Program> {
        let analyzer = self.disassemble()?;
        let analyzer = analyzer.compute_reaching()?;
        let analyzer = analyzer.compute_reaches()?;
        let analyzer = analyzer.create_labels()?;
        let analyzer = analyzer.build_expressions()?;

        Ok(analyzer.into_program())
    }

    /// Treats the contract as creation bytecode, locating the runtime code
    /// that the constructor deploys and analysing the two halves separately.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the runtime code cannot be located. The failure of
    /// either half is kept in the returned split instead.
    pub fn analyze_with_constructor(self) -> error::Result<ConstructorSplit> {
        let config = self.state.config;
        let watchdog = self.state.watchdog;
        let bytes = if config.strip_metadata {
            preprocess::strip_metadata(self.contract.bytecode())
        } else {
            self.contract.bytecode()
        };

        let mut whole = Program::new(bytes);
        analysis::perform_reaching_analysis(&mut whole, &config, &watchdog)?;
        let entry_point = preprocess::find_code_entry_point(&whole)?;
        info!("Runtime code starts at {entry_point:#x}");

        let halves = config.with_strip_metadata(false);
        let constructor = new(
            Contract::new(bytes[..entry_point].to_vec()),
            halves.clone(),
            watchdog.clone(),
        )
        .analyze();
        let runtime = new(
            Contract::new(bytes[entry_point..].to_vec()),
            halves,
            watchdog,
        )
        .analyze();

        let split = ConstructorSplit {
            entry_point,
            constructor,
            runtime,
        };
        for (part, errors) in split.failures() {
            warn!("Analysis of the {part} part failed: {errors}");
        }

        Ok(split)
    }

    /// Performs the disassembly process to turn the input contract code into
    /// a program of basic blocks, first removing the swarm metadata if so
    /// configured.
    ///
    /// # Errors
    ///
    /// Disassembly itself cannot fail, but the signature matches the other
    /// transitions.
    pub fn disassemble(self) -> error::Result<Analyzer<state::DisassemblyComplete>> {
        let bytes = if self.state.config.strip_metadata {
            preprocess::strip_metadata(self.contract.bytecode())
        } else {
            self.contract.bytecode()
        };
        let program = Program::new(bytes);
        for warning in program.warnings() {
            debug!("Disassembly warning: {warning}");
        }

        unsafe {
            self.transform_state(|old_state| {
                let config = old_state.config;
                let watchdog = old_state.watchdog;
                Ok(state::DisassemblyComplete {
                    program,
                    config,
                    watchdog,
                })
            })
        }
    }
}

/// Operations available on an analyzer that has completed the disassembly of
/// the bytecode.
impl Analyzer<state::DisassemblyComplete> {
    /// Gets the disassembled program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.state.program
    }

    /// Runs the reaching definitions analysis.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the analysis does not converge, or is stopped by the
    /// watchdog.
    pub fn compute_reaching(self) -> error::Result<Analyzer<state::ReachingComplete>> {
        unsafe {
            self.transform_state(|mut old_state| {
                analysis::perform_reaching_analysis(
                    &mut old_state.program,
                    &old_state.config,
                    &old_state.watchdog,
                )?;
                let program = old_state.program;
                Ok(state::ReachingComplete { program })
            })
        }
    }
}

/// Operations available on an analyzer that has computed reaching
/// definitions.
impl Analyzer<state::ReachingComplete> {
    /// Gets the program with its reaching definitions.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.state.program
    }

    /// Inverts the reaching definitions into reaches sets.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the reaching definitions are inconsistent with the
    /// program.
    pub fn compute_reaches(self) -> error::Result<Analyzer<state::ReachesComplete>> {
        unsafe {
            self.transform_state(|mut old_state| {
                analysis::perform_reaches_analysis(&mut old_state.program)?;
                let program = old_state.program;
                Ok(state::ReachesComplete { program })
            })
        }
    }
}

/// Operations available on an analyzer that has computed reaches sets.
impl Analyzer<state::ReachesComplete> {
    /// Gets the program with its reaching definitions and reaches sets.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.state.program
    }

    /// Labels the statically-known jump destinations.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a jump is missing its reaching definition.
    pub fn create_labels(self) -> error::Result<Analyzer<state::LabelsComplete>> {
        unsafe {
            self.transform_state(|mut old_state| {
                analysis::create_labels(&mut old_state.program)?;
                let program = old_state.program;
                Ok(state::LabelsComplete { program })
            })
        }
    }
}

/// Operations available on an analyzer that has labelled the program.
impl Analyzer<state::LabelsComplete> {
    /// Gets the labelled program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.state.program
    }

    /// Builds the expression trees for the program.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if an earlier annotation is missing from an
    /// instruction.
    pub fn build_expressions(self) -> error::Result<Analyzer<state::AnalysisComplete>> {
        unsafe {
            self.transform_state(|mut old_state| {
                analysis::build_expressions(&mut old_state.program)?;
                let program = old_state.program;
                Ok(state::AnalysisComplete { program })
            })
        }
    }
}

/// Operations available on an analyzer that has completed every pass.
impl Analyzer<state::AnalysisComplete> {
    /// Gets the fully-annotated program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.state.program
    }

    /// Consumes the analyzer, returning the fully-annotated program.
    #[must_use]
    pub fn into_program(self) -> Program {
        self.state.program
    }
}
