//! This module contains the means by which a client can cancel an analysis
//! that is taking too long.
//!
//! Only the reaching definitions fixpoint consults the watchdog. Its worklist
//! is the one part of the analysis whose running time is not linear in the
//! size of the program, and every other pass runs to completion once started.
//! Cancellation is therefore cooperative, and happens at the granularity of a
//! block visit.

use std::{
    fmt::Debug,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::constant::DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;

/// A dynamically dispatched [`Watchdog`] instance.
pub type DynWatchdog = Rc<dyn Watchdog>;

/// An object that the analysis asks, every so often, whether it should give
/// up.
pub trait Watchdog
where
    Self: Debug,
{
    /// Checks if the analysis should halt and return an error.
    #[must_use]
    fn should_stop(&self) -> bool;

    /// Gets the number of block visits the analysis should make between
    /// polls of the watchdog.
    #[must_use]
    fn poll_every(&self) -> usize;
}

/// A watchdog that never asks the analysis to stop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }

    fn poll_every(&self) -> usize {
        usize::MAX
    }
}

/// A watchdog that stops the analysis once an externally-owned flag is set.
///
/// This is the way to cancel an analysis running on another thread.
#[derive(Clone, Debug)]
pub struct FlagWatchdog {
    flag:          Arc<AtomicBool>,
    poll_interval: usize,
}

impl FlagWatchdog {
    /// Constructs a new `FlagWatchdog` wrapping the provided `flag`, polled
    /// every [`DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS`] block visits.
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            poll_interval: DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS,
        }
    }

    /// Sets the number of block visits between polls to `visits`.
    #[must_use]
    pub fn polling_every(mut self, visits: usize) -> Self {
        self.poll_interval = visits;
        self
    }

    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for FlagWatchdog {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn poll_every(&self) -> usize {
        self.poll_interval
    }
}

/// A watchdog that stops the analysis once a fixed amount of wall-clock time
/// has passed since the watchdog was created.
#[derive(Clone, Debug)]
pub struct DeadlineWatchdog {
    /// `None` when the budget is too large to represent, meaning never.
    deadline:      Option<Instant>,
    poll_interval: usize,
}

impl DeadlineWatchdog {
    /// Constructs a watchdog that expires `budget` from now.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        let deadline = Instant::now().checked_add(budget);
        Self {
            deadline,
            poll_interval: DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS,
        }
    }

    /// Sets the number of block visits between polls to `visits`.
    #[must_use]
    pub fn polling_every(mut self, visits: usize) -> Self {
        self.poll_interval = visits;
        self
    }

    #[must_use]
    pub fn in_rc(self) -> DynWatchdog {
        Rc::new(self)
    }
}

impl Watchdog for DeadlineWatchdog {
    fn should_stop(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn poll_every(&self) -> usize {
        self.poll_interval
    }
}

/// Counts the iterations of a loop and consults a watchdog on every
/// `poll_every`-th of them.
#[derive(Debug)]
pub struct Poller<'a> {
    watchdog: &'a dyn Watchdog,
    interval: usize,
    ticks:    usize,
}

impl<'a> Poller<'a> {
    /// Creates a poller for `watchdog`. An interval of zero is treated as one.
    #[must_use]
    pub fn new(watchdog: &'a dyn Watchdog) -> Self {
        Self {
            watchdog,
            interval: watchdog.poll_every().max(1),
            ticks: 0,
        }
    }

    /// Records one iteration, returning `true` if the watchdog was polled on
    /// it and asked for the loop to stop.
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;
        self.ticks % self.interval == 0 && self.watchdog.should_stop()
    }

    /// Gets the number of iterations recorded so far.
    #[must_use]
    pub fn ticks(&self) -> usize {
        self.ticks
    }
}
