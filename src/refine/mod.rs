//! Refine loop - the generate/evaluate/rewrite state machine and its runner.

pub mod runner;
pub mod state;

pub use runner::{DEFAULT_MAX_ITERATIONS, RefineLoop, RefineSettings};
pub use state::{Event, IterationRecord, LoopOutcome, LoopState, OutcomeStatus, Phase};
