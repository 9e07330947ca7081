//! Loop state and the transition function.
//!
//! `LoopState::apply` is the whole state machine: each event is only legal
//! in one phase and moves the loop to exactly one next phase.

use serde::Serialize;

use crate::error::{RefinrError, Result};
use crate::llm::{Completion, TextSource};
use crate::rubric::EvaluationResult;

/// Where the loop is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the task model's response to the current prompt
    Generating,
    /// Holding a fresh response that has not been scored
    Evaluating,
    /// Waiting for the meta model's rewritten prompt
    Rewriting,
    /// Every rubric item passed
    Succeeded,
    /// Iteration budget spent without passing
    Exhausted,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Exhausted)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Generating => "generating",
            Phase::Evaluating => "evaluating",
            Phase::Rewriting => "rewriting",
            Phase::Succeeded => "succeeded",
            Phase::Exhausted => "exhausted",
        };
        write!(f, "{}", name)
    }
}

/// Input to the transition function
#[derive(Debug, Clone)]
pub enum Event {
    /// The task model answered
    Generated(Completion),
    /// The evaluator scored the response
    Evaluated(EvaluationResult),
    /// The meta model produced the next prompt
    Rewritten(Completion),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Generated(_) => "generated",
            Event::Evaluated(_) => "evaluated",
            Event::Rewritten(_) => "rewritten",
        }
    }
}

/// One generate/evaluate round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationRecord {
    /// 1-indexed
    pub iteration: u32,
    pub prompt: String,
    pub response: String,
    pub response_source: TextSource,
    pub checks: EvaluationResult,
}

/// Mutable state owned by a single loop run
#[derive(Debug, Clone)]
pub struct LoopState {
    phase: Phase,
    prompt: String,
    response: String,
    response_source: TextSource,
    checks: EvaluationResult,
    iteration: u32,
    max_iterations: u32,
    history: Vec<IterationRecord>,
}

impl LoopState {
    /// Start in `Generating` with zero iterations
    pub fn new(initial_prompt: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            phase: Phase::Generating,
            prompt: initial_prompt.into(),
            response: String::new(),
            response_source: TextSource::Extracted,
            checks: EvaluationResult::default(),
            iteration: 0,
            max_iterations,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn checks(&self) -> &EvaluationResult {
        &self.checks
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Apply an event and return the new phase
    pub fn apply(&mut self, event: Event) -> Result<Phase> {
        let next = match (self.phase, event) {
            (Phase::Generating, Event::Generated(completion)) => {
                self.iteration += 1;
                self.response = completion.text;
                self.response_source = completion.source;
                Phase::Evaluating
            }
            (Phase::Evaluating, Event::Evaluated(checks)) => {
                self.history.push(IterationRecord {
                    iteration: self.iteration,
                    prompt: self.prompt.clone(),
                    response: self.response.clone(),
                    response_source: self.response_source,
                    checks: checks.clone(),
                });
                let passed = checks.passed();
                self.checks = checks;

                if passed {
                    Phase::Succeeded
                } else if self.iteration >= self.max_iterations {
                    Phase::Exhausted
                } else {
                    Phase::Rewriting
                }
            }
            (Phase::Rewriting, Event::Rewritten(completion)) => {
                if completion.text.trim().is_empty() {
                    log::warn!("Rewrite came back empty; keeping the previous prompt");
                } else {
                    self.prompt = completion.text;
                }
                Phase::Generating
            }
            (phase, event) => {
                return Err(RefinrError::InvalidState(format!(
                    "cannot apply '{}' while {}",
                    event.name(),
                    phase
                )));
            }
        };

        self.phase = next;
        Ok(next)
    }

    /// Consume a terminal state into its outcome
    pub fn into_outcome(self) -> Result<LoopOutcome> {
        let status = match self.phase {
            Phase::Succeeded => OutcomeStatus::Succeeded,
            Phase::Exhausted => OutcomeStatus::Exhausted,
            phase => {
                return Err(RefinrError::InvalidState(format!("loop is still {}", phase)));
            }
        };

        Ok(LoopOutcome {
            response: self.response,
            iterations: self.iteration,
            checks: self.checks,
            status,
            history: self.history,
        })
    }
}

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Exhausted,
}

/// Final result of a loop run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopOutcome {
    /// Response from the last generation
    pub response: String,
    /// Generations performed
    pub iterations: u32,
    /// Checks for the last response
    pub checks: EvaluationResult,
    pub status: OutcomeStatus,
    pub history: Vec<IterationRecord>,
}

impl LoopOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}
