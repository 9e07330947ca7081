//! Refinr - a generate-check-refine loop around a hosted LLM
//!
//! Refinr asks a task model to answer a prompt, checks the answer against a
//! rubric of required sections, and when sections are missing asks a meta
//! model to rewrite the prompt before trying again.

pub mod config;
pub mod error;
pub mod llm;
pub mod refine;
pub mod rewrite;
pub mod rubric;

pub use error::{RefinrError, Result};
pub use refine::{LoopOutcome, RefineLoop, RefineSettings};
