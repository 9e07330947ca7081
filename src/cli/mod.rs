//! CLI module for refinr - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the refine
//! loop and for scoring a response offline.

pub mod commands;

pub use commands::Cli;
