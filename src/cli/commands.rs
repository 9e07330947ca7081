//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: drive the refine loop (its arguments also work without the subcommand)
//! - check: score a text against the rubric without calling any model

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Refinr - generate, check, and refine LLM answers against a rubric
#[derive(Parser, Debug)]
#[command(name = "refinr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Run arguments used when no subcommand is given
    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the refine loop on a prompt
    Run(RunArgs),

    /// Score a response against the rubric
    Check {
        /// File holding the response (reads stdin when omitted)
        file: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Initial prompt (defaults to the smart-wearables demo brief)
    pub prompt: Option<String>,

    /// Read the initial prompt from a file
    #[arg(short = 'f', long, conflicts_with = "prompt")]
    pub prompt_file: Option<PathBuf>,

    /// Maximum generate/evaluate rounds
    #[arg(short = 'n', long)]
    pub max_iters: Option<u32>,

    /// Model for the market-research answer
    #[arg(long)]
    pub task_model: Option<String>,

    /// Model used to rewrite prompts
    #[arg(long)]
    pub meta_model: Option<String>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_no_args() {
        // No args runs the demo prompt
        let cli = Cli::try_parse_from(["refinr"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
        assert!(cli.run.prompt.is_none());
    }

    #[test]
    fn test_bare_prompt_and_flags() {
        let cli = Cli::try_parse_from([
            "refinr",
            "Write a brief",
            "--max-iters",
            "2",
            "--task-model",
            "t",
            "--meta-model",
            "m",
            "--json",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.prompt.as_deref(), Some("Write a brief"));
        assert_eq!(cli.run.max_iters, Some(2));
        assert_eq!(cli.run.task_model.as_deref(), Some("t"));
        assert_eq!(cli.run.meta_model.as_deref(), Some("m"));
        assert!(cli.run.json);
    }

    #[test]
    fn test_bare_json_flag() {
        let cli = Cli::try_parse_from(["refinr", "--json"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.run.json);
    }

    #[test]
    fn test_run_args_rejected_after_check() {
        let result = Cli::try_parse_from(["refinr", "check", "--json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["refinr", "-v"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["refinr", "-c", "/path/to/refinr.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/refinr.yml")));
    }

    #[test]
    fn test_run_with_prompt_and_flags() {
        let cli = Cli::try_parse_from([
            "refinr",
            "run",
            "Write a brief",
            "-n",
            "2",
            "--task-model",
            "t",
            "--meta-model",
            "m",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.prompt.as_deref(), Some("Write a brief"));
                assert_eq!(args.max_iters, Some(2));
                assert_eq!(args.task_model.as_deref(), Some("t"));
                assert_eq!(args.meta_model.as_deref(), Some("m"));
                assert!(args.json);
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_run_prompt_and_file_conflict() {
        let result = Cli::try_parse_from(["refinr", "run", "inline", "-f", "prompt.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_with_file() {
        let cli = Cli::try_parse_from(["refinr", "check", "answer.md"]).unwrap();
        match cli.command {
            Some(Commands::Check { file }) => assert_eq!(file, Some(PathBuf::from("answer.md"))),
            _ => panic!("Expected check command"),
        }
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
