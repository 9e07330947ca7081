use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{LevelFilter, info};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use refinr::config::{Config, ConfigOverrides};
use refinr::llm::GradientClient;
use refinr::refine::{LoopOutcome, RefineLoop};
use refinr::rubric::{EvaluationResult, Evaluator};

mod cli;

use cli::Cli;
use cli::commands::{Commands, RunArgs};

const DEMO_PROMPT: &str = "Market Research: Write a market research brief for entering the North American smart-wearables market.\nMake it useful for a Product Manager.";

/// True when RUST_LOG carries the filter instead of config and flags
fn env_filter_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("refinr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("refinr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Pipe(target));
    if env_filter_set() {
        builder.parse_env(env_logger::Env::default());
    } else {
        // Level is narrowed through log::set_max_level once config is known
        builder.filter_level(LevelFilter::Trace);
    }
    builder.init();

    if !env_filter_set() {
        log::set_max_level(if verbose { LevelFilter::Debug } else { LevelFilter::Info });
    }

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Apply the configured level unless RUST_LOG is in charge; --verbose wins
fn apply_log_level(cli: &Cli, config: &Config) -> Result<()> {
    if env_filter_set() {
        return Ok(());
    }
    let level = if cli.is_verbose() {
        LevelFilter::Debug
    } else {
        config.log_filter().context("Invalid log level")?
    };
    log::set_max_level(level);
    Ok(())
}

async fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    match &cli.command {
        None => handle_run_command(&cli.run, config).await,
        Some(Commands::Run(args)) => handle_run_command(args, config).await,
        Some(Commands::Check { file }) => handle_check_command(file.as_deref(), &config),
    }
}

async fn handle_run_command(args: &RunArgs, mut config: Config) -> Result<()> {
    let prompt = match (&args.prompt, &args.prompt_file) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(path)) => {
            fs::read_to_string(path).context(format!("Failed to read prompt from {}", path.display()))?
        }
        (None, None) => DEMO_PROMPT.to_string(),
    };

    let cli_overrides = ConfigOverrides {
        task_model: args.task_model.clone(),
        meta_model: args.meta_model.clone(),
        max_iterations: args.max_iters,
    };
    let overrides = ConfigOverrides::from_env()
        .context("Invalid environment override")?
        .merge(cli_overrides);
    if !overrides.is_empty() {
        info!("Applying overrides: {:?}", overrides);
    }
    config.apply_overrides(&overrides);

    let settings = config.refine_settings().context("Invalid configuration")?;
    let api_key = config.api_key().context("Cannot start the refine loop")?;
    let client = Arc::new(
        GradientClient::with_api_key(api_key, config.gradient_config()).context("Failed to create inference client")?,
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Ctrl-C received, cancelling");
            ctrl_c.cancel();
        }
    });

    println!("{} {} (task) / {} (meta)", "Models:".cyan(), settings.task.model, settings.meta.model);
    let refine = RefineLoop::new(client.clone(), settings);
    println!("{} {}", "Iteration budget:".cyan(), refine.max_iterations());
    let outcome = refine
        .run_with_cancel(&prompt, None, &cancel)
        .await
        .context("Refine loop failed")?;

    let usage = client.total_usage();
    info!(
        "Token usage: {} prompt, {} completion, {} total",
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.total()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &LoopOutcome) {
    println!("\n{}\n", "===== FINAL OUTPUT =====".bold());
    println!("{}", outcome.response);
    println!("\n{}", "===== METADATA =====".bold());
    println!("Iterations used: {}", outcome.iterations);
    print_checks(&outcome.checks);

    if outcome.succeeded() {
        println!("{}", "Response accepted by quality checker.".green());
    } else {
        println!("{}", "Max iterations reached; returning last response (may be incomplete).".yellow());
    }
}

fn print_checks(checks: &EvaluationResult) {
    println!("Final checks:");
    for check in checks.checks() {
        let mark = if check.passed { "pass".green() } else { "fail".red() };
        println!("  [{}] {}", mark, check.name);
    }
}

fn handle_check_command(file: Option<&Path>, config: &Config) -> Result<()> {
    let text = match file {
        Some(path) => fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let settings = config.refine_settings().context("Invalid configuration")?;
    let checks = settings.rubric.evaluate(&text);
    info!("Checked {} bytes: {}", text.len(), checks);

    print_checks(&checks);
    if checks.passed() {
        println!("{}", "All sections present.".green());
    } else {
        println!("{} {}", "Missing:".red(), checks.failed().join(", "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging before config so load warnings are recorded
    setup_logging(cli.is_verbose()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    apply_log_level(&cli, &config)?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).await.context("Application failed")?;

    Ok(())
}
