//! `checkup` — Checks HTML and CSS files against configured rules.
//!
//! **Usage:**
//! ```text
//! checkup check [--config <file>] [--rule <name>]... [--deadline-ms <n>] [paths]...
//! checkup rules
//! ```
//!
//! `check` prints the combined report as JSON and exits non-zero if any
//! `ERROR` or `FATAL` message was reported or the run was refused.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use checkup_conformance::{read_config, Config, Registry, Runner, Severity, SourceLoader};
use clap::{Args, Parser, Subcommand};
use serde_json::Map;
use tokio::task::LocalSet;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Run pluggable validation rules over HTML and CSS files.
#[derive(Parser)]
#[command(name = "checkup", version, about)]
struct Cli {
    /// Log rule lifecycle events to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check files and print the report.
    Check(CheckArgs),
    /// List the built-in rules.
    Rules,
}

#[derive(Args)]
struct CheckArgs {
    /// Configuration file (`.json` or `.toml`).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rule to run, in addition to the configured ones. Repeatable.
    #[arg(short, long = "rule")]
    rules: Vec<String>,

    /// Minimum severity to report, overriding the configuration.
    #[arg(long)]
    severity: Option<Severity>,

    /// Give up on rules still running after this many milliseconds.
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Print the report on one line.
    #[arg(long)]
    compact: bool,

    /// Files or directories to check. Defaults to the configured `src`.
    paths: Vec<PathBuf>,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("checkup_conformance=debug,checkup=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Rules => {
            let registry = Registry::builtin();
            for entry in registry.iter() {
                println!("{:<12} {}", entry.name(), entry.description());
            }
        }
        Command::Check(args) => {
            if !check(args)? {
                process::exit(1);
            }
        }
    }
    Ok(())
}

/// Runs the check and returns true if nothing at `ERROR` or above was reported.
fn check(args: CheckArgs) -> Result<bool> {
    let mut config = match &args.config {
        Some(path) => read_config(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => Config::default(),
    };
    for name in &args.rules {
        config.rules.entry(name.clone()).or_insert_with(Map::new);
    }
    let registry = Registry::builtin();
    if config.rules.is_empty() {
        debug!("no rules configured, running every built-in rule");
        for name in registry.names() {
            config.rules.insert(name.to_string(), Map::new());
        }
    }
    if args.severity.is_some() {
        config.severity = args.severity;
    }

    let runner = Runner::new(registry);
    runner
        .configure(&config)
        .context("Invalid configuration")?;

    let paths: Vec<PathBuf> = if args.paths.is_empty() {
        runner.options().src.iter().map(PathBuf::from).collect()
    } else {
        args.paths
    };
    let sources = SourceLoader::new()
        .load(&paths)
        .context("Failed to read sources")?;
    info!(files = sources.len(), "checking");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start the runtime")?;
    let deadline = args.deadline_ms.map(Duration::from_millis);
    let outcome = LocalSet::new().block_on(&runtime, runner.run_until_complete(sources, deadline));

    let report = match outcome {
        Ok(report) => report,
        Err(message) => {
            eprintln!("checkup: {}", message.message);
            return Ok(false);
        }
    };
    let rendered = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{rendered}");

    let worst = runner.output().worst_severity();
    Ok(worst.map_or(true, |severity| severity < Severity::Error))
}
