//! hrvstream CLI - progressive HRV replay and artifact evaluation tool.

use anyhow::Result;
use clap::{Parser, Subcommand};
use hrvstream_core::config::LogFormat;
use hrvstream_core::{Config, Error};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, invalid aggregate parameters)
    ConfigError = 1,
    /// Input broke the buffer contract (unknown column, wrong type, unsorted rows)
    ContractViolation = 2,
    /// Input or output file could not be read, parsed or written
    IoError = 3,
    /// General runtime error
    RuntimeError = 10,
}

impl ExitCode {
    /// Convert an error to an exit code by inspecting its cause chain.
    fn from_error(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if let Some(err) = cause.downcast_ref::<Error>() {
                return match err {
                    Error::Config(_) => ExitCode::ConfigError,
                    Error::Contract(_) => ExitCode::ContractViolation,
                    Error::Io(_) | Error::Serialization(_) => ExitCode::IoError,
                    Error::Arrow(_) => ExitCode::RuntimeError,
                };
            }
            if cause.is::<std::io::Error>() || cause.is::<serde_json::Error>() {
                return ExitCode::IoError;
            }
        }
        ExitCode::RuntimeError
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "hrvstream")]
#[command(about = "Windowed HRV analytics over PPI streams", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a row file and attach one result column per aggregate
    Replay {
        /// JSON row file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override buffer capacity
        #[arg(long)]
        capacity: Option<usize>,

        /// Sort rows by timestamp before replay
        #[arg(long)]
        sort: bool,
    },

    /// Measure how a perturbed batch shifts every aggregate
    Evaluate {
        /// Clean JSON row file
        #[arg(long)]
        clean: PathBuf,

        /// Perturbed JSON row file
        #[arg(long)]
        perturbed: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

fn main() {
    let exit_code = run_cli();
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Try to load config for log settings (optional - falls back to defaults)
    let monitoring = cli
        .config
        .as_ref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.monitoring)
        .unwrap_or_default();

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(monitoring.log_level.as_str()),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Logs go to stderr so replay output on stdout stays machine-readable
    match monitoring.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }

    let result = execute_command(cli);

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            capacity,
            sort,
        } => {
            let config = load_config(&cli.config)?;
            commands::replay::run(config, &input, output.as_deref(), capacity, sort)?;
        }

        Commands::Evaluate { clean, perturbed } => {
            let config = load_config(&cli.config)?;
            commands::evaluate::run(config, &clean, &perturbed)?;
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            println!(
                "Configuration is valid: {} columns, {} aggregates, capacity {}",
                config.buffer.columns.len(),
                config.aggregates.len(),
                config.buffer.capacity
            );
        }
    }

    Ok(())
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    Ok(config)
}
