//! Spindle CLI - interactive streaming text generation
//!
//! Reads a prompt, wraps it in the chat template and streams the model's
//! reply to stdout. Ctrl-C stops generation and keeps the partial output.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod config;
mod utils;

use commands::{info::InfoCommand, run::RunCommand, Command};

#[derive(Parser)]
#[command(
    name = "spindle",
    version = env!("CARGO_PKG_VERSION"),
    about = "Streaming text generation from the command line",
    long_about = "Reads a prompt, formats it with a chat template and streams the generated reply token by token. Press Ctrl-C to stop generation early."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SPINDLE_CONFIG")]
    config: Option<PathBuf>,

    /// JSON output format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate text from a prompt
    #[command(name = "run", alias = "r")]
    Run(RunCommand),

    /// Display model information
    #[command(name = "info", alias = "i")]
    Info(InfoCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    debug!("Spindle CLI v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match config::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            utils::print_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };
    debug!("Configuration loaded: {:?}", config);

    let result = match cli.command {
        Commands::Run(cmd) => cmd.execute(&config, cli.json).await,
        Commands::Info(cmd) => cmd.execute(&config, cli.json).await,
    };

    match result {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            utils::print_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}

/// Log to stderr so generated text on stdout stays clean.
/// `RUST_LOG` overrides the level chosen by the flags.
fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
