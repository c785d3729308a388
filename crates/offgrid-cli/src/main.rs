//! offgrid - operator front end for the offline store.
//!
//! Lists and edits drafts, inspects and sweeps the expiring cache, and reports
//! connectivity using the same library the application embeds.

mod args;
mod commands;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::{Cli, Commands};
use offgrid_core::Config;

/// Log file name prefix inside `log_dir`
const LOG_FILE_PREFIX: &str = "offgrid.log";

/// Initialize the tracing subscriber for logging.
///
/// Returns the file writer guard when a log directory is configured; it must
/// stay alive for buffered lines to be flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load()
        .context("Failed to load config")?
        .with_env_overrides();
    if let Some(path) = cli.database {
        config.database_path = Some(path);
    }

    let _log_guard = init_tracing(config.log_dir.as_deref());
    info!(command = ?cli.command, "offgrid starting");

    match cli.command {
        Commands::Drafts(command) => commands::drafts(&config, command).await,
        Commands::Cache(command) => commands::cache(&config, command).await,
        Commands::Status { probe } => commands::status(&config, probe).await,
        Commands::Watch => commands::watch(&config).await,
        Commands::Config(command) => commands::config(&config, command),
    }
}
