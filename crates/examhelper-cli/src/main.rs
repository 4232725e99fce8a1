//! examhelper - command-line client for the exam helper backend.
//!
//! Runs an interactive shell (or a single command) against the backend.
//! Whenever the server rejects the stored session, the shell discards all of
//! its state and bootstraps again from scratch.

mod app;
mod commands;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use examhelper_core::{Config, StorageBackend};

use app::{App, Exit};
use commands::Command;

/// Log file name inside the data directory
const LOG_FILE: &str = "examhelper.log";

#[derive(Debug, Parser)]
#[command(name = "examhelper", version, about = "Exam helper command-line client")]
struct Cli {
    /// Backend base URL (overrides config and EXAMHELPER_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Session storage backend: file, keychain or memory
    #[arg(long)]
    storage: Option<StorageBackend>,

    /// Run one command and exit, e.g. `examhelper tasks`
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

/// Initialize the tracing subscriber, logging to a file so prompts stay clean.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = log_writer(log_dir);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    guard
}

/// Log file in `log_dir`, or stderr when the file can't be created
fn log_writer(log_dir: &Path) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE)
        .build(log_dir);
    match appender {
        Ok(appender) => tracing_appender::non_blocking(appender),
        Err(e) => {
            eprintln!("Logging to stderr, cannot open {}: {}", log_dir.join(LOG_FILE).display(), e);
            tracing_appender::non_blocking(std::io::stderr())
        }
    }
}

/// Load config fresh for every bootstrap so nothing survives a reset
fn load_config(cli: &Cli) -> Config {
    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    if let Some(ref url) = cli.base_url {
        config.base_url = url.clone();
    }
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_dir = Config::data_dir().unwrap_or_else(|_| PathBuf::from("."));
    let _guard = init_tracing(&log_dir);
    info!("examhelper starting");

    let one_shot = if cli.command.is_empty() {
        None
    } else {
        Some(cli.command.join(" ").parse::<Command>()?)
    };

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let mut app = App::bootstrap(load_config(&cli))?;

        let exit = match one_shot.clone() {
            Some(command) => app.run_once(command, &mut input).await?,
            None => app.run(&mut input).await?,
        };

        match exit {
            Exit::Quit => break,
            Exit::Reset if one_shot.is_some() => {
                anyhow::bail!("Session rejected by server, please log in again");
            }
            Exit::Reset => {
                info!("Restarting from bootstrap");
                drop(app);
            }
        }
    }

    info!("examhelper shutting down");
    Ok(())
}
