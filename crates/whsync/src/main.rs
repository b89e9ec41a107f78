//! whsync - Warehouse synchronization engine
//!
//! # Usage
//!
//! ```bash
//! # Create the dataset, tables and roles, then populate the dimensions
//! whsync --config configs/whsync.toml init --populate
//!
//! # Refresh banking networks and the date dimension
//! whsync sync
//! whsync dates --start 2020 --end 2030
//!
//! # Apply domain events (one JSON object per line)
//! whsync apply events.jsonl
//!
//! # Grant a principal read-only access to the dataset
//! whsync grant bi_reader
//! ```

mod cmd;
mod logging;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use whsync_config::Config;

/// Default config locations tried when `--config` is not given
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["configs/whsync.toml", "whsync.toml"];

/// whsync - keep the analytics warehouse in step with the platform
#[derive(Parser, Debug)]
#[command(name = "whsync")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true, env = "WHSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the dataset, tables and access roles
    Init(cmd::init::InitArgs),

    /// Refresh banking networks and the date dimension
    Sync,

    /// Refresh the banking network dimension only
    Networks,

    /// Regenerate the date dimension
    Dates(cmd::sync::DatesArgs),

    /// Apply domain events from a JSON-lines file
    Apply(cmd::apply::ApplyArgs),

    /// Insert JSON-lines rows into a table in retried batches
    Insert(cmd::insert::InsertArgs),

    /// Bulk-load a file into a table
    Load(cmd::load::LoadArgs),

    /// Grant a principal read-only access to the dataset
    Grant(cmd::grant::GrantArgs),

    /// Run a read-only SQL query
    Query(cmd::query::QueryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let log_level = cli.log_level.as_deref();

    match cli.command {
        Command::Init(args) => {
            // Init reports progress on stdout itself
            cmd::init::run(args, &config).await
        }
        Command::Query(args) => {
            // Query doesn't need logging - rows go to stdout
            cmd::query::run(args, &config).await
        }
        Command::Sync => {
            start_logging(log_level, &config)?;
            cmd::sync::run_all(&config).await
        }
        Command::Networks => {
            start_logging(log_level, &config)?;
            cmd::sync::run_networks(&config).await
        }
        Command::Dates(args) => {
            start_logging(log_level, &config)?;
            cmd::sync::run_dates(args, &config).await
        }
        Command::Apply(args) => {
            start_logging(log_level, &config)?;
            cmd::apply::run(args, &config).await
        }
        Command::Insert(args) => {
            start_logging(log_level, &config)?;
            cmd::insert::run(args, &config).await
        }
        Command::Load(args) => {
            start_logging(log_level, &config)?;
            cmd::load::run(args, &config).await
        }
        Command::Grant(args) => {
            start_logging(log_level, &config)?;
            cmd::grant::run(args, &config).await
        }
    }
}

fn start_logging(cli_level: Option<&str>, config: &Config) -> Result<()> {
    let level = logging::resolve_log_level(cli_level, &config.log);
    logging::init_logging(&level, &config.log)
}

/// Load the config file, falling back to defaults when none exists
///
/// The environment is consulted once here; everything downstream sees the
/// resolved, immutable value.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists()),
    };

    let config = match path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    Ok(config.resolve_env())
}
