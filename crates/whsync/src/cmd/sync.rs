//! Dimension refresh commands
//!
//! ```bash
//! whsync sync                          # networks, then dates over the configured years
//! whsync networks
//! whsync dates --start 2020 --end 2030
//! ```

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use whsync_config::Config;

use super::{log_metrics, synchronizer};

#[derive(Args, Debug)]
pub struct DatesArgs {
    /// First calendar year (defaults to [dimensions] start_year)
    #[arg(long)]
    pub start: Option<i32>,

    /// Last calendar year, inclusive (defaults to [dimensions] end_year)
    #[arg(long)]
    pub end: Option<i32>,
}

pub async fn run_all(config: &Config) -> Result<()> {
    let sync = synchronizer(config)?;
    let result = sync.sync_all().await.context("dimension sync failed");
    log_metrics(sync.client());

    let summary = result?;
    info!(
        networks = summary.networks,
        dates = summary.dates,
        "dimension sync complete"
    );
    Ok(())
}

pub async fn run_networks(config: &Config) -> Result<()> {
    let sync = synchronizer(config)?;
    let result = sync
        .sync_banking_networks()
        .await
        .context("banking network refresh failed");
    log_metrics(sync.client());
    result.map(|_| ())
}

pub async fn run_dates(args: DatesArgs, config: &Config) -> Result<()> {
    let start = args.start.unwrap_or(config.dimensions.start_year);
    let end = args.end.unwrap_or(config.dimensions.end_year);

    let sync = synchronizer(config)?;
    let result = sync
        .generate_date_dimension(start, end)
        .await
        .with_context(|| format!("date dimension {}..={} failed", start, end));
    log_metrics(sync.client());
    result.map(|_| ())
}
