//! Read-only access grant
//!
//! ```bash
//! whsync grant bi_reader
//! ```

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use whsync_config::Config;

use super::{ingest_client, log_metrics};

#[derive(Args, Debug)]
pub struct GrantArgs {
    /// Warehouse user to grant the viewer and job-runner roles to
    pub principal: String,
}

pub async fn run(args: GrantArgs, config: &Config) -> Result<()> {
    let client = ingest_client(config)?;
    let result = client
        .grant_read_only_access(&args.principal)
        .await
        .with_context(|| format!("grant to {} failed", args.principal));
    log_metrics(&client);

    let added = result?;
    info!(
        principal = %args.principal,
        dataset = %config.warehouse.dataset,
        added,
        "access grant complete"
    );
    Ok(())
}
