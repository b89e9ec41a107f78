//! Batch insert from a JSON-lines file
//!
//! Rows go through the retried batch path: chunked, transient failures backed
//! off and retried per chunk. Ctrl-C stops after the chunk in flight and reports
//! what was skipped.
//!
//! ```bash
//! whsync insert fact_banking_transactions transactions.jsonl --batch-size 1000
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use whsync_config::Config;
use whsync_warehouse::Row;

use super::{ingest_client, log_metrics};

#[derive(Args, Debug)]
pub struct InsertArgs {
    /// Destination table
    pub table: String,

    /// JSON-lines file, one row object per line
    pub path: PathBuf,

    /// Rows per request (defaults to [ingest] batch_size)
    #[arg(long)]
    pub batch_size: Option<usize>,
}

pub async fn run(args: InsertArgs, config: &Config) -> Result<()> {
    let contents = tokio::fs::read_to_string(&args.path)
        .await
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let rows = parse_rows(&contents)?;
    let batch_size = args.batch_size.unwrap_or(config.ingest.batch_size);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current chunk");
            interrupt.cancel();
        }
    });

    let client = ingest_client(config)?;
    let result = client
        .batch_insert_with_cancel(&args.table, &rows, batch_size, &cancel)
        .await
        .with_context(|| format!("insert into {} failed", args.table));
    log_metrics(&client);

    let result = result?;
    info!(
        table = %args.table,
        inserted = result.inserted,
        failed = result.failed,
        skipped = result.skipped,
        "insert finished"
    );
    if !result.is_complete() {
        bail!(
            "{}: {} of {} rows not inserted",
            args.table,
            result.failed + result.skipped,
            rows.len()
        );
    }
    Ok(())
}

fn parse_rows(contents: &str) -> Result<Vec<Row>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<Row>(line)
                .with_context(|| format!("line {}: not a JSON object", index + 1))
        })
        .collect()
}
