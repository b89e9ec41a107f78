//! Bulk file load
//!
//! ```bash
//! whsync load fact_audit_logs audit.jsonl
//! whsync load dim_users users.export --format csv
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;
use whsync_config::Config;
use whsync_warehouse::LoadFormat;

use super::{ingest_client, log_metrics};

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Destination table
    pub table: String,

    /// File to load
    pub path: PathBuf,

    /// jsonl, csv or parquet (guessed from the extension when omitted)
    #[arg(long)]
    pub format: Option<LoadFormat>,
}

pub async fn run(args: LoadArgs, config: &Config) -> Result<()> {
    let format = resolve_format(&args.path, args.format)?;
    let client = ingest_client(config)?;

    let result = client
        .load_from_file(&args.table, &args.path, format)
        .await
        .with_context(|| format!("load of {} into {} failed", args.path.display(), args.table));
    log_metrics(&client);

    let job = result?;
    info!(
        table = %args.table,
        job_id = %job.job_id,
        rows = job.rows_loaded,
        "file loaded"
    );
    Ok(())
}

fn resolve_format(path: &Path, explicit: Option<LoadFormat>) -> Result<LoadFormat> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(LoadFormat::from_extension)
        .with_context(|| {
            format!(
                "cannot tell the format of {}; pass --format",
                path.display()
            )
        })
}
