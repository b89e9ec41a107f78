//! Query command - run read-only SQL against the dataset
//!
//! # Usage
//!
//! ```bash
//! whsync query "SELECT job_id, count() FROM analytics.dim_jobs GROUP BY job_id"
//! whsync query "SELECT * FROM analytics.dim_date LIMIT 3" --format json
//! ```
//!
//! Only `SELECT` / `WITH` statements are accepted.

use std::io::Write;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use whsync_config::Config;
use whsync_warehouse::Row;

use super::ingest_client;

/// Output format for result rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Jsonl,
    /// A pretty-printed JSON array
    Json,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// SQL query to execute (SELECT only)
    #[arg(value_name = "SQL")]
    pub sql: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Jsonl)]
    pub format: OutputFormat,
}

pub async fn run(args: QueryArgs, config: &Config) -> Result<()> {
    let client = ingest_client(config)?;
    let started = Instant::now();
    let rows = client
        .query_rows(&args.sql)
        .await
        .context("query execution failed")?;

    let mut stdout = std::io::stdout().lock();
    write_rows(&mut stdout, &rows, args.format)?;

    // Summary to stderr keeps stdout machine-readable
    eprintln!(
        "\n{} row(s) in {}ms",
        rows.len(),
        started.elapsed().as_millis()
    );
    Ok(())
}

fn write_rows(out: &mut impl Write, rows: &[Row], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Jsonl => {
            for row in rows {
                serde_json::to_writer(&mut *out, row)?;
                writeln!(out)?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, rows)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}
