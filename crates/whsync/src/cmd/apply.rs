//! Apply domain events from a file
//!
//! Each non-empty line is one JSON event tagged by `type`:
//!
//! ```json
//! {"type": "job_saved", "job": {"job_id": "nightly_ach", "name": "Nightly ACH", ...}}
//! {"type": "user_seen", "user_id": "u1", "profile": {"email": "a@example.com"}}
//! {"type": "network_catalog_updated"}
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::{error, info};
use whsync_config::Config;
use whsync_dimensions::DomainEvent;

use super::{log_metrics, synchronizer};

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// JSON-lines file of domain events
    pub path: PathBuf,

    /// Continue past failed events and report them at the end
    #[arg(long)]
    pub keep_going: bool,
}

pub async fn run(args: ApplyArgs, config: &Config) -> Result<()> {
    let contents = tokio::fs::read_to_string(&args.path)
        .await
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let events = parse_events(&contents)?;

    let sync = synchronizer(config)?;
    let mut failed = 0;
    for (line, event) in &events {
        if let Err(e) = sync.handle(event).await {
            if !args.keep_going {
                log_metrics(sync.client());
                return Err(e).with_context(|| format!("line {}: {} failed", line, event.kind()));
            }
            error!(line, event = event.kind(), error = %e, "event failed");
            failed += 1;
        }
    }
    log_metrics(sync.client());

    info!(
        events = events.len(),
        failed,
        path = %args.path.display(),
        "events applied"
    );
    if failed > 0 {
        bail!("{} of {} events failed", failed, events.len());
    }
    Ok(())
}

/// Parse every event up front so a malformed file changes nothing
fn parse_events(contents: &str) -> Result<Vec<(usize, DomainEvent)>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let event = serde_json::from_str::<DomainEvent>(line)
                .with_context(|| format!("line {}: not a domain event", index + 1))?;
            Ok((index + 1, event))
        })
        .collect()
}
