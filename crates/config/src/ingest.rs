//! Insert batching and retry configuration

use serde::Deserialize;
use std::time::Duration;

/// Ingest configuration
///
/// # Example
///
/// ```toml
/// [ingest]
/// batch_size = 500
/// max_retries = 3
/// retry_base_delay = "1s"
/// skip_invalid_rows = false
/// ignore_unknown_values = false
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows per chunk in `batch_insert`
    /// Default: 500
    pub batch_size: usize,

    /// Retries per chunk after the first attempt (transient errors only)
    /// Default: 3
    pub max_retries: u32,

    /// First backoff delay, doubled on every retry
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Let the warehouse drop invalid rows instead of rejecting the request
    /// Default: false
    pub skip_invalid_rows: bool,

    /// Let the warehouse ignore unknown columns instead of rejecting the request
    /// Default: false
    pub ignore_unknown_values: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            skip_invalid_rows: false,
            ignore_unknown_values: false,
        }
    }
}
