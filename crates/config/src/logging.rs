//! `[log]` section
//!
//! Sync runs log one line per dimension and per failed chunk at `info`/`warn`;
//! retry backoff and per-batch receipts only show at `debug`. The binary's
//! `--log-level` flag replaces the whole filter built here.

use std::fmt;

use serde::Deserialize;

/// Base verbosity for every `whsync_*` target
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Row-level detail, including warehouse request parameters
    Trace,
    /// Retry backoff, chunk receipts, row counts per insert
    Debug,
    /// Sync summaries and grant outcomes
    #[default]
    Info,
    /// Partial failures and skipped dimensions
    Warn,
    Error,
}

impl LogLevel {
    /// Directive spelling understood by `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line encoding for log records
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Colored text when the sink is a terminal stream
    #[default]
    Console,
    /// One JSON object per record, for log shippers
    Json,
}

/// Where records go
///
/// Anything other than `stdout` or `stderr` is taken as a file path and
/// opened in append mode.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    #[serde(untagged)]
    File(String),
}

/// Logging settings for sync and ingest runs
///
/// ```toml
/// [log]
/// level = "info"
/// format = "json"
/// output = "/var/log/whsync/sync.log"
/// directives = ["whsync_ingest=debug", "reqwest=warn"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Per-target overrides appended after the base level
    pub directives: Vec<String>,
}

impl LogConfig {
    /// `EnvFilter` directive: base level first, then the non-blank overrides
    pub fn filter_directive(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(
                self.directives
                    .iter()
                    .map(|d| d.trim())
                    .filter(|d| !d.is_empty()),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether records go to a file rather than a terminal stream
    pub fn writes_to_file(&self) -> bool {
        matches!(self.output, LogOutput::File(_))
    }
}
