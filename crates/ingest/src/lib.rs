//! Warehouse ingest client
//!
//! [`IngestClient`] owns the warehouse session and pushes rows into it:
//!
//! - **stream_insert**: one request, no retries, partial failures surfaced exactly
//! - **batch_insert**: order-preserving chunks, each retried with exponential backoff
//! - **load_from_file**: bulk append of JSON lines / CSV / Parquet
//! - **query**: read-only SQL into caller types
//! - **grant_read_only_access**: additive, etag-checked access policy update
//!
//! The session is created on first use. Credentials come from a
//! [`CredentialResolver`] (vault first, key file second); a missing credential source
//! is a [`IngestError::Configuration`] and is never retried.
//!
//! # Example
//!
//! ```ignore
//! let client = IngestClient::new(
//!     IngestSettings::from_config(&config),
//!     CredentialResolver::from_config(&config.credentials),
//!     Arc::new(ClickHouseConnector::from_config(&config.warehouse)),
//! );
//! let result = client.batch_insert("fact_audit_logs", &rows, 500).await?;
//! assert_eq!(result.total(), rows.len());
//! ```

mod client;
mod credentials;
mod error;
mod locks;
mod metrics;
mod retry;

pub use client::{
    ClickHouseConnector, DEFAULT_BATCH_SIZE, IngestClient, IngestSettings, InsertOptions,
    WarehouseConnector,
};
pub use credentials::{
    CredentialResolver, Credentials, FileSecretStore, SecretStore, StaticSecretStore,
};
pub use error::{IngestError, Result};
pub use locks::KeyedLocks;
pub use metrics::{IngestMetrics, MetricsSnapshot};
pub use retry::RetryPolicy;

/// Aggregate outcome of a batched insert
///
/// `inserted + failed + skipped` always equals the number of rows handed in;
/// `skipped` is non-zero only when the call was cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertResult {
    pub inserted: usize,
    pub failed: usize,
    /// Rows never attempted because of cancellation
    pub skipped: usize,
    pub cancelled: bool,
}

impl InsertResult {
    pub fn total(&self) -> usize {
        self.inserted + self.failed + self.skipped
    }

    /// Every row written
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}
