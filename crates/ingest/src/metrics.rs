//! Ingest counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the ingest client
#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Rows the warehouse confirmed as written
    pub rows_inserted: AtomicU64,

    /// Rows rejected or lost to exhausted retries
    pub rows_failed: AtomicU64,

    /// Insert requests that succeeded
    pub chunks_sent: AtomicU64,

    /// Insert requests that gave up
    pub chunks_failed: AtomicU64,

    /// Backoff retries performed
    pub retries: AtomicU64,

    /// Inserts refused for malformed rows
    pub validation_rejections: AtomicU64,

    /// Inserts where only some rows were written
    pub partial_failures: AtomicU64,

    /// Completed file loads
    pub loads: AtomicU64,

    /// Access bindings added
    pub grants: AtomicU64,
}

impl IngestMetrics {
    pub const fn new() -> Self {
        Self {
            rows_inserted: AtomicU64::new(0),
            rows_failed: AtomicU64::new(0),
            chunks_sent: AtomicU64::new(0),
            chunks_failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            validation_rejections: AtomicU64::new(0),
            partial_failures: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            grants: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_sent(&self, rows: u64) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.rows_inserted.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed(&self, rows: u64) {
        self.chunks_failed.fetch_add(1, Ordering::Relaxed);
        self.rows_failed.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_partial(&self, written: u64, failed: u64) {
        self.partial_failures.fetch_add(1, Ordering::Relaxed);
        self.rows_inserted.fetch_add(written, Ordering::Relaxed);
        self.rows_failed.fetch_add(failed, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_validation_rejection(&self) {
        self.validation_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Rows dropped before any request was made
    #[inline]
    pub fn record_rejected_rows(&self, rows: u64) {
        self.rows_failed.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_load(&self, rows: u64) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.rows_inserted.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_grants(&self, added: u64) {
        self.grants.fetch_add(added, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            validation_rejections: self.validation_rejections.load(Ordering::Relaxed),
            partial_failures: self.partial_failures.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            grants: self.grants.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of ingest metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rows_inserted: u64,
    pub rows_failed: u64,
    pub chunks_sent: u64,
    pub chunks_failed: u64,
    pub retries: u64,
    pub validation_rejections: u64,
    pub partial_failures: u64,
    pub loads: u64,
    pub grants: u64,
}
