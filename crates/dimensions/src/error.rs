//! Dimension synchronization errors

use whsync_ingest::IngestError;

/// Result type for dimension operations
pub type Result<T> = std::result::Result<T, DimensionError>;

#[derive(Debug, thiserror::Error)]
pub enum DimensionError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("invalid year range {start}..={end}: {reason}")]
    InvalidYearRange { start: i32, end: i32, reason: String },

    #[error("invalid fiscal year start month {0}, expected 1-12")]
    InvalidFiscalMonth(u32),

    /// A refresh or append that did not write every row
    #[error("{table}: incomplete write, {inserted} inserted, {failed} failed")]
    Incomplete {
        table: String,
        inserted: usize,
        failed: usize,
    },

    /// A domain object unusable as a dimension key
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("network catalog: {0}")]
    Catalog(String),

    /// A stored row didn't decode into its record type
    #[error("{table}: unreadable row: {message}")]
    Corrupt { table: String, message: String },
}

impl DimensionError {
    /// Credentials or settings problem that no retry will fix
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Ingest(e) => e.is_configuration(),
            Self::InvalidYearRange { .. } | Self::InvalidFiscalMonth(_) => true,
            _ => false,
        }
    }
}
