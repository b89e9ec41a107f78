//! Ingest error types

use whsync_warehouse::{ErrorKind, RowError, WarehouseError};

/// Result type for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors from the ingest client
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Credentials or settings are missing or unusable; never retried
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Rows rejected as malformed; never retried
    #[error("{table}: {failed} rows rejected: {message}")]
    Validation {
        table: String,
        message: String,
        failed: usize,
        errors: Vec<RowError>,
    },

    /// Network, timeout, throttling; retried by `batch_insert`
    #[error("{table}: transient failure: {message}")]
    Transient { table: String, message: String },

    /// Some rows written, some rejected
    #[error("{table}: partial failure, {inserted} inserted, {failed} failed")]
    PartialFailure {
        table: String,
        inserted: usize,
        failed: usize,
        errors: Vec<RowError>,
    },

    /// Caller passed something unusable (principal name, batch size)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Query rows didn't match the requested type
    #[error("failed to decode query row: {0}")]
    Decode(#[from] serde_json::Error),

    /// Any other warehouse failure (auth, unknown table, conflicts)
    #[error("{context}: {source}")]
    Warehouse {
        context: String,
        #[source]
        source: WarehouseError,
    },
}

impl IngestError {
    /// Map a warehouse error raised while working on `context` (usually a table name)
    pub fn from_warehouse(context: &str, err: WarehouseError) -> Self {
        match err {
            WarehouseError::Validation {
                message,
                rejected,
                errors,
                ..
            } => Self::Validation {
                table: context.to_string(),
                message,
                failed: rejected,
                errors,
            },
            WarehouseError::Transient(message) => Self::Transient {
                table: context.to_string(),
                message,
            },
            source => Self::Warehouse {
                context: context.to_string(),
                source,
            },
        }
    }

    /// Whether a retry might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Underlying warehouse error category, if any
    pub fn warehouse_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Warehouse { source, .. } => Some(source.kind()),
            Self::Transient { .. } => Some(ErrorKind::Transient),
            Self::Validation { .. } => Some(ErrorKind::Validation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_warehouse_validation() {
        let err = IngestError::from_warehouse(
            "dim_jobs",
            WarehouseError::validation("dim_jobs", "bad row", 4, vec![RowError::at(1, "x")]),
        );
        match err {
            IngestError::Validation { table, failed, errors, .. } => {
                assert_eq!(table, "dim_jobs");
                assert_eq!(failed, 4);
                assert_eq!(errors.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_only_transient_is_retryable() {
        let transient =
            IngestError::from_warehouse("t", WarehouseError::Transient("timeout".into()));
        assert!(transient.is_retryable());

        let auth = IngestError::from_warehouse("t", WarehouseError::Auth("denied".into()));
        assert!(!auth.is_retryable());
        assert_eq!(auth.warehouse_kind(), Some(ErrorKind::Auth));

        assert!(!IngestError::Configuration("no creds".into()).is_retryable());
    }

    #[test]
    fn test_partial_failure_display() {
        let err = IngestError::PartialFailure {
            table: "fact_audit_logs".into(),
            inserted: 8,
            failed: 2,
            errors: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "fact_audit_logs: partial failure, 8 inserted, 2 failed"
        );
    }
}
