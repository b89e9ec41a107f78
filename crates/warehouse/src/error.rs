//! Warehouse error types and classification

use std::fmt;

/// Result type for warehouse operations
pub type Result<T> = std::result::Result<T, WarehouseError>;

/// A rejected row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Position in the submitted batch, when the warehouse reports it
    pub index: Option<usize>,
    pub message: String,
}

impl RowError {
    pub fn at(index: usize, message: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            message: message.into(),
        }
    }

    pub fn unlocated(message: impl Into<String>) -> Self {
        Self {
            index: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "row {}: {}", index, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Coarse error category, drives retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network, timeout, throttling, overload
    Transient,
    Auth,
    /// Malformed rows or query
    Validation,
    NotFound,
    /// Optimistic concurrency check failed
    Conflict,
    Unsupported,
    Io,
    /// Anything else the server refused
    Other,
}

/// Errors from the warehouse boundary
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Worth retrying after a pause
    #[error("transient warehouse failure: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// The whole request was rejected because of its content
    #[error("{table} rejected {rejected} rows: {message}")]
    Validation {
        table: String,
        message: String,
        rejected: usize,
        errors: Vec<RowError>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// Access policy changed between read and write
    #[error("access policy changed concurrently (expected etag {expected}, found {found})")]
    Conflict { expected: String, found: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Only SELECT and WITH are allowed through `query`
    #[error("invalid SQL: {0}")]
    InvalidSql(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected response shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server-side failure without a more specific category
    #[error("warehouse error (HTTP {status}, code {code:?}): {message}")]
    Server {
        status: u16,
        code: Option<u32>,
        message: String,
    },
}

impl WarehouseError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::Transient,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Validation { .. } | Self::InvalidSql(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Io { .. } => ErrorKind::Io,
            Self::Protocol(_) | Self::Server { .. } => ErrorKind::Other,
        }
    }

    /// Only transient failures are retried
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Build a validation error for a batch
    pub fn validation(
        table: impl Into<String>,
        message: impl Into<String>,
        rejected: usize,
        errors: Vec<RowError>,
    ) -> Self {
        Self::Validation {
            table: table.into(),
            message: message.into(),
            rejected,
            errors,
        }
    }
}

impl From<reqwest::Error> for WarehouseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::Transient(err.to_string());
        }
        if let Some(status) = err.status()
            && (status.is_server_error() || status.as_u16() == 429)
        {
            return Self::Transient(err.to_string());
        }
        if err.is_request() || err.is_body() {
            return Self::Transient(err.to_string());
        }
        Self::Protocol(err.to_string())
    }
}

// ClickHouse exception codes, grouped by how the engine reacts to them.

/// Overload, timeouts, network, too many parts
const TRANSIENT_CODES: &[u32] = &[159, 202, 209, 210, 241, 242, 252, 319, 999];

/// Row content does not fit the table
const VALIDATION_CODES: &[u32] = &[6, 8, 16, 26, 27, 38, 41, 53, 70, 72, 117, 349];

const AUTH_CODES: &[u32] = &[192, 194, 497, 516];

/// UNKNOWN_TABLE, UNKNOWN_DATABASE, UNKNOWN_ROLE
const NOT_FOUND_CODES: &[u32] = &[60, 81, 511];

/// Classify a failed ClickHouse HTTP response
///
/// `table` and `submitted` describe the request so validation errors carry
/// the batch context.
pub fn classify_response(
    status: u16,
    code: Option<u32>,
    message: String,
    table: &str,
    submitted: usize,
) -> WarehouseError {
    if let Some(code) = code {
        if TRANSIENT_CODES.contains(&code) {
            return WarehouseError::Transient(message);
        }
        if AUTH_CODES.contains(&code) {
            return WarehouseError::Auth(message);
        }
        if NOT_FOUND_CODES.contains(&code) {
            return WarehouseError::NotFound(message);
        }
        if VALIDATION_CODES.contains(&code) {
            let errors = row_errors_from_message(&message);
            return WarehouseError::validation(table, message, submitted, errors);
        }
        return WarehouseError::Server {
            status,
            code: Some(code),
            message,
        };
    }

    match status {
        401 | 403 => WarehouseError::Auth(message),
        404 => WarehouseError::NotFound(message),
        408 | 429 | 500..=599 => WarehouseError::Transient(message),
        _ => WarehouseError::Server {
            status,
            code: None,
            message,
        },
    }
}

/// Extract the exception code from a ClickHouse error body (`Code: 60. DB::Exception: ...`)
pub fn code_from_body(body: &str) -> Option<u32> {
    let rest = body.trim_start().strip_prefix("Code: ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// ClickHouse reports the first bad row as `(at row N)`, 1-based
fn row_errors_from_message(message: &str) -> Vec<RowError> {
    let Some(pos) = message.find("at row ") else {
        return vec![RowError::unlocated(message)];
    };
    let digits: String = message[pos + "at row ".len()..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    match digits.parse::<usize>() {
        Ok(row) if row > 0 => vec![RowError::at(row - 1, message)],
        _ => vec![RowError::unlocated(message)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_codes() {
        let err = classify_response(500, Some(202), "too many queries".into(), "t", 5);
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_validation_code_keeps_context() {
        let message = "Code: 27. DB::Exception: Cannot parse input: expected '\"' (at row 3)".to_string();
        let err = classify_response(400, Some(27), message, "dim_jobs", 10);
        match err {
            WarehouseError::Validation {
                table,
                rejected,
                errors,
                ..
            } => {
                assert_eq!(table, "dim_jobs");
                assert_eq!(rejected, 10);
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].index, Some(2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_auth_and_not_found() {
        assert_eq!(
            classify_response(403, Some(516), "bad password".into(), "t", 1).kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            classify_response(404, Some(60), "no table".into(), "t", 1).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_unknown_code_is_not_retried() {
        let err = classify_response(500, Some(62), "syntax error".into(), "t", 1);
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_status_fallback_without_code() {
        assert!(classify_response(503, None, "unavailable".into(), "t", 1).is_retryable());
        assert!(classify_response(429, None, "slow down".into(), "t", 1).is_retryable());
        assert_eq!(
            classify_response(401, None, "no".into(), "t", 1).kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            classify_response(400, None, "bad".into(), "t", 1).kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn test_code_from_body() {
        assert_eq!(
            code_from_body("Code: 60. DB::Exception: Table analytics.x does not exist"),
            Some(60)
        );
        assert_eq!(code_from_body("something else"), None);
    }

    #[test]
    fn test_row_error_without_position() {
        let errors = row_errors_from_message("Cannot parse input");
        assert_eq!(errors, vec![RowError::unlocated("Cannot parse input")]);
    }

    #[test]
    fn test_row_error_display() {
        assert_eq!(RowError::at(4, "bad date").to_string(), "row 4: bad date");
    }
}
