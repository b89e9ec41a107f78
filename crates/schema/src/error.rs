//! Schema error types

use thiserror::Error;

use crate::ColumnType;

/// Errors encoding a typed record
#[derive(Debug, Error)]
pub enum SchemaError {
    /// serde_json could not encode the record
    #[error("failed to encode row: {0}")]
    Encode(#[from] serde_json::Error),

    /// The record encoded to something other than an object
    #[error("{table} record did not encode to a JSON object")]
    NotAnObject { table: &'static str },
}

/// One reason a row does not fit its table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowViolation {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("null in non-nullable column '{0}'")]
    NullNotAllowed(&'static str),

    #[error("column '{column}' expects {expected}, got {found}")]
    TypeMismatch {
        column: &'static str,
        expected: ColumnType,
        found: &'static str,
    },
}
