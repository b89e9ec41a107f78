//! Warehouse schema
//!
//! The column contract shared by every writer of the warehouse: table schemas,
//! typed row records, ClickHouse DDL rendering, and row validation.
//!
//! # Tables
//!
//! | Table | Kind | Refresh |
//! |-------|------|---------|
//! | dim_jobs | dimension | SCD Type 2 |
//! | dim_banking_networks | dimension | full refresh |
//! | dim_users | dimension | in-place upsert |
//! | dim_date | dimension | full refresh |
//! | fact_job_executions | fact | append |
//! | fact_pipeline_stages | fact | append |
//! | fact_audit_logs | fact | append |
//! | fact_banking_transactions | fact | append |
//!
//! # Rows
//!
//! A [`Row`] is an ordered JSON object. Typed records implement [`TableRow`] and are
//! turned into rows with [`TableRow::to_row`]; [`TableSchema::validate_row`] checks a
//! row against the column contract before it leaves the process.

mod error;
mod schema;
pub mod tables;
pub mod timestamp;

pub use error::{RowViolation, SchemaError};
pub use schema::{Column, ColumnType, Engine, TableSchema};
pub use tables::{
    AuditLogRow, BankingNetworkDimRow, BankingTransactionRow, DateDimRow, JobDimRow,
    JobExecutionRow, PipelineStageRow, UserDimRow, date_key,
};

use serde::Serialize;

/// Schema version written alongside the DDL
pub const SCHEMA_VERSION: &str = "1.0";

/// A single warehouse row: column name to value, insertion-ordered
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Every table the engine writes, dimensions first
pub static ALL_TABLES: [&TableSchema; 8] = [
    JobDimRow::SCHEMA,
    BankingNetworkDimRow::SCHEMA,
    UserDimRow::SCHEMA,
    DateDimRow::SCHEMA,
    JobExecutionRow::SCHEMA,
    PipelineStageRow::SCHEMA,
    AuditLogRow::SCHEMA,
    BankingTransactionRow::SCHEMA,
];

/// A typed record bound to one table
pub trait TableRow: Serialize {
    /// Column contract of the destination table
    const SCHEMA: &'static TableSchema;

    /// Encode as a warehouse row
    fn to_row(&self) -> Result<Row, SchemaError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(row) => Ok(row),
            _ => Err(SchemaError::NotAnObject {
                table: Self::SCHEMA.name,
            }),
        }
    }
}

/// Look up a schema by its default table name
pub fn schema_for(table: &str) -> Option<&'static TableSchema> {
    ALL_TABLES.iter().copied().find(|schema| schema.name == table)
}
