//! Warehouse boundary
//!
//! Everything the synchronization engine needs from an analytical warehouse, behind
//! one object-safe trait:
//!
//! - **Streaming insert** with server-side skip-invalid / ignore-unknown handling
//! - **Bulk load** of JSON lines, CSV or Parquet files (append, no autodetect)
//! - **Reads**: structured [`Select`] and guarded read-only SQL
//! - **Mutations**: truncate, update-where, delete-where
//! - **Access policy**: role bindings with an etag for read-modify-write
//!
//! # Backends
//!
//! - [`ClickHouseWarehouse`]: ClickHouse HTTP interface via reqwest
//! - [`MemoryWarehouse`]: in-process tables with scripted failures, for tests and dry runs

mod clickhouse;
mod error;
mod memory;
mod model;
pub mod sql;

use std::path::Path;

use async_trait::async_trait;

pub use clickhouse::{ClickHouseWarehouse, ClickHouseWarehouseConfig, DEFAULT_TIMEOUT};
pub use error::{ErrorKind, Result, RowError, WarehouseError, classify_response, code_from_body};
pub use memory::{InsertCall, MemoryWarehouse};
pub use model::{
    AccessBinding, AccessPolicy, Filter, InsertReceipt, LoadFormat, LoadJob, Mutation, Select,
    WriteOptions,
};

pub use whsync_schema::Row;

/// An analytical warehouse holding one dataset
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Append rows to a table in one request
    ///
    /// Whole-request failures return `Err`. Rows dropped under
    /// `skip_invalid_rows` show up as `written < submitted` in the receipt.
    async fn insert_rows(
        &self,
        table: &str,
        rows: &[Row],
        options: WriteOptions,
    ) -> Result<InsertReceipt>;

    /// Append a file's rows to a table; returns once the load reached a terminal state
    async fn load_file(&self, table: &str, path: &Path, format: LoadFormat) -> Result<LoadJob>;

    async fn select(&self, select: &Select) -> Result<Vec<Row>>;

    /// Run read-only SQL (SELECT / WITH only)
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;

    async fn mutate(&self, mutation: &Mutation) -> Result<()>;

    async fn get_access_policy(&self) -> Result<AccessPolicy>;

    /// Replace the policy; fails with `Conflict` if `policy.etag` is stale
    async fn set_access_policy(&self, policy: &AccessPolicy) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}
