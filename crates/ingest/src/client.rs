//! Ingest client
//!
//! Wraps a [`Warehouse`] session with client-side row screening, chunked retries,
//! and the access-policy read-modify-write.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use whsync_config::{Config, WarehouseConfig};
use whsync_schema::{RowViolation, TableRow, TableSchema, schema_for};
use whsync_warehouse::{
    AccessBinding, ClickHouseWarehouse, ClickHouseWarehouseConfig, LoadFormat, LoadJob,
    Mutation, Row, RowError, Select, Warehouse, WarehouseError, WriteOptions, sql,
};

use crate::credentials::{CredentialResolver, Credentials};
use crate::error::{IngestError, Result};
use crate::locks::KeyedLocks;
use crate::metrics::IngestMetrics;
use crate::retry::RetryPolicy;
use crate::InsertResult;

/// Default rows per chunk in `batch_insert`
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Attempts at a policy write before a concurrent-modification conflict is surfaced
const GRANT_ATTEMPTS: u32 = 3;

// =============================================================================
// Connector
// =============================================================================

/// Opens a warehouse session from resolved credentials
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    async fn connect(&self, credentials: Credentials) -> Result<Arc<dyn Warehouse>>;
}

/// Connects to ClickHouse over HTTP and checks the server answers
#[derive(Debug, Clone)]
pub struct ClickHouseConnector {
    url: String,
    database: String,
    timeout: Duration,
    managed_roles: Vec<String>,
}

impl ClickHouseConnector {
    pub fn from_config(config: &WarehouseConfig) -> Self {
        Self {
            url: config.url.clone(),
            database: config.dataset.clone(),
            timeout: config.timeout,
            managed_roles: vec![config.roles.viewer.clone(), config.roles.job_runner.clone()],
        }
    }
}

#[async_trait]
impl WarehouseConnector for ClickHouseConnector {
    async fn connect(&self, credentials: Credentials) -> Result<Arc<dyn Warehouse>> {
        let url = credentials.url.clone().unwrap_or_else(|| self.url.clone());
        let config = ClickHouseWarehouseConfig::new(&url, &self.database)
            .with_credentials(credentials.username, credentials.password)
            .with_timeout(self.timeout)
            .with_managed_roles(self.managed_roles.iter().cloned());

        let warehouse = ClickHouseWarehouse::new(config)
            .map_err(|e| IngestError::from_warehouse("connect", e))?;
        warehouse
            .health_check()
            .await
            .map_err(|e| IngestError::from_warehouse("connect", e))?;

        info!(url = %url, database = %self.database, "connected to ClickHouse");
        Ok(Arc::new(warehouse))
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Client behavior, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub dataset: String,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// Server-side handling applied by `batch_insert`
    pub write: WriteOptions,
    pub viewer_role: String,
    pub job_runner_role: String,
    schemas: HashMap<String, &'static TableSchema>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        let schemas = config
            .dimensions
            .tables
            .all()
            .into_iter()
            .filter_map(|(key, name)| schema_for(key).map(|schema| (name.to_string(), schema)))
            .collect();

        Self {
            dataset: config.warehouse.dataset.clone(),
            batch_size: config.ingest.batch_size,
            retry: RetryPolicy::new(config.ingest.max_retries, config.ingest.retry_base_delay),
            write: WriteOptions {
                skip_invalid_rows: config.ingest.skip_invalid_rows,
                ignore_unknown_values: config.ingest.ignore_unknown_values,
            },
            viewer_role: config.warehouse.roles.viewer.clone(),
            job_runner_role: config.warehouse.roles.job_runner.clone(),
            schemas,
        }
    }

    /// Validate rows for `table` against `schema`
    pub fn with_table(mut self, table: impl Into<String>, schema: &'static TableSchema) -> Self {
        self.schemas.insert(table.into(), schema);
        self
    }

    /// Column contract for a destination table, if it is a known one
    pub fn schema(&self, table: &str) -> Option<&'static TableSchema> {
        self.schemas.get(table).copied().or_else(|| schema_for(table))
    }

    /// Names of all tables with a known schema
    pub fn known_tables(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

/// Per-call insert behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Send rows as given, without checking them against the table schema
    ///
    /// Rows the server then rejects surface as `PartialFailure` with counts.
    /// The ClickHouse backend reports no per-row detail, so `row_errors` is
    /// empty there.
    pub raw: bool,
    /// Drop invalid rows instead of rejecting the request
    pub skip_invalid_rows: bool,
    /// Ignore columns the table doesn't have instead of rejecting the request
    pub ignore_unknown_values: bool,
}

impl InsertOptions {
    pub fn raw() -> Self {
        Self {
            raw: true,
            ..Default::default()
        }
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            skip_invalid_rows: self.skip_invalid_rows,
            ignore_unknown_values: self.ignore_unknown_values,
        }
    }
}

impl From<WriteOptions> for InsertOptions {
    fn from(write: WriteOptions) -> Self {
        Self {
            raw: false,
            skip_invalid_rows: write.skip_invalid_rows,
            ignore_unknown_values: write.ignore_unknown_values,
        }
    }
}

/// Rows that passed client-side screening
struct Screened<'a> {
    rows: Cow<'a, [Row]>,
    /// Input index of each kept row, when some were dropped
    origin: Option<Vec<usize>>,
    errors: Vec<RowError>,
}

impl<'a> Screened<'a> {
    fn all(rows: &'a [Row]) -> Self {
        Self {
            rows: Cow::Borrowed(rows),
            origin: None,
            errors: Vec::new(),
        }
    }

    /// Map a warehouse row error back to the caller's row index
    fn remap(&self, error: RowError) -> RowError {
        match (&self.origin, error.index) {
            (Some(origin), Some(index)) => RowError {
                index: origin.get(index).copied(),
                message: error.message,
            },
            _ => error,
        }
    }
}

/// How one chunk of a batch ended
#[derive(Debug, Clone, Copy)]
struct ChunkOutcome {
    inserted: usize,
    failed: usize,
    cancelled: bool,
}

// =============================================================================
// Client
// =============================================================================

/// Owns the warehouse session and every write the engine makes
pub struct IngestClient {
    settings: IngestSettings,
    resolver: CredentialResolver,
    connector: Option<Arc<dyn WarehouseConnector>>,
    session: OnceCell<Arc<dyn Warehouse>>,
    locks: KeyedLocks,
    metrics: Arc<IngestMetrics>,
}

impl std::fmt::Debug for IngestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestClient")
            .field("dataset", &self.settings.dataset)
            .field("resolver", &self.resolver)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl IngestClient {
    /// Create a client that connects on first use
    pub fn new(
        settings: IngestSettings,
        resolver: CredentialResolver,
        connector: Arc<dyn WarehouseConnector>,
    ) -> Self {
        Self {
            settings,
            resolver,
            connector: Some(connector),
            session: OnceCell::new(),
            locks: KeyedLocks::new(),
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// Create a client around an already open session
    pub fn with_warehouse(settings: IngestSettings, warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            settings,
            resolver: CredentialResolver::new(),
            connector: None,
            session: OnceCell::from(warehouse),
            locks: KeyedLocks::new(),
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn metrics(&self) -> Arc<IngestMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_connected(&self) -> bool {
        self.session.initialized()
    }

    /// The warehouse session, created on the first call
    async fn session(&self) -> Result<&Arc<dyn Warehouse>> {
        self.session
            .get_or_try_init(|| async {
                let connector = self.connector.as_ref().ok_or_else(|| {
                    IngestError::Configuration("no warehouse connector configured".to_string())
                })?;
                let credentials = self.resolver.resolve().await?;
                let warehouse = connector.connect(credentials).await?;
                info!(
                    backend = warehouse.name(),
                    dataset = %self.settings.dataset,
                    "warehouse session established"
                );
                Ok::<_, IngestError>(warehouse)
            })
            .await
    }

    /// Open the session now instead of on the first operation
    pub async fn connect(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    // -------------------------------------------------------------------------
    // Inserts
    // -------------------------------------------------------------------------

    /// Write rows in a single request, without retries
    ///
    /// Returns the number of rows written. When the warehouse writes only some of
    /// the rows the call fails with [`IngestError::PartialFailure`] carrying exact
    /// counts and per-row detail.
    pub async fn stream_insert(
        &self,
        table: &str,
        rows: &[Row],
        options: InsertOptions,
    ) -> Result<usize> {
        if rows.is_empty() {
            warn!(table = %table, "stream insert called with no rows");
            return Ok(0);
        }

        let total = rows.len();
        let screened = self.screen(table, rows, &options)?;
        if screened.rows.is_empty() {
            self.metrics.record_partial(0, total as u64);
            return Err(IngestError::PartialFailure {
                table: table.to_string(),
                inserted: 0,
                failed: total,
                errors: screened.errors,
            });
        }

        let warehouse = self.session().await?;
        let receipt = match warehouse
            .insert_rows(table, &screened.rows, options.write_options())
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                return Err(match IngestError::from_warehouse(table, e) {
                    IngestError::Validation {
                        table,
                        message,
                        errors,
                        ..
                    } => {
                        self.metrics.record_validation_rejection();
                        let mut all = screened.errors.clone();
                        all.extend(errors.into_iter().map(|e| screened.remap(e)));
                        IngestError::Validation {
                            table,
                            message,
                            failed: total,
                            errors: all,
                        }
                    }
                    other => other,
                });
            }
        };

        let written = receipt.written.min(total);
        let failed = total - written;
        if failed > 0 {
            let mut errors = screened.errors.clone();
            errors.extend(receipt.row_errors.into_iter().map(|e| screened.remap(e)));
            self.metrics.record_partial(written as u64, failed as u64);
            warn!(table = %table, inserted = written, failed, "insert partially failed");
            return Err(IngestError::PartialFailure {
                table: table.to_string(),
                inserted: written,
                failed,
                errors,
            });
        }

        self.metrics.record_sent(written as u64);
        debug!(table = %table, rows = written, "rows inserted");
        Ok(written)
    }

    /// Check rows against the table schema unless `raw` is set
    fn screen<'a>(
        &self,
        table: &str,
        rows: &'a [Row],
        options: &InsertOptions,
    ) -> Result<Screened<'a>> {
        let schema = match (options.raw, self.settings.schema(table)) {
            (false, Some(schema)) => schema,
            _ => return Ok(Screened::all(rows)),
        };

        let errors: Vec<RowError> = rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                schema
                    .validate_row(row)
                    .into_iter()
                    .find(|v| {
                        !(options.ignore_unknown_values
                            && matches!(v, RowViolation::UnknownColumn(_)))
                    })
                    .map(|violation| RowError::at(index, violation.to_string()))
            })
            .collect();

        if errors.is_empty() {
            return Ok(Screened::all(rows));
        }

        if !options.skip_invalid_rows {
            self.metrics.record_validation_rejection();
            return Err(IngestError::Validation {
                table: table.to_string(),
                message: format!(
                    "{} of {} rows do not match the table schema",
                    errors.len(),
                    rows.len()
                ),
                failed: rows.len(),
                errors,
            });
        }

        let rejected: HashSet<usize> = errors.iter().filter_map(|e| e.index).collect();
        let (origin, kept): (Vec<usize>, Vec<Row>) = rows
            .iter()
            .enumerate()
            .filter(|(index, _)| !rejected.contains(index))
            .map(|(index, row)| (index, row.clone()))
            .unzip();

        debug!(table = %table, dropped = rejected.len(), "dropped rows failing the table schema");
        Ok(Screened {
            rows: Cow::Owned(kept),
            origin: Some(origin),
            errors,
        })
    }

    /// Insert rows in fixed-size chunks, retrying transient failures per chunk
    ///
    /// Chunks go out in input order, one at a time. A chunk that exhausts its
    /// retries, or fails for a non-transient reason, counts entirely as failed and
    /// the next chunk is attempted. Only configuration errors abort the call.
    pub async fn batch_insert(
        &self,
        table: &str,
        rows: &[Row],
        batch_size: usize,
    ) -> Result<InsertResult> {
        self.batch_insert_with_cancel(table, rows, batch_size, &CancellationToken::new())
            .await
    }

    /// [`batch_insert`](Self::batch_insert) that stops scheduling work once `cancel` fires
    ///
    /// An in-flight request completes; a backoff sleep is cut short and its chunk
    /// counts as failed. Chunks never attempted are reported as `skipped`.
    pub async fn batch_insert_with_cancel(
        &self,
        table: &str,
        rows: &[Row],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<InsertResult> {
        if batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        let mut result = InsertResult::default();
        if rows.is_empty() {
            debug!(table = %table, "batch insert called with no rows");
            return Ok(result);
        }

        let chunks = rows.len().div_ceil(batch_size);
        let options = InsertOptions::from(self.settings.write);

        for (index, chunk) in rows.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                result.skipped = rows.len() - index * batch_size;
                result.cancelled = true;
                warn!(
                    table = %table,
                    chunk = index,
                    skipped = result.skipped,
                    "batch insert cancelled"
                );
                break;
            }

            let outcome = self.insert_chunk(table, chunk, index, options, cancel).await?;
            result.inserted += outcome.inserted;
            result.failed += outcome.failed;

            if outcome.cancelled {
                result.skipped = rows.len().saturating_sub(index * batch_size + chunk.len());
                result.cancelled = true;
                warn!(
                    table = %table,
                    chunk = index,
                    skipped = result.skipped,
                    "batch insert cancelled during backoff"
                );
                break;
            }
        }

        info!(
            table = %table,
            chunks,
            inserted = result.inserted,
            failed = result.failed,
            skipped = result.skipped,
            "batch insert finished"
        );
        Ok(result)
    }

    async fn insert_chunk(
        &self,
        table: &str,
        chunk: &[Row],
        index: usize,
        options: InsertOptions,
        cancel: &CancellationToken,
    ) -> Result<ChunkOutcome> {
        let len = chunk.len();
        let policy = self.settings.retry;
        let mut retry = 0;

        loop {
            match self.stream_insert(table, chunk, options).await {
                Ok(inserted) => {
                    return Ok(ChunkOutcome {
                        inserted,
                        failed: len - inserted.min(len),
                        cancelled: false,
                    });
                }
                Err(IngestError::PartialFailure {
                    inserted, failed, ..
                }) => {
                    return Ok(ChunkOutcome {
                        inserted,
                        failed,
                        cancelled: false,
                    });
                }
                Err(e) if e.is_configuration() => return Err(e),
                Err(e) if e.is_retryable() && retry < policy.max_retries => {
                    retry += 1;
                    let delay = policy.delay(retry);
                    self.metrics.record_retry();
                    warn!(
                        table = %table,
                        chunk = index,
                        attempt = retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "chunk insert failed, retrying"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.metrics.record_failed(len as u64);
                            return Ok(ChunkOutcome {
                                inserted: 0,
                                failed: len,
                                cancelled: true,
                            });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    self.metrics.record_failed(len as u64);
                    error!(
                        table = %table,
                        chunk = index,
                        rows = len,
                        attempts = retry + 1,
                        error = %e,
                        "chunk insert failed"
                    );
                    return Ok(ChunkOutcome {
                        inserted: 0,
                        failed: len,
                        cancelled: false,
                    });
                }
            }
        }
    }

    /// Encode typed records and batch-insert the ones matching their table
    ///
    /// Records that don't encode or don't fit `R::SCHEMA` count as failed and are
    /// never sent.
    pub async fn insert_records<R: TableRow>(
        &self,
        table: &str,
        records: &[R],
    ) -> Result<InsertResult> {
        let mut rows = Vec::with_capacity(records.len());
        let mut invalid = 0;

        for (index, record) in records.iter().enumerate() {
            let row = match record.to_row() {
                Ok(row) => row,
                Err(e) => {
                    warn!(table = %table, index, error = %e, "record failed to encode");
                    invalid += 1;
                    continue;
                }
            };
            if let Some(violation) = R::SCHEMA.validate_row(&row).first() {
                warn!(table = %table, index, violation = %violation, "record rejected");
                invalid += 1;
                continue;
            }
            rows.push(row);
        }

        if invalid > 0 {
            self.metrics.record_validation_rejection();
            self.metrics.record_rejected_rows(invalid as u64);
        }

        let mut result = self
            .batch_insert(table, &rows, self.settings.batch_size)
            .await?;
        result.failed += invalid;
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Loads and reads
    // -------------------------------------------------------------------------

    /// Append a file's rows to `table`, waiting for the load to finish
    pub async fn load_from_file(
        &self,
        table: &str,
        path: &Path,
        format: LoadFormat,
    ) -> Result<LoadJob> {
        if let Err(source) = tokio::fs::metadata(path).await {
            return Err(IngestError::from_warehouse(
                table,
                WarehouseError::Io {
                    path: path.display().to_string(),
                    source,
                },
            ));
        }

        let warehouse = self.session().await?;
        info!(table = %table, path = %path.display(), format = %format, "loading file");
        let job = warehouse
            .load_file(table, path, format)
            .await
            .map_err(|e| IngestError::from_warehouse(table, e))?;

        self.metrics.record_load(job.rows_loaded);
        info!(
            table = %table,
            job_id = %job.job_id,
            rows = job.rows_loaded,
            "file load finished"
        );
        Ok(job)
    }

    /// Run read-only SQL and decode each row into `T`
    pub async fn query<T: DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>> {
        self.query_rows(sql)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(IngestError::from))
            .collect()
    }

    /// Run read-only SQL and return raw rows
    pub async fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        sql::validate_sql(sql).map_err(|e| IngestError::from_warehouse("query", e))?;
        let warehouse = self.session().await?;
        warehouse
            .query(sql)
            .await
            .map_err(|e| IngestError::from_warehouse("query", e))
    }

    pub async fn select(&self, select: &Select) -> Result<Vec<Row>> {
        let warehouse = self.session().await?;
        warehouse
            .select(select)
            .await
            .map_err(|e| IngestError::from_warehouse(&select.table, e))
    }

    pub async fn mutate(&self, mutation: &Mutation) -> Result<()> {
        let warehouse = self.session().await?;
        warehouse
            .mutate(mutation)
            .await
            .map_err(|e| IngestError::from_warehouse(mutation.table(), e))
    }

    // -------------------------------------------------------------------------
    // Access policy
    // -------------------------------------------------------------------------

    /// Grant `principal` the viewer and job-runner roles on the dataset
    ///
    /// Existing bindings are never removed. Returns how many bindings were added
    /// (0 when the principal already had both). Concurrent writers in this process
    /// are serialized; a write losing to another process is retried from a fresh
    /// read.
    pub async fn grant_read_only_access(&self, principal: &str) -> Result<usize> {
        if !sql::is_valid_identifier(principal) {
            return Err(IngestError::InvalidArgument(format!(
                "invalid principal '{}'",
                principal
            )));
        }

        let warehouse = self.session().await?;
        let _guard = self
            .locks
            .lock(&format!("policy:{}", self.settings.dataset))
            .await;

        let roles = [
            self.settings.viewer_role.as_str(),
            self.settings.job_runner_role.as_str(),
        ];
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut policy = warehouse
                .get_access_policy()
                .await
                .map_err(|e| IngestError::from_warehouse("access policy", e))?;

            let mut added = 0;
            for role in roles {
                if policy.add_binding(AccessBinding::new(role, principal)) {
                    added += 1;
                }
            }
            if added == 0 {
                info!(principal = %principal, "principal already has read-only access");
                return Ok(0);
            }

            match warehouse.set_access_policy(&policy).await {
                Ok(()) => {
                    self.metrics.record_grants(added as u64);
                    info!(
                        principal = %principal,
                        dataset = %self.settings.dataset,
                        added,
                        "granted read-only access"
                    );
                    return Ok(added);
                }
                Err(WarehouseError::Conflict { .. }) if attempt < GRANT_ATTEMPTS => {
                    warn!(
                        principal = %principal,
                        attempt,
                        "access policy changed concurrently, retrying"
                    );
                }
                Err(e) => return Err(IngestError::from_warehouse("access policy", e)),
            }
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;
