//! In-memory warehouse
//!
//! Tables are vectors of rows, optionally bound to a [`TableSchema`] so inserts are
//! validated the way the real warehouse would. Failures can be scripted per insert
//! and per policy write, and every insert call is recorded with its (tokio) instant
//! so tests can assert on retry timing.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use whsync_schema::{ALL_TABLES, ColumnType, RowViolation, TableSchema};

use crate::error::{Result, RowError, WarehouseError};
use crate::model::{
    AccessBinding, AccessPolicy, InsertReceipt, LoadFormat, LoadJob, Mutation, Select,
    WriteOptions, compare_values,
};
use crate::sql;
use crate::{Row, Warehouse};

/// One recorded `insert_rows` call
#[derive(Debug, Clone)]
pub struct InsertCall {
    pub table: String,
    pub rows: usize,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct MemTable {
    schema: Option<&'static TableSchema>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemTable>,
    insert_failures: VecDeque<WarehouseError>,
    insert_calls: Vec<InsertCall>,
    mutations: Vec<Mutation>,
    bindings: Vec<AccessBinding>,
    policy_version: u64,
    policy_conflicts: u32,
    policy_writes: u32,
    canned: HashMap<String, Vec<Row>>,
}

/// Warehouse held in process memory
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every engine table under its default name, schema-checked
    pub fn with_all_tables() -> Self {
        let warehouse = Self::new();
        for schema in ALL_TABLES {
            warehouse.create_table(schema.name, Some(schema));
        }
        warehouse
    }

    /// Create (or reset) a table; `None` accepts any row
    pub fn create_table(&self, name: impl Into<String>, schema: Option<&'static TableSchema>) {
        self.state.lock().tables.insert(
            name.into(),
            MemTable {
                schema,
                rows: Vec::new(),
            },
        );
    }

    /// Fail the next inserts with these errors, in order
    pub fn fail_next_inserts(&self, errors: impl IntoIterator<Item = WarehouseError>) {
        self.state.lock().insert_failures.extend(errors);
    }

    /// Make the next `n` policy writes lose a race against another writer
    pub fn conflict_next_policy_writes(&self, n: u32) {
        self.state.lock().policy_conflicts += n;
    }

    /// Seed the access policy
    pub fn set_bindings(&self, bindings: Vec<AccessBinding>) {
        let mut state = self.state.lock();
        state.bindings = bindings;
        state.policy_version += 1;
    }

    pub fn bindings(&self) -> Vec<AccessBinding> {
        self.state.lock().bindings.clone()
    }

    /// Successful policy writes so far
    pub fn policy_writes(&self) -> u32 {
        self.state.lock().policy_writes
    }

    /// Register the result of a read-only query
    pub fn register_query(&self, sql: impl Into<String>, rows: Vec<Row>) {
        self.state
            .lock()
            .canned
            .insert(normalize_sql(&sql.into()), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// Append rows bypassing validation (manual edits in tests)
    pub fn seed_rows(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.state.lock();
        let entry = state.tables.entry(table.to_string()).or_default();
        entry.rows.extend(rows);
    }

    pub fn insert_calls(&self) -> Vec<InsertCall> {
        self.state.lock().insert_calls.clone()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().mutations.clone()
    }
}

fn normalize_sql(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim().to_string()
}

fn not_found(table: &str) -> WarehouseError {
    WarehouseError::NotFound(format!("table {} does not exist", table))
}

/// Validate rows against an optional schema, honoring the write options
///
/// Returns the rows to keep plus errors for the ones dropped, or a whole-batch
/// validation error when invalid rows may not be skipped.
fn screen_rows(
    table: &str,
    schema: Option<&TableSchema>,
    rows: &[Row],
    options: WriteOptions,
) -> Result<(Vec<Row>, Vec<RowError>)> {
    let Some(schema) = schema else {
        return Ok((rows.to_vec(), Vec::new()));
    };

    let mut kept = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let mut row = row.clone();
        let mut violations = schema.validate_row(&row);
        if options.ignore_unknown_values {
            violations.retain(|v| match v {
                RowViolation::UnknownColumn(column) => {
                    row.remove(column);
                    false
                }
                _ => true,
            });
        }
        if violations.is_empty() {
            kept.push(row);
        } else {
            let message = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            errors.push(RowError::at(index, message));
        }
    }

    if !errors.is_empty() && !options.skip_invalid_rows {
        let message = format!("{} invalid rows, first: {}", errors.len(), errors[0]);
        return Err(WarehouseError::validation(table, message, rows.len(), errors));
    }
    Ok((kept, errors))
}

/// Parse a load file into rows
fn parse_load_file(
    contents: &str,
    format: LoadFormat,
    schema: Option<&TableSchema>,
    table: &str,
) -> Result<Vec<Row>> {
    match format {
        LoadFormat::JsonLines => contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<Row>(line).map_err(|e| {
                    WarehouseError::validation(
                        table,
                        format!("line {}: {}", index + 1, e),
                        1,
                        vec![RowError::at(index, e.to_string())],
                    )
                })
            })
            .collect(),
        LoadFormat::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .trim(csv::Trim::All)
                .from_reader(contents.as_bytes());
            let columns = reader
                .headers()
                .map_err(|e| csv_error(table, 0, e))?
                .clone();

            reader
                .records()
                .enumerate()
                .map(|(index, record)| {
                    let record = record.map_err(|e| csv_error(table, index, e))?;
                    Ok(columns
                        .iter()
                        .zip(record.iter())
                        .map(|(column, field)| {
                            let ty = schema.and_then(|s| s.column(column)).map(|c| c.ty);
                            (column.to_string(), coerce_csv_field(field, ty))
                        })
                        .collect())
                })
                .collect()
        }
        LoadFormat::Parquet => Err(WarehouseError::Unsupported(
            "in-memory warehouse cannot read Parquet".to_string(),
        )),
    }
}

/// A malformed CSV record (bad quoting, field count differing from the header)
fn csv_error(table: &str, index: usize, err: csv::Error) -> WarehouseError {
    WarehouseError::validation(
        table,
        format!("csv row {}: {}", index + 1, err),
        1,
        vec![RowError::at(index, err.to_string())],
    )
}

/// CSV fields are text; type them by the destination column
fn coerce_csv_field(field: &str, ty: Option<ColumnType>) -> Value {
    if field.is_empty() || field == "\\N" {
        return Value::Null;
    }
    let typed = match ty {
        Some(ColumnType::Bool) => match field {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        Some(
            ColumnType::UInt8
            | ColumnType::UInt16
            | ColumnType::UInt32
            | ColumnType::UInt64,
        ) => field.parse::<u64>().ok().map(Value::from),
        Some(ColumnType::Int64) => field.parse::<i64>().ok().map(Value::from),
        Some(ColumnType::Float64) => field.parse::<f64>().ok().map(Value::from),
        _ => None,
    };
    typed.unwrap_or_else(|| Value::String(field.to_string()))
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_rows(
        &self,
        table: &str,
        rows: &[Row],
        options: WriteOptions,
    ) -> Result<InsertReceipt> {
        let mut state = self.state.lock();
        state.insert_calls.push(InsertCall {
            table: table.to_string(),
            rows: rows.len(),
            at: Instant::now(),
        });
        if let Some(err) = state.insert_failures.pop_front() {
            return Err(err);
        }

        let entry = state.tables.get_mut(table).ok_or_else(|| not_found(table))?;
        let (kept, row_errors) = screen_rows(table, entry.schema, rows, options)?;
        let written = kept.len();
        entry.rows.extend(kept);

        Ok(InsertReceipt {
            submitted: rows.len(),
            written,
            row_errors,
        })
    }

    async fn load_file(&self, table: &str, path: &Path, format: LoadFormat) -> Result<LoadJob> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WarehouseError::Io {
                path: path.display().to_string(),
                source: e,
            })?;

        let mut state = self.state.lock();
        let entry = state.tables.get_mut(table).ok_or_else(|| not_found(table))?;
        let rows = parse_load_file(&contents, format, entry.schema, table)?;
        let (kept, _) = screen_rows(table, entry.schema, &rows, WriteOptions::default())?;
        let rows_loaded = kept.len() as u64;
        entry.rows.extend(kept);

        Ok(LoadJob {
            job_id: uuid::Uuid::new_v4().to_string(),
            rows_loaded,
        })
    }

    async fn select(&self, select: &Select) -> Result<Vec<Row>> {
        let state = self.state.lock();
        let entry = state
            .tables
            .get(&select.table)
            .ok_or_else(|| not_found(&select.table))?;

        let mut rows: Vec<Row> = entry
            .rows
            .iter()
            .filter(|row| select.filter.matches(row))
            .cloned()
            .collect();

        if !select.order_by.is_empty() {
            rows.sort_by(|a, b| {
                select
                    .order_by
                    .iter()
                    .map(|column| {
                        compare_values(
                            a.get(column).unwrap_or(&Value::Null),
                            b.get(column).unwrap_or(&Value::Null),
                        )
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        if let Some(limit) = select.limit {
            rows.truncate(limit);
        }
        if !select.columns.is_empty() {
            rows = rows
                .into_iter()
                .map(|row| {
                    select
                        .columns
                        .iter()
                        .map(|column| {
                            let value = row.get(column).cloned().unwrap_or(Value::Null);
                            (column.clone(), value)
                        })
                        .collect()
                })
                .collect();
        }
        Ok(rows)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        sql::validate_sql(sql)?;
        self.state
            .lock()
            .canned
            .get(&normalize_sql(sql))
            .cloned()
            .ok_or_else(|| {
                WarehouseError::Unsupported(format!("no canned result for query: {}", sql))
            })
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<()> {
        let mut state = self.state.lock();
        let table = mutation.table().to_string();
        let entry = state.tables.get_mut(&table).ok_or_else(|| not_found(&table))?;

        match mutation {
            Mutation::Truncate { .. } => entry.rows.clear(),
            Mutation::Update { set, filter, .. } => {
                if let Some(schema) = entry.schema
                    && let Some(column) = set.keys().find(|c| schema.column(c).is_none())
                {
                    return Err(WarehouseError::validation(
                        &table,
                        format!("unknown column '{}' in update", column),
                        0,
                        Vec::new(),
                    ));
                }
                for row in entry.rows.iter_mut().filter(|row| filter.matches(row)) {
                    for (column, value) in set {
                        row.insert(column.clone(), value.clone());
                    }
                }
            }
            Mutation::Delete { filter, .. } => entry.rows.retain(|row| !filter.matches(row)),
        }
        state.mutations.push(mutation.clone());
        Ok(())
    }

    async fn get_access_policy(&self) -> Result<AccessPolicy> {
        let state = self.state.lock();
        Ok(AccessPolicy {
            bindings: state.bindings.clone(),
            etag: state.policy_version.to_string(),
        })
    }

    async fn set_access_policy(&self, policy: &AccessPolicy) -> Result<()> {
        let mut state = self.state.lock();
        if state.policy_conflicts > 0 {
            state.policy_conflicts -= 1;
            state.policy_version += 1;
        }

        let current = state.policy_version.to_string();
        if current != policy.etag {
            return Err(WarehouseError::Conflict {
                expected: policy.etag.clone(),
                found: current,
            });
        }
        state.bindings = policy.bindings.clone();
        state.policy_version += 1;
        state.policy_writes += 1;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
