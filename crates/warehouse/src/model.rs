//! Request and response types at the warehouse boundary

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use serde_json::Value;

use crate::Row;
use crate::error::RowError;

/// Server-side handling of a streaming insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Drop rows that fail to parse instead of rejecting the whole request
    pub skip_invalid_rows: bool,
    /// Ignore columns the table doesn't have instead of rejecting the request
    pub ignore_unknown_values: bool,
}

/// Outcome of a streaming insert the warehouse accepted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReceipt {
    pub submitted: usize,
    pub written: usize,
    /// Detail for rows dropped under `skip_invalid_rows`, when known
    pub row_errors: Vec<RowError>,
}

impl InsertReceipt {
    pub fn complete(submitted: usize) -> Self {
        Self {
            submitted,
            written: submitted,
            row_errors: Vec::new(),
        }
    }

    /// Rows the warehouse accepted the request for but did not write
    pub fn rejected(&self) -> usize {
        self.submitted.saturating_sub(self.written)
    }

    pub fn is_partial(&self) -> bool {
        self.written < self.submitted
    }
}

/// Bulk load file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFormat {
    /// Newline-delimited JSON objects
    JsonLines,
    /// CSV with a header row
    Csv,
    Parquet,
}

impl LoadFormat {
    /// ClickHouse input format name
    pub fn clickhouse_format(&self) -> &'static str {
        match self {
            Self::JsonLines => "JSONEachRow",
            Self::Csv => "CSVWithNames",
            Self::Parquet => "Parquet",
        }
    }

    /// Guess from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" | "jsonl" | "ndjson" => Some(Self::JsonLines),
            "csv" => Some(Self::Csv),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

impl std::str::FromStr for LoadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "jsonl" | "ndjson" | "json_lines" => Ok(Self::JsonLines),
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            other => Err(format!("unknown load format '{}'", other)),
        }
    }
}

impl fmt::Display for LoadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::JsonLines => "jsonl",
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        })
    }
}

/// A finished bulk load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    pub job_id: String,
    pub rows_loaded: u64,
}

/// Conjunction of column equalities
///
/// A `Null` value matches NULL (`isNull(column)`), not equality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(column, value)
    }

    pub fn and(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against an in-memory row
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|(column, expected)| {
            let actual = row.get(column).unwrap_or(&Value::Null);
            actual == expected
        })
    }
}

/// Structured read
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    /// Empty means every column
    pub columns: Vec<String>,
    pub filter: Filter,
    pub order_by: Vec<String>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filter: Filter::all(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Write that isn't an append
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Remove every row
    Truncate { table: String },
    /// Set columns on matching rows
    Update {
        table: String,
        set: Row,
        filter: Filter,
    },
    /// Remove matching rows
    Delete { table: String, filter: Filter },
}

impl Mutation {
    pub fn table(&self) -> &str {
        match self {
            Self::Truncate { table } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }
}

/// One role granted to one member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessBinding {
    pub role: String,
    /// User or role receiving the grant
    pub member: String,
}

impl AccessBinding {
    pub fn new(role: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            member: member.into(),
        }
    }
}

/// Role bindings of a dataset plus a version tag for optimistic writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub bindings: Vec<AccessBinding>,
    /// Opaque version; a write with a stale etag fails with `Conflict`
    pub etag: String,
}

impl AccessPolicy {
    /// Add a binding unless it's already present; returns whether it was added
    pub fn add_binding(&mut self, binding: AccessBinding) -> bool {
        if self.bindings.contains(&binding) {
            return false;
        }
        self.bindings.push(binding);
        true
    }

    pub fn contains(&self, role: &str, member: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| b.role == role && b.member == member)
    }

    /// Order-independent content hash, used as etag by backends without native versioning
    pub fn content_etag(bindings: &[AccessBinding]) -> String {
        let sorted: BTreeSet<&AccessBinding> = bindings.iter().collect();
        let mut hasher = DefaultHasher::new();
        for binding in sorted {
            binding.hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }
}

/// Total order over JSON scalars for in-memory sorting
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
