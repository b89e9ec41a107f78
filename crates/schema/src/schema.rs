//! Table schema definitions and DDL rendering

use std::fmt;

use chrono::NaiveDate;
use serde_json::Value;

use crate::Row;
use crate::error::RowViolation;
use crate::timestamp;

/// ClickHouse column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    /// `LowCardinality(String)` for categorical columns
    LowCardinality,
    Bool,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int64,
    Float64,
    Decimal { precision: u8, scale: u8 },
    Date,
    /// `DateTime64(3)`, millisecond precision
    DateTime64,
    Uuid,
    ArrayString,
}

impl ColumnType {
    /// Render as a ClickHouse type expression
    pub fn sql(&self) -> String {
        match self {
            Self::String => "String".into(),
            Self::LowCardinality => "LowCardinality(String)".into(),
            Self::Bool => "Bool".into(),
            Self::UInt8 => "UInt8".into(),
            Self::UInt16 => "UInt16".into(),
            Self::UInt32 => "UInt32".into(),
            Self::UInt64 => "UInt64".into(),
            Self::Int64 => "Int64".into(),
            Self::Float64 => "Float64".into(),
            Self::Decimal { precision, scale } => format!("Decimal({}, {})", precision, scale),
            Self::Date => "Date".into(),
            Self::DateTime64 => "DateTime64(3)".into(),
            Self::Uuid => "UUID".into(),
            Self::ArrayString => "Array(String)".into(),
        }
    }

    /// Whether a non-null JSON value fits this column
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String | Self::LowCardinality => value.is_string(),
            Self::Bool => value.is_boolean(),
            Self::UInt8 => fits_unsigned(value, u8::MAX as u64),
            Self::UInt16 => fits_unsigned(value, u16::MAX as u64),
            Self::UInt32 => fits_unsigned(value, u32::MAX as u64),
            Self::UInt64 => value.is_u64(),
            Self::Int64 => value.is_i64(),
            Self::Float64 => value.is_number(),
            Self::Decimal { .. } => match value {
                Value::Number(_) => true,
                Value::String(s) => s.parse::<f64>().is_ok(),
                _ => false,
            },
            Self::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            Self::DateTime64 => value
                .as_str()
                .is_some_and(|s| timestamp::parse(s).is_some()),
            Self::Uuid => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            Self::ArrayString => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

fn fits_unsigned(value: &Value, max: u64) -> bool {
    value.as_u64().is_some_and(|n| n <= max)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
        }
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    fn sql(&self) -> String {
        if self.nullable {
            format!("Nullable({})", self.ty.sql())
        } else {
            self.ty.sql()
        }
    }
}

/// Table engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    MergeTree,
    /// Keeps the row with the highest version column per sorting key
    ReplacingMergeTree(&'static str),
}

impl Engine {
    fn sql(&self) -> String {
        match self {
            Self::MergeTree => "MergeTree()".into(),
            Self::ReplacingMergeTree(version) => format!("ReplacingMergeTree({})", version),
        }
    }
}

/// Column contract of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    /// Default table name
    pub name: &'static str,
    pub columns: &'static [Column],
    pub engine: Engine,
    /// Partition expression (fact tables partition by month of their date column)
    pub partition_by: Option<&'static str>,
    /// Sorting key
    pub order_by: &'static [&'static str],
}

impl TableSchema {
    /// Find a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    /// Render `CREATE TABLE IF NOT EXISTS` for `database.table`
    ///
    /// `table` overrides the default name so deployments can rename tables.
    pub fn create_sql(&self, database: &str, table: &str) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.sql()))
            .collect::<Vec<_>>()
            .join(",\n");

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {}.{}\n(\n{}\n)\nENGINE = {}",
            database,
            table,
            columns,
            self.engine.sql()
        );
        if let Some(partition) = self.partition_by {
            sql.push_str(&format!("\nPARTITION BY {}", partition));
        }
        sql.push_str(&format!("\nORDER BY ({})", self.order_by.join(", ")));
        sql
    }

    /// Check a row against the column contract
    ///
    /// Returns every violation found; an empty vector means the row fits.
    /// Omitted nullable columns are fine (the warehouse fills NULL).
    pub fn validate_row(&self, row: &Row) -> Vec<RowViolation> {
        let mut violations = Vec::new();

        for key in row.keys() {
            if self.column(key).is_none() {
                violations.push(RowViolation::UnknownColumn(key.clone()));
            }
        }

        for column in self.columns {
            match row.get(column.name) {
                None if column.nullable => {}
                None => violations.push(RowViolation::MissingColumn(column.name)),
                Some(Value::Null) if column.nullable => {}
                Some(Value::Null) => violations.push(RowViolation::NullNotAllowed(column.name)),
                Some(value) if !column.ty.accepts(value) => {
                    violations.push(RowViolation::TypeMismatch {
                        column: column.name,
                        expected: column.ty,
                        found: json_kind(value),
                    });
                }
                Some(_) => {}
            }
        }

        violations
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
