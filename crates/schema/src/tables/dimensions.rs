//! Dimension table row types (dim_jobs, dim_banking_networks, dim_users, dim_date)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{Column, ColumnType, Engine, TableSchema};
use crate::{TableRow, timestamp};

/// Versioned job configuration (dim_jobs table, SCD Type 2)
///
/// ```sql
/// CREATE TABLE dim_jobs (
///     job_key UUID,
///     job_id String,
///     job_name String,
///     job_type LowCardinality(String),
///     schedule Nullable(String),
///     timezone String,
///     source_system LowCardinality(String),
///     target_system LowCardinality(String),
///     retry_max_attempts UInt32,
///     retry_backoff_seconds UInt32,
///     timeout_seconds UInt32,
///     is_enabled Bool,
///     owner Nullable(String),
///     is_current Bool,
///     effective_from DateTime64(3),
///     effective_to Nullable(DateTime64(3))
/// ) ENGINE = MergeTree()
/// ORDER BY (job_id, effective_from);
/// ```
///
/// Per `job_id` at most one row has `is_current = true`, and `effective_to`
/// is NULL exactly on that row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDimRow {
    /// Surrogate key of this version
    pub job_key: Uuid,
    pub job_id: String,
    pub job_name: String,
    pub job_type: String,
    /// Cron expression, NULL for on-demand jobs
    pub schedule: Option<String>,
    pub timezone: String,
    pub source_system: String,
    pub target_system: String,
    pub retry_max_attempts: u32,
    pub retry_backoff_seconds: u32,
    pub timeout_seconds: u32,
    pub is_enabled: bool,
    pub owner: Option<String>,
    pub is_current: bool,
    #[serde(with = "timestamp::datetime64")]
    pub effective_from: DateTime<Utc>,
    #[serde(with = "timestamp::datetime64_option")]
    pub effective_to: Option<DateTime<Utc>>,
}

static JOB_DIM_COLUMNS: [Column; 16] = [
    Column::new("job_key", ColumnType::Uuid),
    Column::new("job_id", ColumnType::String),
    Column::new("job_name", ColumnType::String),
    Column::new("job_type", ColumnType::LowCardinality),
    Column::new("schedule", ColumnType::String).nullable(),
    Column::new("timezone", ColumnType::String),
    Column::new("source_system", ColumnType::LowCardinality),
    Column::new("target_system", ColumnType::LowCardinality),
    Column::new("retry_max_attempts", ColumnType::UInt32),
    Column::new("retry_backoff_seconds", ColumnType::UInt32),
    Column::new("timeout_seconds", ColumnType::UInt32),
    Column::new("is_enabled", ColumnType::Bool),
    Column::new("owner", ColumnType::String).nullable(),
    Column::new("is_current", ColumnType::Bool),
    Column::new("effective_from", ColumnType::DateTime64),
    Column::new("effective_to", ColumnType::DateTime64).nullable(),
];

static JOB_DIM_SCHEMA: TableSchema = TableSchema {
    name: "dim_jobs",
    columns: &JOB_DIM_COLUMNS,
    engine: Engine::MergeTree,
    partition_by: None,
    order_by: &["job_id", "effective_from"],
};

impl TableRow for JobDimRow {
    const SCHEMA: &'static TableSchema = &JOB_DIM_SCHEMA;
}

/// Banking network snapshot (dim_banking_networks table)
///
/// ```sql
/// CREATE TABLE dim_banking_networks (
///     network_id String,
///     network_name String,
///     network_type LowCardinality(String),
///     category LowCardinality(String),
///     supports_realtime Bool,
///     supports_batch Bool,
///     supports_webhooks Bool,
///     protocols Array(String),
///     auth_methods Array(String),
///     api_endpoint Nullable(String),
///     updated_at DateTime64(3)
/// ) ENGINE = MergeTree()
/// ORDER BY network_id;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankingNetworkDimRow {
    pub network_id: String,
    pub network_name: String,
    pub network_type: String,
    pub category: String,
    pub supports_realtime: bool,
    pub supports_batch: bool,
    pub supports_webhooks: bool,
    pub protocols: Vec<String>,
    pub auth_methods: Vec<String>,
    pub api_endpoint: Option<String>,
    #[serde(with = "timestamp::datetime64")]
    pub updated_at: DateTime<Utc>,
}

static BANKING_NETWORK_DIM_COLUMNS: [Column; 11] = [
    Column::new("network_id", ColumnType::String),
    Column::new("network_name", ColumnType::String),
    Column::new("network_type", ColumnType::LowCardinality),
    Column::new("category", ColumnType::LowCardinality),
    Column::new("supports_realtime", ColumnType::Bool),
    Column::new("supports_batch", ColumnType::Bool),
    Column::new("supports_webhooks", ColumnType::Bool),
    Column::new("protocols", ColumnType::ArrayString),
    Column::new("auth_methods", ColumnType::ArrayString),
    Column::new("api_endpoint", ColumnType::String).nullable(),
    Column::new("updated_at", ColumnType::DateTime64),
];

static BANKING_NETWORK_DIM_SCHEMA: TableSchema = TableSchema {
    name: "dim_banking_networks",
    columns: &BANKING_NETWORK_DIM_COLUMNS,
    engine: Engine::MergeTree,
    partition_by: None,
    order_by: &["network_id"],
};

impl TableRow for BankingNetworkDimRow {
    const SCHEMA: &'static TableSchema = &BANKING_NETWORK_DIM_SCHEMA;
}

/// Platform user (dim_users table)
///
/// ```sql
/// CREATE TABLE dim_users (
///     user_id String,
///     username Nullable(String),
///     email Nullable(String),
///     role Nullable(String),
///     department Nullable(String),
///     is_active Bool,
///     created_at DateTime64(3),
///     last_login_at Nullable(DateTime64(3)),
///     updated_at DateTime64(3)
/// ) ENGINE = MergeTree()
/// ORDER BY user_id;
/// ```
///
/// One live row per `user_id`, updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDimRow {
    pub user_id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub is_active: bool,
    #[serde(with = "timestamp::datetime64")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp::datetime64_option")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp::datetime64")]
    pub updated_at: DateTime<Utc>,
}

static USER_DIM_COLUMNS: [Column; 9] = [
    Column::new("user_id", ColumnType::String),
    Column::new("username", ColumnType::String).nullable(),
    Column::new("email", ColumnType::String).nullable(),
    Column::new("role", ColumnType::String).nullable(),
    Column::new("department", ColumnType::String).nullable(),
    Column::new("is_active", ColumnType::Bool),
    Column::new("created_at", ColumnType::DateTime64),
    Column::new("last_login_at", ColumnType::DateTime64).nullable(),
    Column::new("updated_at", ColumnType::DateTime64),
];

static USER_DIM_SCHEMA: TableSchema = TableSchema {
    name: "dim_users",
    columns: &USER_DIM_COLUMNS,
    engine: Engine::MergeTree,
    partition_by: None,
    order_by: &["user_id"],
};

impl TableRow for UserDimRow {
    const SCHEMA: &'static TableSchema = &USER_DIM_SCHEMA;
}

/// One calendar day (dim_date table)
///
/// ```sql
/// CREATE TABLE dim_date (
///     date_key UInt32,
///     full_date Date,
///     year UInt16,
///     quarter UInt8,
///     month UInt8,
///     month_name LowCardinality(String),
///     week_of_year UInt8,
///     iso_year UInt16,
///     day_of_month UInt8,
///     day_of_week UInt8,
///     day_name LowCardinality(String),
///     is_weekend Bool,
///     is_holiday Bool,
///     fiscal_year UInt16,
///     fiscal_quarter UInt8
/// ) ENGINE = MergeTree()
/// ORDER BY date_key;
/// ```
///
/// `day_of_week` is ISO numbering: Monday = 1 through Sunday = 7.
/// `week_of_year` belongs to `iso_year`, which differs from `year` around New Year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateDimRow {
    /// `YYYYMMDD`
    pub date_key: u32,
    pub full_date: NaiveDate,
    pub year: u16,
    pub quarter: u8,
    pub month: u8,
    pub month_name: String,
    pub week_of_year: u8,
    pub iso_year: u16,
    pub day_of_month: u8,
    pub day_of_week: u8,
    pub day_name: String,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub fiscal_year: u16,
    pub fiscal_quarter: u8,
}

static DATE_DIM_COLUMNS: [Column; 15] = [
    Column::new("date_key", ColumnType::UInt32),
    Column::new("full_date", ColumnType::Date),
    Column::new("year", ColumnType::UInt16),
    Column::new("quarter", ColumnType::UInt8),
    Column::new("month", ColumnType::UInt8),
    Column::new("month_name", ColumnType::LowCardinality),
    Column::new("week_of_year", ColumnType::UInt8),
    Column::new("iso_year", ColumnType::UInt16),
    Column::new("day_of_month", ColumnType::UInt8),
    Column::new("day_of_week", ColumnType::UInt8),
    Column::new("day_name", ColumnType::LowCardinality),
    Column::new("is_weekend", ColumnType::Bool),
    Column::new("is_holiday", ColumnType::Bool),
    Column::new("fiscal_year", ColumnType::UInt16),
    Column::new("fiscal_quarter", ColumnType::UInt8),
];

static DATE_DIM_SCHEMA: TableSchema = TableSchema {
    name: "dim_date",
    columns: &DATE_DIM_COLUMNS,
    engine: Engine::MergeTree,
    partition_by: None,
    order_by: &["date_key"],
};

impl TableRow for DateDimRow {
    const SCHEMA: &'static TableSchema = &DATE_DIM_SCHEMA;
}
