//! Fact table row types (fact_job_executions, fact_pipeline_stages,
//! fact_audit_logs, fact_banking_transactions)
//!
//! Fact tables are append-only, partitioned by month of their event timestamp and
//! ordered by low-cardinality categorical columns first. Every row carries the
//! `date_key` of its event day for joins against dim_date.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{Column, ColumnType, Engine, TableSchema};
use crate::{TableRow, timestamp};

/// One run of a job (fact_job_executions table)
///
/// ```sql
/// CREATE TABLE fact_job_executions (
///     execution_id UUID,
///     job_id String,
///     status LowCardinality(String),
///     trigger LowCardinality(String),
///     started_at DateTime64(3),
///     finished_at Nullable(DateTime64(3)),
///     duration_ms Nullable(UInt64),
///     records_processed UInt64,
///     records_failed UInt64,
///     error_message Nullable(String),
///     date_key UInt32
/// ) ENGINE = MergeTree()
/// PARTITION BY toYYYYMM(started_at)
/// ORDER BY (status, job_id, started_at);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecutionRow {
    pub execution_id: Uuid,
    pub job_id: String,
    /// succeeded, failed, cancelled, running
    pub status: String,
    /// schedule, manual, api, retry
    pub trigger: String,
    #[serde(with = "timestamp::datetime64")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "timestamp::datetime64_option")]
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub records_processed: u64,
    pub records_failed: u64,
    pub error_message: Option<String>,
    pub date_key: u32,
}

static JOB_EXECUTION_COLUMNS: [Column; 11] = [
    Column::new("execution_id", ColumnType::Uuid),
    Column::new("job_id", ColumnType::String),
    Column::new("status", ColumnType::LowCardinality),
    Column::new("trigger", ColumnType::LowCardinality),
    Column::new("started_at", ColumnType::DateTime64),
    Column::new("finished_at", ColumnType::DateTime64).nullable(),
    Column::new("duration_ms", ColumnType::UInt64).nullable(),
    Column::new("records_processed", ColumnType::UInt64),
    Column::new("records_failed", ColumnType::UInt64),
    Column::new("error_message", ColumnType::String).nullable(),
    Column::new("date_key", ColumnType::UInt32),
];

static JOB_EXECUTION_SCHEMA: TableSchema = TableSchema {
    name: "fact_job_executions",
    columns: &JOB_EXECUTION_COLUMNS,
    engine: Engine::MergeTree,
    partition_by: Some("toYYYYMM(started_at)"),
    order_by: &["status", "job_id", "started_at"],
};

impl TableRow for JobExecutionRow {
    const SCHEMA: &'static TableSchema = &JOB_EXECUTION_SCHEMA;
}

/// One stage of a job run (fact_pipeline_stages table)
///
/// ```sql
/// CREATE TABLE fact_pipeline_stages (
///     execution_id UUID,
///     job_id String,
///     stage_name LowCardinality(String),
///     stage_order UInt16,
///     status LowCardinality(String),
///     started_at DateTime64(3),
///     finished_at Nullable(DateTime64(3)),
///     duration_ms Nullable(UInt64),
///     records_in UInt64,
///     records_out UInt64,
///     error_message Nullable(String),
///     date_key UInt32
/// ) ENGINE = MergeTree()
/// PARTITION BY toYYYYMM(started_at)
/// ORDER BY (stage_name, status, started_at);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStageRow {
    pub execution_id: Uuid,
    pub job_id: String,
    /// extract, transform, validate, load
    pub stage_name: String,
    pub stage_order: u16,
    pub status: String,
    #[serde(with = "timestamp::datetime64")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "timestamp::datetime64_option")]
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub records_in: u64,
    pub records_out: u64,
    pub error_message: Option<String>,
    pub date_key: u32,
}

static PIPELINE_STAGE_COLUMNS: [Column; 12] = [
    Column::new("execution_id", ColumnType::Uuid),
    Column::new("job_id", ColumnType::String),
    Column::new("stage_name", ColumnType::LowCardinality),
    Column::new("stage_order", ColumnType::UInt16),
    Column::new("status", ColumnType::LowCardinality),
    Column::new("started_at", ColumnType::DateTime64),
    Column::new("finished_at", ColumnType::DateTime64).nullable(),
    Column::new("duration_ms", ColumnType::UInt64).nullable(),
    Column::new("records_in", ColumnType::UInt64),
    Column::new("records_out", ColumnType::UInt64),
    Column::new("error_message", ColumnType::String).nullable(),
    Column::new("date_key", ColumnType::UInt32),
];

static PIPELINE_STAGE_SCHEMA: TableSchema = TableSchema {
    name: "fact_pipeline_stages",
    columns: &PIPELINE_STAGE_COLUMNS,
    engine: Engine::MergeTree,
    partition_by: Some("toYYYYMM(started_at)"),
    order_by: &["stage_name", "status", "started_at"],
};

impl TableRow for PipelineStageRow {
    const SCHEMA: &'static TableSchema = &PIPELINE_STAGE_SCHEMA;
}

/// Security-relevant action (fact_audit_logs table)
///
/// ```sql
/// CREATE TABLE fact_audit_logs (
///     event_id UUID,
///     occurred_at DateTime64(3),
///     user_id Nullable(String),
///     action LowCardinality(String),
///     resource_type LowCardinality(String),
///     resource_id Nullable(String),
///     outcome LowCardinality(String),
///     ip_address Nullable(String),
///     details String,
///     date_key UInt32
/// ) ENGINE = MergeTree()
/// PARTITION BY toYYYYMM(occurred_at)
/// ORDER BY (action, resource_type, occurred_at);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogRow {
    pub event_id: Uuid,
    #[serde(with = "timestamp::datetime64")]
    pub occurred_at: DateTime<Utc>,
    /// NULL for system actions
    pub user_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// success, denied, error
    pub outcome: String,
    pub ip_address: Option<String>,
    /// JSON-encoded free-form context
    pub details: String,
    pub date_key: u32,
}

static AUDIT_LOG_COLUMNS: [Column; 10] = [
    Column::new("event_id", ColumnType::Uuid),
    Column::new("occurred_at", ColumnType::DateTime64),
    Column::new("user_id", ColumnType::String).nullable(),
    Column::new("action", ColumnType::LowCardinality),
    Column::new("resource_type", ColumnType::LowCardinality),
    Column::new("resource_id", ColumnType::String).nullable(),
    Column::new("outcome", ColumnType::LowCardinality),
    Column::new("ip_address", ColumnType::String).nullable(),
    Column::new("details", ColumnType::String),
    Column::new("date_key", ColumnType::UInt32),
];

static AUDIT_LOG_SCHEMA: TableSchema = TableSchema {
    name: "fact_audit_logs",
    columns: &AUDIT_LOG_COLUMNS,
    engine: Engine::MergeTree,
    partition_by: Some("toYYYYMM(occurred_at)"),
    order_by: &["action", "resource_type", "occurred_at"],
};

impl TableRow for AuditLogRow {
    const SCHEMA: &'static TableSchema = &AUDIT_LOG_SCHEMA;
}

/// Money movement over a banking network (fact_banking_transactions table)
///
/// ```sql
/// CREATE TABLE fact_banking_transactions (
///     transaction_id String,
///     network_id LowCardinality(String),
///     job_id Nullable(String),
///     direction LowCardinality(String),
///     status LowCardinality(String),
///     amount Decimal(18, 4),
///     currency LowCardinality(String),
///     counterparty Nullable(String),
///     initiated_at DateTime64(3),
///     settled_at Nullable(DateTime64(3)),
///     date_key UInt32
/// ) ENGINE = MergeTree()
/// PARTITION BY toYYYYMM(initiated_at)
/// ORDER BY (network_id, status, initiated_at);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankingTransactionRow {
    pub transaction_id: String,
    pub network_id: String,
    /// Job that produced the transaction, if any
    pub job_id: Option<String>,
    /// inbound, outbound
    pub direction: String,
    pub status: String,
    pub amount: f64,
    /// ISO 4217 code
    pub currency: String,
    pub counterparty: Option<String>,
    #[serde(with = "timestamp::datetime64")]
    pub initiated_at: DateTime<Utc>,
    #[serde(with = "timestamp::datetime64_option")]
    pub settled_at: Option<DateTime<Utc>>,
    pub date_key: u32,
}

static BANKING_TRANSACTION_COLUMNS: [Column; 11] = [
    Column::new("transaction_id", ColumnType::String),
    Column::new("network_id", ColumnType::LowCardinality),
    Column::new("job_id", ColumnType::String).nullable(),
    Column::new("direction", ColumnType::LowCardinality),
    Column::new("status", ColumnType::LowCardinality),
    Column::new("amount", ColumnType::Decimal { precision: 18, scale: 4 }),
    Column::new("currency", ColumnType::LowCardinality),
    Column::new("counterparty", ColumnType::String).nullable(),
    Column::new("initiated_at", ColumnType::DateTime64),
    Column::new("settled_at", ColumnType::DateTime64).nullable(),
    Column::new("date_key", ColumnType::UInt32),
];

static BANKING_TRANSACTION_SCHEMA: TableSchema = TableSchema {
    name: "fact_banking_transactions",
    columns: &BANKING_TRANSACTION_COLUMNS,
    engine: Engine::MergeTree,
    partition_by: Some("toYYYYMM(initiated_at)"),
    order_by: &["network_id", "status", "initiated_at"],
};

impl TableRow for BankingTransactionRow {
    const SCHEMA: &'static TableSchema = &BANKING_TRANSACTION_SCHEMA;
}
