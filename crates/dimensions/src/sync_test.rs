//! Tests for the dimension synchronizer

use async_trait::async_trait;
use chrono::{Duration, TimeZone};
use serde_json::json;
use uuid::Uuid;
use whsync_ingest::IngestSettings;
use whsync_warehouse::{MemoryWarehouse, WarehouseError};

use super::*;
use crate::catalog::{BankingNetwork, StaticCatalog};
use crate::job::{ExecutionStatus, ExecutionTrigger, StageRun};

fn setup_with(catalog: Arc<dyn NetworkCatalog>) -> (Arc<MemoryWarehouse>, DimensionSynchronizer) {
    let wh = Arc::new(MemoryWarehouse::with_all_tables());
    let client = Arc::new(IngestClient::with_warehouse(
        IngestSettings::default(),
        wh.clone(),
    ));
    let config = DimensionsConfig {
        start_year: 2020,
        end_year: 2021,
        ..Default::default()
    };
    let sync = DimensionSynchronizer::new(client, catalog, &config).unwrap();
    (wh, sync)
}

fn setup() -> (Arc<MemoryWarehouse>, DimensionSynchronizer) {
    setup_with(Arc::new(StaticCatalog::builtin()))
}

fn job() -> Job {
    Job::new("nightly_ach", "Nightly ACH export", "etl", "postgres", "clickhouse")
        .with_schedule("0 2 * * *")
}

struct BrokenCatalog;

#[async_trait]
impl NetworkCatalog for BrokenCatalog {
    async fn networks(&self) -> Result<Vec<BankingNetwork>> {
        Err(DimensionError::Catalog("upstream unavailable".into()))
    }
}

// =============================================================================
// Banking Network Tests
// =============================================================================

#[tokio::test]
async fn test_network_refresh_is_idempotent() {
    let (wh, sync) = setup();
    let n = StaticCatalog::builtin().len();

    assert_eq!(sync.sync_banking_networks().await.unwrap(), n);
    assert_eq!(wh.row_count("dim_banking_networks"), n);

    // Manual edit between refreshes
    let mut stray = wh.rows("dim_banking_networks")[0].clone();
    stray.insert("network_id".into(), json!("manual"));
    wh.seed_rows("dim_banking_networks", [stray]);

    assert_eq!(sync.sync_banking_networks().await.unwrap(), n);
    assert_eq!(wh.row_count("dim_banking_networks"), n);
}

#[tokio::test]
async fn test_catalog_failure_leaves_table_alone() {
    let (wh, sync) = setup_with(Arc::new(BrokenCatalog));
    let err = sync.sync_banking_networks().await.unwrap_err();
    assert!(matches!(err, DimensionError::Catalog(_)));
    assert!(wh.mutations().is_empty());
}

#[tokio::test]
async fn test_network_insert_failure_is_incomplete() {
    let (wh, sync) = setup();
    wh.fail_next_inserts([WarehouseError::Auth("denied".into())]);

    let err = sync.sync_banking_networks().await.unwrap_err();
    match err {
        DimensionError::Incomplete { inserted, failed, .. } => {
            assert_eq!(inserted, 0);
            assert_eq!(failed, StaticCatalog::builtin().len());
        }
        other => panic!("unexpected {other:?}"),
    }
}

// =============================================================================
// Job (SCD-2) Tests
// =============================================================================

#[tokio::test]
async fn test_first_upsert_creates_current_version() {
    let (wh, sync) = setup();
    let version = sync.upsert_job(&job()).await.unwrap();

    assert!(version.is_current);
    assert_eq!(wh.row_count("dim_jobs"), 1);
    let current = sync.current_job("nightly_ach").await.unwrap().unwrap();
    assert_eq!(current.job_key, version.job_key);
    assert!(current.effective_to.is_none());
}

#[tokio::test]
async fn test_sequential_upserts_keep_one_current() {
    let (_wh, sync) = setup();
    let mut job = job();
    for timeout in [600, 900, 1200] {
        job.timeout_seconds = timeout;
        sync.upsert_job(&job).await.unwrap();
    }

    let history = sync.job_history("nightly_ach").await.unwrap();
    assert_eq!(history.len(), 3);
    let current: Vec<_> = history.iter().filter(|v| v.is_current).collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].timeout_seconds, 1200);

    for version in &history {
        assert_eq!(version.effective_to.is_none(), version.is_current);
    }
}

#[tokio::test]
async fn test_concurrent_upserts_keep_one_current() {
    let (_wh, sync) = setup();
    let sync = Arc::new(sync);

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move {
                let mut job = job();
                job.retry.max_attempts = i;
                sync.upsert_job(&job).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = sync.job_history("nightly_ach").await.unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history.iter().filter(|v| v.is_current).count(), 1);
}

#[tokio::test]
async fn test_upsert_does_not_touch_other_jobs() {
    let (_wh, sync) = setup();
    sync.upsert_job(&job()).await.unwrap();
    sync.upsert_job(&Job::new("hourly_rtp", "RTP sync", "stream", "kafka", "clickhouse"))
        .await
        .unwrap();
    sync.upsert_job(&job()).await.unwrap();

    assert!(sync.current_job("hourly_rtp").await.unwrap().is_some());
    assert_eq!(sync.job_history("hourly_rtp").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_upsert_job_rejects_empty_id() {
    let (wh, sync) = setup();
    let mut job = job();
    job.job_id.clear();
    assert!(matches!(
        sync.upsert_job(&job).await,
        Err(DimensionError::InvalidInput(_))
    ));
    assert!(wh.mutations().is_empty());
}

// =============================================================================
// User Tests
// =============================================================================

#[tokio::test]
async fn test_upsert_user_insert_then_update() {
    let (wh, sync) = setup();
    let profile = UserProfile {
        username: Some("alice".into()),
        email: Some("alice@example.com".into()),
        role: Some("analyst".into()),
        department: None,
    };
    assert_eq!(
        sync.upsert_user("u1", &profile).await.unwrap(),
        UserUpsert::Inserted
    );

    let stored = wh.rows("dim_users");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["is_active"], true);
    let created_at = stored[0]["created_at"].clone();

    let change = UserProfile {
        department: Some("risk".into()),
        ..Default::default()
    };
    assert_eq!(
        sync.upsert_user("u1", &change).await.unwrap(),
        UserUpsert::Updated
    );

    let stored = wh.rows("dim_users");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["department"], "risk");
    assert_eq!(stored[0]["username"], "alice");
    assert_eq!(stored[0]["created_at"], created_at);
    assert!(stored[0]["last_login_at"].is_string());
}

#[tokio::test]
async fn test_concurrent_first_sightings_insert_once() {
    let (wh, sync) = setup();
    let sync = Arc::new(sync);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.upsert_user("u9", &UserProfile::default()).await })
        })
        .collect();
    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() == UserUpsert::Inserted {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(wh.row_count("dim_users"), 1);
}

// =============================================================================
// Date Dimension Tests
// =============================================================================

#[tokio::test]
async fn test_generate_date_dimension_counts() {
    let (wh, sync) = setup();
    assert_eq!(sync.generate_date_dimension(2020, 2020).await.unwrap(), 366);
    assert_eq!(wh.row_count("dim_date"), 366);

    // Full refresh replaces rather than appends
    assert_eq!(sync.generate_date_dimension(2021, 2021).await.unwrap(), 365);
    assert_eq!(wh.row_count("dim_date"), 365);
}

#[tokio::test]
async fn test_generate_date_dimension_row_shape() {
    let (wh, sync) = setup();
    sync.generate_date_dimension(2021, 2021).await.unwrap();

    let first = &wh.rows("dim_date")[0];
    assert_eq!(first["date_key"], 20210101);
    assert_eq!(first["full_date"], "2021-01-01");
    assert_eq!(first["week_of_year"], 53);
    assert_eq!(first["iso_year"], 2020);
    assert_eq!(first["fiscal_year"], 2021);
    assert_eq!(first["fiscal_quarter"], 2);
}

#[tokio::test]
async fn test_invalid_year_range_touches_nothing() {
    let (wh, sync) = setup();
    let err = sync.generate_date_dimension(2030, 2020).await.unwrap_err();
    assert!(err.is_configuration());
    assert!(wh.mutations().is_empty());
    assert!(wh.insert_calls().is_empty());
}

// =============================================================================
// Sync All Tests
// =============================================================================

#[tokio::test]
async fn test_sync_all() {
    let (wh, sync) = setup();
    let summary = sync.sync_all().await.unwrap();

    assert_eq!(summary.networks, StaticCatalog::builtin().len());
    assert_eq!(summary.dates, 731);
    assert_eq!(wh.row_count("dim_date"), 731);
}

#[tokio::test]
async fn test_sync_all_stops_at_first_failure() {
    let (wh, sync) = setup_with(Arc::new(BrokenCatalog));
    assert!(sync.sync_all().await.is_err());
    assert_eq!(wh.row_count("dim_date"), 0);
    assert!(wh.insert_calls().is_empty());
}

// =============================================================================
// Fact / Event Tests
// =============================================================================

fn execution() -> JobExecution {
    let started = Utc.with_ymd_and_hms(2024, 7, 4, 2, 0, 0).unwrap();
    JobExecution {
        execution_id: Uuid::new_v4(),
        job_id: "nightly_ach".into(),
        status: ExecutionStatus::Failed,
        trigger: ExecutionTrigger::Retry,
        started_at: started,
        finished_at: Some(started + Duration::minutes(5)),
        records_processed: 10,
        records_failed: 10,
        error_message: Some("destination rejected batch".into()),
        stages: vec![StageRun {
            name: "extract".into(),
            status: ExecutionStatus::Succeeded,
            started_at: started,
            finished_at: Some(started + Duration::minutes(1)),
            records_in: 0,
            records_out: 10,
            error_message: None,
        }],
    }
}

#[tokio::test]
async fn test_record_job_execution_with_stages() {
    let (wh, sync) = setup();
    sync.record_job_execution(&execution()).await.unwrap();

    let executions = wh.rows("fact_job_executions");
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0]["status"], "failed");
    assert_eq!(executions[0]["duration_ms"], 300_000);
    assert_eq!(wh.row_count("fact_pipeline_stages"), 1);
}

#[tokio::test]
async fn test_handle_dispatches_events() {
    let (wh, sync) = setup();

    sync.handle(&DomainEvent::JobSaved { job: job() }).await.unwrap();
    sync.handle(&DomainEvent::UserSeen {
        user_id: "u1".into(),
        profile: UserProfile::default(),
    })
    .await
    .unwrap();
    sync.handle(&DomainEvent::NetworkCatalogUpdated).await.unwrap();
    sync.handle(&DomainEvent::JobExecuted {
        execution: execution(),
    })
    .await
    .unwrap();
    sync.handle(&DomainEvent::AuditRecorded {
        event: AuditEvent {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            user_id: Some("u1".into()),
            action: "job.update".into(),
            resource_type: "job".into(),
            resource_id: Some("nightly_ach".into()),
            outcome: "success".into(),
            ip_address: None,
            details: json!({"field": "schedule"}),
        },
    })
    .await
    .unwrap();

    assert_eq!(wh.row_count("dim_jobs"), 1);
    assert_eq!(wh.row_count("dim_users"), 1);
    assert_eq!(wh.row_count("dim_banking_networks"), StaticCatalog::builtin().len());
    assert_eq!(wh.row_count("fact_job_executions"), 1);
    assert_eq!(wh.row_count("fact_audit_logs"), 1);
}

#[tokio::test]
async fn test_record_banking_transactions_reports_partial() {
    let (wh, sync) = setup();
    let initiated = Utc.with_ymd_and_hms(2024, 7, 4, 9, 30, 0).unwrap();
    let transactions: Vec<_> = (0..3)
        .map(|i| BankingTransactionRow {
            transaction_id: format!("tx{i}"),
            network_id: "rtp".into(),
            job_id: None,
            direction: "outbound".into(),
            status: "settled".into(),
            amount: 125.5,
            currency: "USD".into(),
            counterparty: None,
            initiated_at: initiated,
            settled_at: Some(initiated),
            date_key: 20240704,
        })
        .collect();

    wh.fail_next_inserts([WarehouseError::validation(
        "fact_banking_transactions",
        "Cannot parse input",
        3,
        Vec::new(),
    )]);
    let result = sync.record_banking_transactions(&transactions).await.unwrap();
    assert_eq!(result.failed, 3);

    let result = sync.record_banking_transactions(&transactions).await.unwrap();
    assert_eq!(result.inserted, 3);
}
