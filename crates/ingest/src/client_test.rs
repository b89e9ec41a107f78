//! Tests for the ingest client

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use whsync_schema::UserDimRow;
use whsync_warehouse::{ErrorKind, MemoryWarehouse};

use super::*;
use crate::credentials::StaticSecretStore;

fn user(id: &str) -> Row {
    match json!({
        "user_id": id,
        "is_active": true,
        "created_at": "2024-01-01 00:00:00.000",
        "updated_at": "2024-01-01 00:00:00.000",
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn users(n: usize) -> Vec<Row> {
    (0..n).map(|i| user(&format!("u{i}"))).collect()
}

fn client() -> (Arc<MemoryWarehouse>, IngestClient) {
    let wh = Arc::new(MemoryWarehouse::with_all_tables());
    let client = IngestClient::with_warehouse(IngestSettings::default(), wh.clone());
    (wh, client)
}

/// Hands out one shared in-memory warehouse and counts connects
struct CountingConnector {
    warehouse: Arc<MemoryWarehouse>,
    connects: AtomicUsize,
}

#[async_trait]
impl WarehouseConnector for CountingConnector {
    async fn connect(&self, credentials: Credentials) -> Result<Arc<dyn Warehouse>> {
        assert_eq!(credentials.username, "svc");
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.warehouse.clone())
    }
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_session_is_created_once() {
    let connector = Arc::new(CountingConnector {
        warehouse: Arc::new(MemoryWarehouse::with_all_tables()),
        connects: AtomicUsize::new(0),
    });
    let resolver = CredentialResolver::new().with_vault(
        Arc::new(
            StaticSecretStore::new()
                .with_secret("ingest", json!({"username": "svc", "password": "pw"})),
        ),
        "ingest",
    );
    let client = IngestClient::new(IngestSettings::default(), resolver, connector.clone());
    assert!(!client.is_connected());

    client
        .stream_insert("dim_users", &users(2), InsertOptions::default())
        .await
        .unwrap();
    client.batch_insert("dim_users", &users(3), 2).await.unwrap();

    assert!(client.is_connected());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_credentials_is_fatal() {
    let connector = Arc::new(CountingConnector {
        warehouse: Arc::new(MemoryWarehouse::with_all_tables()),
        connects: AtomicUsize::new(0),
    });
    let client = IngestClient::new(
        IngestSettings::default(),
        CredentialResolver::new(),
        connector.clone(),
    );

    let err = client
        .batch_insert("dim_users", &users(3), 500)
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(!client.is_connected());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Stream Insert Tests
// =============================================================================

#[tokio::test]
async fn test_stream_insert_empty_makes_no_call() {
    let (wh, client) = client();
    let written = client
        .stream_insert("dim_users", &[], InsertOptions::default())
        .await
        .unwrap();
    assert_eq!(written, 0);
    assert!(wh.insert_calls().is_empty());
}

#[tokio::test]
async fn test_stream_insert_writes_all() {
    let (wh, client) = client();
    let written = client
        .stream_insert("dim_users", &users(10), InsertOptions::default())
        .await
        .unwrap();
    assert_eq!(written, 10);
    assert_eq!(wh.row_count("dim_users"), 10);
    assert_eq!(client.metrics().snapshot().rows_inserted, 10);
}

#[tokio::test]
async fn test_stream_insert_rejects_malformed_rows_client_side() {
    let (wh, client) = client();
    let mut rows = users(3);
    rows[1].insert("is_active".into(), json!("yes"));

    let err = client
        .stream_insert("dim_users", &rows, InsertOptions::default())
        .await
        .unwrap_err();
    match err {
        IngestError::Validation { failed, errors, .. } => {
            assert_eq!(failed, 3);
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].index, Some(1));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(wh.insert_calls().is_empty());
}

#[tokio::test]
async fn test_stream_insert_partial_failure_counts() {
    let (wh, client) = client();
    let mut rows = users(10);
    rows[3].remove("created_at");
    rows[7].insert("is_active".into(), json!(null));

    let options = InsertOptions {
        skip_invalid_rows: true,
        ..Default::default()
    };
    let err = client
        .stream_insert("dim_users", &rows, options)
        .await
        .unwrap_err();
    match err {
        IngestError::PartialFailure {
            inserted,
            failed,
            errors,
            ..
        } => {
            assert_eq!(inserted, 8);
            assert_eq!(failed, 2);
            let indexes: Vec<_> = errors.iter().map(|e| e.index).collect();
            assert_eq!(indexes, vec![Some(3), Some(7)]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(wh.row_count("dim_users"), 8);
}

#[tokio::test]
async fn test_stream_insert_raw_leaves_validation_to_warehouse() {
    let (wh, client) = client();
    let mut rows = users(4);
    rows[2].insert("is_active".into(), json!("yes"));

    let options = InsertOptions {
        raw: true,
        skip_invalid_rows: true,
        ..Default::default()
    };
    let err = client
        .stream_insert("dim_users", &rows, options)
        .await
        .unwrap_err();
    match err {
        IngestError::PartialFailure {
            inserted, failed, ..
        } => {
            assert_eq!((inserted, failed), (3, 1));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(wh.insert_calls().len(), 1);
}

#[tokio::test]
async fn test_stream_insert_does_not_retry() {
    let (wh, client) = client();
    wh.fail_next_inserts([WarehouseError::Transient("connection reset".into())]);

    let err = client
        .stream_insert("dim_users", &users(2), InsertOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(wh.insert_calls().len(), 1);
}

// =============================================================================
// Batch Insert Tests
// =============================================================================

#[tokio::test]
async fn test_batch_insert_empty() {
    let (wh, client) = client();
    let result = client.batch_insert("dim_users", &[], 500).await.unwrap();
    assert_eq!(result, InsertResult::default());
    assert!(wh.insert_calls().is_empty());
}

#[tokio::test]
async fn test_batch_insert_rejects_zero_batch_size() {
    let (_wh, client) = client();
    let err = client.batch_insert("dim_users", &users(1), 0).await.unwrap_err();
    assert!(matches!(err, IngestError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_batch_insert_chunks_in_order() {
    let (wh, client) = client();
    let rows = users(1200);

    let result = client.batch_insert("dim_users", &rows, 500).await.unwrap();

    assert_eq!(result.inserted, 1200);
    assert_eq!(result.failed, 0);
    let sizes: Vec<_> = wh.insert_calls().iter().map(|c| c.rows).collect();
    assert_eq!(sizes, vec![500, 500, 200]);

    let stored = wh.rows("dim_users");
    assert_eq!(stored[0]["user_id"], "u0");
    assert_eq!(stored[1199]["user_id"], "u1199");
}

#[tokio::test]
async fn test_batch_insert_validation_failure_isolated_to_chunk() {
    let (wh, client) = client();
    wh.fail_next_inserts([WarehouseError::validation(
        "dim_users",
        "Cannot parse input",
        500,
        Vec::new(),
    )]);

    let rows = users(1200);
    let result = client.batch_insert("dim_users", &rows, 500).await.unwrap();

    assert_eq!(result.inserted, 700);
    assert_eq!(result.failed, 500);
    assert_eq!(result.total(), rows.len());
    assert_eq!(wh.insert_calls().len(), 3);
    assert_eq!(client.metrics().snapshot().retries, 0);
}

#[tokio::test]
async fn test_batch_insert_auth_failure_not_retried() {
    let (wh, client) = client();
    wh.fail_next_inserts([WarehouseError::Auth("token expired".into())]);

    let result = client.batch_insert("dim_users", &users(10), 500).await.unwrap();
    assert_eq!(result.failed, 10);
    assert_eq!(wh.insert_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_batch_insert_backoff_schedule() {
    let (wh, client) = client();
    wh.fail_next_inserts([
        WarehouseError::Transient("overloaded".into()),
        WarehouseError::Transient("overloaded".into()),
        WarehouseError::Transient("overloaded".into()),
    ]);

    let result = client.batch_insert("dim_users", &users(5), 500).await.unwrap();
    assert_eq!(result.inserted, 5);
    assert_eq!(result.failed, 0);

    let calls = wh.insert_calls();
    assert_eq!(calls.len(), 4);
    let gaps: Vec<u128> = calls
        .windows(2)
        .map(|w| (w[1].at - w[0].at).as_millis())
        .collect();
    assert_eq!(gaps, vec![1000, 2000, 4000]);
    assert_eq!(client.metrics().snapshot().retries, 3);
}

#[tokio::test(start_paused = true)]
async fn test_batch_insert_exhausted_chunk_counts_failed_and_continues() {
    let (wh, client) = client();
    wh.fail_next_inserts((0..4).map(|_| WarehouseError::Transient("timeout".into())));

    let rows = users(700);
    let result = client.batch_insert("dim_users", &rows, 500).await.unwrap();

    assert_eq!(result.failed, 500);
    assert_eq!(result.inserted, 200);
    assert_eq!(result.total(), rows.len());
    // 4 attempts on the first chunk, 1 on the second
    assert_eq!(wh.insert_calls().len(), 5);
    assert_eq!(wh.row_count("dim_users"), 200);
}

#[tokio::test(start_paused = true)]
async fn test_batch_insert_partial_chunk_not_retried() {
    let wh = Arc::new(MemoryWarehouse::with_all_tables());
    let mut settings = IngestSettings::default();
    settings.write.skip_invalid_rows = true;
    let client = IngestClient::with_warehouse(settings, wh.clone());

    let mut rows = users(6);
    rows[1].remove("updated_at");

    let result = client.batch_insert("dim_users", &rows, 3).await.unwrap();
    assert_eq!(result.inserted, 5);
    assert_eq!(result.failed, 1);
    assert_eq!(wh.insert_calls().len(), 2);
    assert_eq!(client.metrics().snapshot().partial_failures, 1);
}

#[tokio::test]
async fn test_batch_insert_already_cancelled() {
    let (wh, client) = client();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = client
        .batch_insert_with_cancel("dim_users", &users(10), 4, &cancel)
        .await
        .unwrap();
    assert_eq!(
        result,
        InsertResult {
            inserted: 0,
            failed: 0,
            skipped: 10,
            cancelled: true,
        }
    );
    assert!(wh.insert_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_batch_insert_cancelled_during_backoff() {
    let (wh, client) = client();
    wh.fail_next_inserts([WarehouseError::Transient("overloaded".into())]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let result = client
        .batch_insert_with_cancel("dim_users", &users(10), 4, &cancel)
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.inserted, 0);
    assert_eq!(result.failed, 4);
    assert_eq!(result.skipped, 6);
    assert_eq!(result.total(), 10);
    assert_eq!(wh.insert_calls().len(), 1);
}

// =============================================================================
// Typed Record Tests
// =============================================================================

#[derive(Serialize)]
struct LegacyUser {
    user_id: String,
    is_active: String,
}

impl TableRow for LegacyUser {
    const SCHEMA: &'static TableSchema = <UserDimRow as TableRow>::SCHEMA;
}

#[tokio::test]
async fn test_insert_records() {
    let (wh, client) = client();
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let records: Vec<UserDimRow> = (0..3)
        .map(|i| UserDimRow {
            user_id: format!("u{i}"),
            username: Some(format!("user{i}")),
            email: None,
            role: Some("analyst".into()),
            department: None,
            is_active: true,
            created_at: now,
            last_login_at: None,
            updated_at: now,
        })
        .collect();

    let result = client.insert_records("dim_users", &records).await.unwrap();
    assert_eq!(result.inserted, 3);
    assert_eq!(wh.rows("dim_users")[0]["created_at"], "2024-05-01 12:00:00.000");
}

#[tokio::test]
async fn test_insert_records_counts_invalid_without_sending() {
    let (wh, client) = client();
    let records = vec![LegacyUser {
        user_id: "u1".into(),
        is_active: "yes".into(),
    }];

    let result = client.insert_records("dim_users", &records).await.unwrap();
    assert_eq!(result.inserted, 0);
    assert_eq!(result.failed, 1);
    assert!(wh.insert_calls().is_empty());
    assert_eq!(client.metrics().snapshot().validation_rejections, 1);
}

// =============================================================================
// Load / Query Tests
// =============================================================================

#[tokio::test]
async fn test_load_from_file() {
    let (wh, client) = client();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for row in users(3) {
        writeln!(file, "{}", Value::Object(row)).unwrap();
    }

    let job = client
        .load_from_file("dim_users", file.path(), LoadFormat::JsonLines)
        .await
        .unwrap();
    assert_eq!(job.rows_loaded, 3);
    assert_eq!(wh.row_count("dim_users"), 3);
    assert_eq!(client.metrics().snapshot().loads, 1);
}

#[tokio::test]
async fn test_load_missing_file_fails_before_warehouse() {
    let connector = Arc::new(CountingConnector {
        warehouse: Arc::new(MemoryWarehouse::with_all_tables()),
        connects: AtomicUsize::new(0),
    });
    let client = IngestClient::new(
        IngestSettings::default(),
        CredentialResolver::new(),
        connector.clone(),
    );

    let err = client
        .load_from_file("dim_users", Path::new("/nonexistent/users.csv"), LoadFormat::Csv)
        .await
        .unwrap_err();
    assert_eq!(err.warehouse_kind(), Some(ErrorKind::Io));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

#[derive(Debug, Deserialize, PartialEq)]
struct JobCount {
    job_type: String,
    n: u64,
}

#[tokio::test]
async fn test_query_decodes_rows() {
    let (wh, client) = client();
    let sql = "SELECT job_type, count() AS n FROM dim_jobs GROUP BY job_type";
    let rows = [json!({"job_type": "etl", "n": 4}), json!({"job_type": "export", "n": 1})]
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    wh.register_query(sql, rows);

    let counts: Vec<JobCount> = client.query(sql).await.unwrap();
    assert_eq!(
        counts,
        vec![
            JobCount {
                job_type: "etl".into(),
                n: 4
            },
            JobCount {
                job_type: "export".into(),
                n: 1
            },
        ]
    );
}

#[tokio::test]
async fn test_query_rejects_writes() {
    let (_wh, client) = client();
    let err = client
        .query_rows("INSERT INTO dim_jobs SELECT * FROM dim_jobs")
        .await
        .unwrap_err();
    assert_eq!(err.warehouse_kind(), Some(ErrorKind::Validation));
}

// =============================================================================
// Access Grant Tests
// =============================================================================

#[tokio::test]
async fn test_grant_is_additive() {
    let (wh, client) = client();
    wh.set_bindings(vec![
        AccessBinding::new("warehouse_viewer", "alice"),
        AccessBinding::new("warehouse_admin", "ops"),
    ]);

    let added = client.grant_read_only_access("etl_runner").await.unwrap();
    assert_eq!(added, 2);

    let bindings = wh.bindings();
    assert_eq!(bindings.len(), 4);
    assert!(bindings.contains(&AccessBinding::new("warehouse_viewer", "alice")));
    assert!(bindings.contains(&AccessBinding::new("warehouse_admin", "ops")));
    assert!(bindings.contains(&AccessBinding::new("warehouse_viewer", "etl_runner")));
    assert!(bindings.contains(&AccessBinding::new("warehouse_job_runner", "etl_runner")));
}

#[tokio::test]
async fn test_grant_twice_adds_nothing() {
    let (wh, client) = client();
    client.grant_read_only_access("etl_runner").await.unwrap();
    let added = client.grant_read_only_access("etl_runner").await.unwrap();

    assert_eq!(added, 0);
    assert_eq!(wh.bindings().len(), 2);
    assert_eq!(wh.policy_writes(), 1);
}

#[tokio::test]
async fn test_grant_retries_on_conflict() {
    let (wh, client) = client();
    wh.conflict_next_policy_writes(2);

    let added = client.grant_read_only_access("etl_runner").await.unwrap();
    assert_eq!(added, 2);
    assert_eq!(wh.bindings().len(), 2);
}

#[tokio::test]
async fn test_grant_gives_up_after_repeated_conflicts() {
    let (wh, client) = client();
    wh.conflict_next_policy_writes(3);

    let err = client.grant_read_only_access("etl_runner").await.unwrap_err();
    assert_eq!(err.warehouse_kind(), Some(ErrorKind::Conflict));
    assert!(wh.bindings().is_empty());
}

#[tokio::test]
async fn test_concurrent_grants_keep_both() {
    let (wh, client) = client();
    let client = Arc::new(client);

    let a = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.grant_read_only_access("alice").await }
    });
    let b = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.grant_read_only_access("bob").await }
    });
    assert_eq!(a.await.unwrap().unwrap(), 2);
    assert_eq!(b.await.unwrap().unwrap(), 2);
    assert_eq!(wh.bindings().len(), 4);
}

#[tokio::test]
async fn test_grant_rejects_bad_principal() {
    let (wh, client) = client();
    let err = client
        .grant_read_only_access("bob; DROP TABLE dim_users")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::InvalidArgument(_)));
    assert_eq!(wh.policy_writes(), 0);
}

// =============================================================================
// Settings Tests
// =============================================================================

#[test]
fn test_settings_follow_config_table_names() {
    let mut config = Config::default();
    config.dimensions.tables.dim_users = "users_v2".into();
    config.ingest.max_retries = 5;

    let settings = IngestSettings::from_config(&config);
    assert_eq!(settings.schema("users_v2").map(|s| s.name), Some("dim_users"));
    assert_eq!(settings.retry.max_retries, 5);
    assert!(settings.schema("unknown_table").is_none());
    assert_eq!(settings.known_tables().count(), 8);
}
