//! Tests for the ClickHouse warehouse backend

use super::*;

fn backend() -> ClickHouseWarehouse {
    ClickHouseWarehouse::new(
        ClickHouseWarehouseConfig::new("http://ch:8123/", "analytics")
            .with_credentials("ingest", "s3cret")
            .with_managed_roles(["viewer", "job_runner"]),
    )
    .unwrap()
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_config_defaults() {
    let config = ClickHouseWarehouseConfig::default();
    assert_eq!(config.url, "http://localhost:8123");
    assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    assert!(config.username.is_none());
    assert!(config.managed_roles.is_empty());
}

#[test]
fn test_config_debug_redacts_password() {
    let config = ClickHouseWarehouseConfig::new("http://ch:8123", "db").with_credentials("u", "hunter2");
    let debug = format!("{:?}", config);
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("***"));
}

#[test]
fn test_rejects_invalid_database() {
    let result = ClickHouseWarehouse::new(ClickHouseWarehouseConfig::new("http://ch:8123", "a-b"));
    assert!(result.is_err());
}

// =============================================================================
// URL Tests
// =============================================================================

#[test]
fn test_build_url_encodes_params() {
    let url = backend().build_url(&[
        ("query".to_string(), "SELECT 1 FORMAT JSONEachRow".to_string()),
        ("param_w0".to_string(), "a&b".to_string()),
    ]);
    assert_eq!(
        url,
        "http://ch:8123/?database=analytics&query=SELECT%201%20FORMAT%20JSONEachRow&param_w0=a%26b"
    );
}

#[test]
fn test_bind_params_prefix() {
    let params: Vec<_> = bind_params(vec![("w0".into(), "x".into())]).collect();
    assert_eq!(params, vec![("param_w0".to_string(), "x".to_string())]);
}

// =============================================================================
// Response Parsing Tests
// =============================================================================

#[test]
fn test_parse_summary_written() {
    let summary = r#"{"read_rows":"0","read_bytes":"0","written_rows":"42","written_bytes":"1024","total_rows_to_read":"0"}"#;
    assert_eq!(parse_summary_written(summary), Some(42));
    assert_eq!(parse_summary_written(r#"{"written_rows":7}"#), Some(7));
    assert_eq!(parse_summary_written("not json"), None);
    assert_eq!(parse_summary_written(r#"{"read_rows":"1"}"#), None);
}

#[test]
fn test_written_rows_from_headers() {
    let mut headers = HeaderMap::new();
    headers.insert(
        SUMMARY_HEADER,
        r#"{"written_rows":"3"}"#.parse().unwrap(),
    );
    assert_eq!(written_rows(&headers), Some(3));
    assert_eq!(written_rows(&HeaderMap::new()), None);
}

#[test]
fn test_insert_receipt_counts_skipped_rows() {
    let mut headers = HeaderMap::new();
    headers.insert(SUMMARY_HEADER, r#"{"written_rows":"2"}"#.parse().unwrap());
    let receipt = insert_receipt("fact_audit_logs", 5, &headers);
    assert_eq!(receipt.submitted, 5);
    assert_eq!(receipt.written, 2);
    // server reports counts only
    assert!(receipt.row_errors.is_empty());

    let receipt = insert_receipt("fact_audit_logs", 5, &HeaderMap::new());
    assert_eq!(receipt.written, 5);
}

#[test]
fn test_exception_code_header() {
    let mut headers = HeaderMap::new();
    headers.insert(EXCEPTION_CODE_HEADER, "60".parse().unwrap());
    assert_eq!(exception_code(&headers), Some(60));
}

#[test]
fn test_parse_json_each_row() {
    let text = "{\"job_id\":\"a\",\"n\":1}\n\n{\"job_id\":\"b\",\"n\":2}\n";
    let rows = parse_json_each_row(text).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["job_id"], "b");
    let keys: Vec<_> = rows[0].keys().cloned().collect();
    assert_eq!(keys, vec!["job_id", "n"]);
}

#[test]
fn test_parse_json_each_row_empty() {
    assert!(parse_json_each_row("").unwrap().is_empty());
    assert!(parse_json_each_row("not json").is_err());
}

// =============================================================================
// Guard Tests (no network)
// =============================================================================

#[tokio::test]
async fn test_insert_empty_rows_skips_request() {
    let receipt = backend()
        .insert_rows("dim_jobs", &[], WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(receipt, InsertReceipt::complete(0));
}

#[tokio::test]
async fn test_insert_rejects_bad_table_name() {
    let mut row = Row::new();
    row.insert("a".into(), Value::from(1));
    let err = backend()
        .insert_rows("dim_jobs; DROP", &[row], WriteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WarehouseError::InvalidSql(_)));
}

#[tokio::test]
async fn test_query_rejects_writes_before_sending() {
    let err = backend().query("DROP TABLE dim_jobs").await.unwrap_err();
    assert!(matches!(err, WarehouseError::InvalidSql(_)));
}

#[tokio::test]
async fn test_load_missing_file_is_io_error() {
    let err = backend()
        .load_file("dim_jobs", Path::new("/nonexistent/whsync/rows.jsonl"), LoadFormat::JsonLines)
        .await
        .unwrap_err();
    assert!(matches!(err, WarehouseError::Io { .. }));
}
