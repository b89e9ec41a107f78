//! ClickHouse backend over the HTTP interface
//!
//! - Inserts and loads: `INSERT INTO db.table FORMAT <fmt>` with the payload as body;
//!   written rows come from the `X-ClickHouse-Summary` header (`wait_end_of_query=1`)
//! - Reads: `... FORMAT JSONEachRow` via GET, so the server enforces readonly
//! - Mutations and grants: POST with the statement as body
//! - Parameters: `{name:Type}` placeholders bound through `param_<name>`
//! - Errors: classified from the HTTP status and `X-ClickHouse-Exception-Code`

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, WarehouseError, classify_response, code_from_body};
use crate::model::{
    AccessBinding, AccessPolicy, InsertReceipt, LoadFormat, LoadJob, Mutation, Select,
    WriteOptions,
};
use crate::sql::{self, Statement, ensure_identifier};
use crate::{Row, Warehouse};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const SUMMARY_HEADER: &str = "x-clickhouse-summary";
const EXCEPTION_CODE_HEADER: &str = "x-clickhouse-exception-code";

// =============================================================================
// Configuration
// =============================================================================

/// ClickHouse warehouse configuration
#[derive(Clone)]
pub struct ClickHouseWarehouseConfig {
    /// HTTP URL (e.g., "http://localhost:8123")
    pub url: String,

    /// Database holding the dataset
    pub database: String,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,

    /// Roles whose grants make up the access policy
    pub managed_roles: Vec<String>,
}

impl Default for ClickHouseWarehouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".into(),
            database: "default".into(),
            username: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            managed_roles: Vec::new(),
        }
    }
}

impl fmt::Debug for ClickHouseWarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickHouseWarehouseConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .field("managed_roles", &self.managed_roles)
            .finish()
    }
}

impl ClickHouseWarehouseConfig {
    /// Create a new config with URL and database
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Set authentication credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_managed_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.managed_roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

// =============================================================================
// Backend Implementation
// =============================================================================

/// ClickHouse warehouse using the HTTP interface
#[derive(Clone)]
pub struct ClickHouseWarehouse {
    client: reqwest::Client,
    config: ClickHouseWarehouseConfig,
}

impl fmt::Debug for ClickHouseWarehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickHouseWarehouse")
            .field("url", &self.config.url)
            .field("database", &self.config.database)
            .finish()
    }
}

impl ClickHouseWarehouse {
    /// Create a backend from config
    pub fn new(config: ClickHouseWarehouseConfig) -> Result<Self> {
        ensure_identifier("database", &config.database)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WarehouseError::Protocol(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClickHouseWarehouseConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Build the request URL with the database and extra query-string entries
    fn build_url(&self, params: &[(String, String)]) -> String {
        let mut url = format!(
            "{}/?database={}",
            self.base_url(),
            urlencoding::encode(&self.config.database)
        );
        for (key, value) in params {
            url.push('&');
            url.push_str(&urlencoding::encode(key));
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_ref()),
            None => request,
        }
    }

    /// Send and turn non-2xx responses into classified errors
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        table: &str,
        submitted: usize,
    ) -> Result<reqwest::Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let header_code = exception_code(response.headers());
        let body = response.text().await.unwrap_or_default();
        let code = header_code.or_else(|| code_from_body(&body));
        Err(classify_response(
            status.as_u16(),
            code,
            body.trim().to_string(),
            table,
            submitted,
        ))
    }

    /// Run a read and parse JSONEachRow output
    async fn read(&self, stmt: Statement) -> Result<Vec<Row>> {
        let mut params = vec![(
            "query".to_string(),
            format!("{} FORMAT JSONEachRow", stmt.sql.trim().trim_end_matches(';')),
        )];
        params.push((
            "output_format_json_quote_64bit_integers".to_string(),
            "0".to_string(),
        ));
        params.extend(bind_params(stmt.params));

        let url = self.build_url(&params);
        let response = self.send(self.client.get(&url), "", 0).await?;
        let text = response.text().await?;
        parse_json_each_row(&text)
    }

    /// Run a statement that returns nothing (ALTER, TRUNCATE, GRANT, REVOKE)
    async fn command(&self, stmt: Statement) -> Result<()> {
        debug!(sql = %stmt.sql, "executing command");
        let url = self.build_url(&bind_params(stmt.params).collect::<Vec<_>>());
        self.send(self.client.post(&url).body(stmt.sql), "", 0)
            .await?;
        Ok(())
    }

    async fn read_bindings(&self) -> Result<Vec<AccessBinding>> {
        if self.config.managed_roles.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = Statement::default();
        let roles = Value::Array(
            self.config
                .managed_roles
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        );
        let placeholder = stmt.bind("r", &roles)?;
        stmt.sql = format!(
            "SELECT granted_role_name AS role, coalesce(user_name, role_name) AS member \
             FROM system.role_grants WHERE has({}, granted_role_name) ORDER BY role, member",
            placeholder
        );

        self.read(stmt)
            .await?
            .into_iter()
            .map(|row| {
                let role = row.get("role").and_then(Value::as_str);
                let member = row.get("member").and_then(Value::as_str);
                match (role, member) {
                    (Some(role), Some(member)) => Ok(AccessBinding::new(role, member)),
                    _ => Err(WarehouseError::Protocol(format!(
                        "unexpected role_grants row: {}",
                        Value::Object(row.clone())
                    ))),
                }
            })
            .collect()
    }
}

#[async_trait]
impl Warehouse for ClickHouseWarehouse {
    fn name(&self) -> &str {
        "clickhouse"
    }

    async fn insert_rows(
        &self,
        table: &str,
        rows: &[Row],
        options: WriteOptions,
    ) -> Result<InsertReceipt> {
        if rows.is_empty() {
            return Ok(InsertReceipt::complete(0));
        }
        ensure_identifier("table", table)?;

        let mut body = String::new();
        for row in rows {
            let line = serde_json::to_string(row)
                .map_err(|e| WarehouseError::Protocol(format!("failed to encode row: {}", e)))?;
            body.push_str(&line);
            body.push('\n');
        }

        let (errors_ratio, errors_num) = if options.skip_invalid_rows {
            ("1", rows.len().to_string())
        } else {
            ("0", "0".to_string())
        };
        let params = vec![
            (
                "query".to_string(),
                format!(
                    "INSERT INTO {}.{} FORMAT JSONEachRow",
                    self.config.database, table
                ),
            ),
            (
                "input_format_skip_unknown_fields".to_string(),
                u8::from(options.ignore_unknown_values).to_string(),
            ),
            (
                "input_format_allow_errors_ratio".to_string(),
                errors_ratio.to_string(),
            ),
            ("input_format_allow_errors_num".to_string(), errors_num),
            ("wait_end_of_query".to_string(), "1".to_string()),
        ];

        let start = Instant::now();
        let url = self.build_url(&params);
        let response = self
            .send(
                self.client
                    .post(&url)
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
                table,
                rows.len(),
            )
            .await?;

        let receipt = insert_receipt(table, rows.len(), response.headers());
        debug!(
            table = %table,
            submitted = receipt.submitted,
            written = receipt.written,
            duration_ms = start.elapsed().as_millis() as u64,
            "inserted rows"
        );
        Ok(receipt)
    }

    async fn load_file(&self, table: &str, path: &Path, format: LoadFormat) -> Result<LoadJob> {
        ensure_identifier("table", table)?;
        let payload = tokio::fs::read(path).await.map_err(|e| WarehouseError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let job_id = uuid::Uuid::new_v4().to_string();
        let params = vec![
            (
                "query".to_string(),
                format!(
                    "INSERT INTO {}.{} FORMAT {}",
                    self.config.database,
                    table,
                    format.clickhouse_format()
                ),
            ),
            ("query_id".to_string(), job_id.clone()),
            ("input_format_skip_unknown_fields".to_string(), "0".to_string()),
            ("wait_end_of_query".to_string(), "1".to_string()),
        ];

        info!(table = %table, job_id = %job_id, path = %path.display(), format = %format, "starting load");
        let url = self.build_url(&params);
        let response = self
            .send(
                self.client
                    .post(&url)
                    .header("Content-Type", "application/octet-stream")
                    .body(payload),
                table,
                0,
            )
            .await?;

        let rows_loaded = written_rows(response.headers()).unwrap_or_else(|| {
            warn!(table = %table, job_id = %job_id, "load finished without a summary header");
            0
        });

        Ok(LoadJob {
            job_id,
            rows_loaded,
        })
    }

    async fn select(&self, select: &Select) -> Result<Vec<Row>> {
        let stmt = sql::render_select(&self.config.database, select)?;
        self.read(stmt).await
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        sql::validate_sql(sql)?;
        self.read(Statement {
            sql: sql.to_string(),
            params: Vec::new(),
        })
        .await
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<()> {
        let stmt = match mutation {
            Mutation::Truncate { table } => {
                ensure_identifier("table", table)?;
                Statement {
                    sql: format!("TRUNCATE TABLE {}.{}", self.config.database, table),
                    params: Vec::new(),
                }
            }
            Mutation::Update { table, set, filter } => {
                sql::render_update(&self.config.database, table, set, filter)?
            }
            Mutation::Delete { table, filter } => {
                sql::render_delete(&self.config.database, table, filter)?
            }
        };
        self.command(stmt).await
    }

    async fn get_access_policy(&self) -> Result<AccessPolicy> {
        let bindings = self.read_bindings().await?;
        let etag = AccessPolicy::content_etag(&bindings);
        Ok(AccessPolicy { bindings, etag })
    }

    async fn set_access_policy(&self, policy: &AccessPolicy) -> Result<()> {
        let current = self.get_access_policy().await?;
        if current.etag != policy.etag {
            return Err(WarehouseError::Conflict {
                expected: policy.etag.clone(),
                found: current.etag,
            });
        }

        for binding in &policy.bindings {
            if !self.config.managed_roles.contains(&binding.role) {
                return Err(WarehouseError::Unsupported(format!(
                    "role '{}' is not managed by this warehouse",
                    binding.role
                )));
            }
        }

        let to_revoke = current
            .bindings
            .iter()
            .filter(|b| !policy.bindings.contains(b));
        for binding in to_revoke {
            ensure_identifier("role", &binding.role)?;
            ensure_identifier("member", &binding.member)?;
            self.command(Statement {
                sql: format!("REVOKE {} FROM {}", binding.role, binding.member),
                params: Vec::new(),
            })
            .await?;
            info!(role = %binding.role, member = %binding.member, "revoked role");
        }

        let to_grant = policy
            .bindings
            .iter()
            .filter(|b| !current.bindings.contains(b));
        for binding in to_grant {
            ensure_identifier("role", &binding.role)?;
            ensure_identifier("member", &binding.member)?;
            self.command(Statement {
                sql: format!("GRANT {} TO {}", binding.role, binding.member),
                params: Vec::new(),
            })
            .await?;
            info!(role = %binding.role, member = %binding.member, "granted role");
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/ping", self.base_url());
        self.send(self.client.get(&url), "", 0).await?;
        Ok(())
    }
}

// =============================================================================
// Response helpers
// =============================================================================

fn bind_params(params: Vec<(String, String)>) -> impl Iterator<Item = (String, String)> {
    params
        .into_iter()
        .map(|(name, value)| (format!("param_{}", name), value))
}

fn exception_code(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(EXCEPTION_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn written_rows(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(SUMMARY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_summary_written)
}

/// Receipt for an insert from its response headers
///
/// ClickHouse reports how many rows it wrote but not which ones it skipped under
/// `input_format_allow_errors_*`, so a partial receipt carries no row errors.
fn insert_receipt(table: &str, submitted: usize, headers: &HeaderMap) -> InsertReceipt {
    let written = match written_rows(headers) {
        Some(written) => (written as usize).min(submitted),
        None => {
            debug!(table = %table, "no summary header, assuming every row was written");
            submitted
        }
    };
    if written < submitted {
        warn!(
            table = %table,
            submitted,
            written,
            "server skipped invalid rows without per-row detail"
        );
    }
    InsertReceipt {
        submitted,
        written,
        row_errors: Vec::new(),
    }
}

/// `written_rows` from a summary like `{"read_rows":"0","written_rows":"42",...}`
fn parse_summary_written(summary: &str) -> Option<u64> {
    let parsed: serde_json::Map<String, Value> = serde_json::from_str(summary).ok()?;
    match parsed.get("written_rows")? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn parse_json_each_row(text: &str) -> Result<Vec<Row>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<Row>(line)
                .map_err(|e| WarehouseError::Protocol(format!("failed to parse JSON row: {}", e)))
        })
        .collect()
}

#[cfg(test)]
#[path = "clickhouse_test.rs"]
mod clickhouse_test;
