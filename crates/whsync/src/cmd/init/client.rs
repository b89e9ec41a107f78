//! ClickHouse client for schema operations
//!
//! Runs DDL as an administrative user; the ingest path never uses it.

use anyhow::{Context, Result};
use clickhouse::Client;

/// Administrative ClickHouse session
pub struct SchemaClient {
    client: Client,
}

impl SchemaClient {
    /// Create a new client and test connection
    pub async fn connect(url: &str, user: &str, password: Option<&str>) -> Result<Self> {
        let mut client = Client::default().with_url(url).with_user(user);
        if let Some(password) = password {
            client = client.with_password(password);
        }

        client
            .query("SELECT 1")
            .execute()
            .await
            .with_context(|| format!("failed to connect to ClickHouse at {url}"))?;

        Ok(Self { client })
    }

    /// Execute a single SQL statement
    pub async fn execute(&self, sql: &str) -> Result<()> {
        self.client
            .query(sql)
            .execute()
            .await
            .with_context(|| format!("failed to execute: {}", first_line(sql)))?;
        Ok(())
    }

    /// Execute statements in order, stopping at the first failure
    pub async fn execute_all(&self, statements: &[String]) -> Result<()> {
        for sql in statements {
            self.execute(sql).await?;
        }
        Ok(())
    }

    pub async fn table_exists(&self, database: &str, table: &str) -> Result<bool> {
        let result = self
            .client
            .query("SELECT 1 FROM system.tables WHERE database = ? AND name = ? LIMIT 1")
            .bind(database)
            .bind(table)
            .fetch_optional::<u8>()
            .await
            .context("failed to check table existence")?;
        Ok(result.is_some())
    }

    pub async fn version(&self) -> Result<String> {
        self.client
            .query("SELECT version()")
            .fetch_one::<String>()
            .await
            .context("failed to get ClickHouse version")
    }
}

/// First line of a statement, shortened for error messages
pub fn first_line(sql: &str) -> String {
    let line = sql.lines().next().unwrap_or(sql);
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(77).collect::<String>())
    } else {
        line.to_string()
    }
}
