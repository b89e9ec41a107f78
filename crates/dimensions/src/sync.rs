//! Dimension synchronizer
//!
//! Turns configuration and domain objects into warehouse rows and hands them to the
//! [`IngestClient`]. Three refresh styles:
//!
//! - **Full refresh** (networks, dates): truncate then reinsert. Readers can observe
//!   an empty table between the two steps.
//! - **SCD Type 2** (jobs): expire the current version, insert a new one.
//! - **In-place upsert** (users): update when present, insert otherwise.
//!
//! Check-then-write sequences are serialized per key inside this process only.
//! Deployments must keep a single writer per job, per user, and per refreshed table.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use whsync_config::{DimensionsConfig, TableNames};
use whsync_ingest::{IngestClient, InsertResult, KeyedLocks};
use whsync_schema::{BankingTransactionRow, JobDimRow, UserDimRow, timestamp};
use whsync_warehouse::{Filter, Mutation, Row, Select};

use crate::calendar::Calendar;
use crate::catalog::NetworkCatalog;
use crate::error::{DimensionError, Result};
use crate::events::{AuditEvent, DomainEvent, UserProfile};
use crate::job::{Job, JobExecution};

/// What `upsert_user` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserUpsert {
    Inserted,
    Updated,
}

/// Row counts written by `sync_all`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub networks: usize,
    pub dates: usize,
}

/// Keeps the dimension tables in step with the platform's configuration
pub struct DimensionSynchronizer {
    client: Arc<IngestClient>,
    catalog: Arc<dyn NetworkCatalog>,
    calendar: Calendar,
    tables: TableNames,
    start_year: i32,
    end_year: i32,
    locks: KeyedLocks,
}

impl std::fmt::Debug for DimensionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DimensionSynchronizer")
            .field("calendar", &self.calendar)
            .field("tables", &self.tables)
            .field("years", &(self.start_year..=self.end_year))
            .finish()
    }
}

impl DimensionSynchronizer {
    pub fn new(
        client: Arc<IngestClient>,
        catalog: Arc<dyn NetworkCatalog>,
        config: &DimensionsConfig,
    ) -> Result<Self> {
        Ok(Self {
            client,
            catalog,
            calendar: Calendar::new(config.fiscal_year_start_month)?,
            tables: config.tables.clone(),
            start_year: config.start_year,
            end_year: config.end_year,
            locks: KeyedLocks::new(),
        })
    }

    pub fn client(&self) -> &IngestClient {
        &self.client
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    // =========================================================================
    // Full refresh
    // =========================================================================

    /// Replace dim_banking_networks with the current catalog
    pub async fn sync_banking_networks(&self) -> Result<usize> {
        let table = self.tables.dim_banking_networks.as_str();
        let networks = self.catalog.networks().await?;
        let updated_at = Utc::now();
        let rows: Vec<_> = networks.iter().map(|n| n.to_dim_row(updated_at)).collect();

        let _guard = self.locks.lock(&format!("refresh:{}", table)).await;
        self.truncate(table).await?;
        let result = self.client.insert_records(table, &rows).await?;
        ensure_complete(table, result)?;

        info!(table = %table, networks = result.inserted, "banking networks refreshed");
        Ok(result.inserted)
    }

    /// Replace dim_date with one row per day of `start_year..=end_year`
    ///
    /// The range is checked before the table is touched.
    pub async fn generate_date_dimension(&self, start_year: i32, end_year: i32) -> Result<usize> {
        let table = self.tables.dim_date.as_str();
        let rows = self.calendar.days(start_year, end_year)?;

        let _guard = self.locks.lock(&format!("refresh:{}", table)).await;
        self.truncate(table).await?;
        let result = self.client.insert_records(table, &rows).await?;
        ensure_complete(table, result)?;

        info!(
            table = %table,
            start_year,
            end_year,
            days = result.inserted,
            "date dimension generated"
        );
        Ok(result.inserted)
    }

    /// Networks, then dates over the configured years; the first failure stops the run
    pub async fn sync_all(&self) -> Result<SyncSummary> {
        let networks = self.sync_banking_networks().await?;
        let dates = self
            .generate_date_dimension(self.start_year, self.end_year)
            .await?;
        Ok(SyncSummary { networks, dates })
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        debug!(table = %table, "truncating for full refresh");
        self.client
            .mutate(&Mutation::Truncate {
                table: table.to_string(),
            })
            .await?;
        Ok(())
    }

    // =========================================================================
    // Jobs (SCD Type 2)
    // =========================================================================

    /// Record a job's configuration as its new current version
    ///
    /// The previous current version (if any) gets `is_current = false` and
    /// `effective_to` set to the new version's `effective_from`.
    pub async fn upsert_job(&self, job: &Job) -> Result<JobDimRow> {
        if job.job_id.is_empty() {
            return Err(DimensionError::InvalidInput("job_id is empty".to_string()));
        }
        let table = self.tables.dim_jobs.as_str();
        let _guard = self.locks.lock(&format!("job:{}", job.job_id)).await;

        let now = Utc::now();
        let mut set = Row::new();
        set.insert("is_current".into(), Value::Bool(false));
        set.insert("effective_to".into(), Value::String(timestamp::format(&now)));
        self.client
            .mutate(&Mutation::Update {
                table: table.to_string(),
                set,
                filter: Filter::eq("job_id", job.job_id.as_str()).and("is_current", true),
            })
            .await?;

        let version = job.current_version(now);
        let result = self
            .client
            .insert_records(table, std::slice::from_ref(&version))
            .await?;
        if !result.is_complete() {
            warn!(
                job_id = %job.job_id,
                "previous version expired but new version was not written"
            );
        }
        ensure_complete(table, result)?;

        info!(job_id = %job.job_id, job_key = %version.job_key, "job version recorded");
        Ok(version)
    }

    /// The current version of a job
    pub async fn current_job(&self, job_id: &str) -> Result<Option<JobDimRow>> {
        let select = Select::from(self.tables.dim_jobs.as_str())
            .filter(Filter::eq("job_id", job_id).and("is_current", true))
            .limit(1);
        Ok(self.read::<JobDimRow>(&select).await?.into_iter().next())
    }

    /// Every version of a job, oldest first
    pub async fn job_history(&self, job_id: &str) -> Result<Vec<JobDimRow>> {
        let select = Select::from(self.tables.dim_jobs.as_str())
            .filter(Filter::eq("job_id", job_id))
            .order_by("effective_from");
        self.read(&select).await
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Update a known user's profile and last login, or insert a new active user
    ///
    /// Only fields set in `profile` are changed on an existing row.
    pub async fn upsert_user(&self, user_id: &str, profile: &UserProfile) -> Result<UserUpsert> {
        if user_id.is_empty() {
            return Err(DimensionError::InvalidInput("user_id is empty".to_string()));
        }
        let table = self.tables.dim_users.as_str();
        let _guard = self.locks.lock(&format!("user:{}", user_id)).await;

        let existing = self
            .client
            .select(
                &Select::from(table)
                    .columns(["user_id"])
                    .filter(Filter::eq("user_id", user_id))
                    .limit(1),
            )
            .await?;
        let now = Utc::now();

        if !existing.is_empty() {
            let stamp = Value::String(timestamp::format(&now));
            let mut set = Row::new();
            for (column, value) in profile.fields() {
                set.insert(column.into(), Value::String(value.to_string()));
            }
            set.insert("last_login_at".into(), stamp.clone());
            set.insert("updated_at".into(), stamp);

            self.client
                .mutate(&Mutation::Update {
                    table: table.to_string(),
                    set,
                    filter: Filter::eq("user_id", user_id),
                })
                .await?;
            debug!(user_id = %user_id, "user updated");
            return Ok(UserUpsert::Updated);
        }

        let row = UserDimRow {
            user_id: user_id.to_string(),
            username: profile.username.clone(),
            email: profile.email.clone(),
            role: profile.role.clone(),
            department: profile.department.clone(),
            is_active: true,
            created_at: now,
            last_login_at: Some(now),
            updated_at: now,
        };
        let result = self
            .client
            .insert_records(table, std::slice::from_ref(&row))
            .await?;
        ensure_complete(table, result)?;
        info!(user_id = %user_id, "user added");
        Ok(UserUpsert::Inserted)
    }

    // =========================================================================
    // Facts
    // =========================================================================

    /// Append an execution and its stages
    pub async fn record_job_execution(&self, execution: &JobExecution) -> Result<()> {
        let table = self.tables.fact_job_executions.as_str();
        let result = self
            .client
            .insert_records(table, &[execution.to_row()])
            .await?;
        ensure_complete(table, result)?;

        let stages = execution.stage_rows();
        if !stages.is_empty() {
            let table = self.tables.fact_pipeline_stages.as_str();
            let result = self.client.insert_records(table, &stages).await?;
            ensure_complete(table, result)?;
        }

        debug!(
            job_id = %execution.job_id,
            execution_id = %execution.execution_id,
            stages = stages.len(),
            "job execution recorded"
        );
        Ok(())
    }

    pub async fn record_audit_event(&self, event: &AuditEvent) -> Result<()> {
        let table = self.tables.fact_audit_logs.as_str();
        let result = self.client.insert_records(table, &[event.to_row()]).await?;
        ensure_complete(table, result)
    }

    /// Append settled or in-flight transactions; partial failures are reported, not raised
    pub async fn record_banking_transactions(
        &self,
        transactions: &[BankingTransactionRow],
    ) -> Result<InsertResult> {
        let table = self.tables.fact_banking_transactions.as_str();
        let result = self.client.insert_records(table, transactions).await?;
        if !result.is_complete() {
            warn!(
                table = %table,
                inserted = result.inserted,
                failed = result.failed,
                "some transactions were not recorded"
            );
        }
        Ok(result)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Apply a domain event to the warehouse
    pub async fn handle(&self, event: &DomainEvent) -> Result<()> {
        debug!(event = event.kind(), "handling domain event");
        match event {
            DomainEvent::JobSaved { job } => self.upsert_job(job).await.map(|_| ()),
            DomainEvent::UserSeen { user_id, profile } => {
                self.upsert_user(user_id, profile).await.map(|_| ())
            }
            DomainEvent::NetworkCatalogUpdated => self.sync_banking_networks().await.map(|_| ()),
            DomainEvent::JobExecuted { execution } => self.record_job_execution(execution).await,
            DomainEvent::AuditRecorded { event } => self.record_audit_event(event).await,
        }
    }

    async fn read<T: DeserializeOwned>(&self, select: &Select) -> Result<Vec<T>> {
        self.client
            .select(select)
            .await?
            .into_iter()
            .map(|row| {
                serde_json::from_value(Value::Object(row)).map_err(|e| DimensionError::Corrupt {
                    table: select.table.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

fn ensure_complete(table: &str, result: InsertResult) -> Result<()> {
    if result.is_complete() {
        return Ok(());
    }
    Err(DimensionError::Incomplete {
        table: table.to_string(),
        inserted: result.inserted,
        failed: result.failed + result.skipped,
    })
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;
