//! Job configuration and execution records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use whsync_schema::{JobDimRow, JobExecutionRow, PipelineStageRow, date_key};

/// Retry settings of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRetry {
    pub max_attempts: u32,
    pub backoff_seconds: u32,
}

impl Default for JobRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: 60,
        }
    }
}

/// A job's current configuration, as saved by its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub name: String,
    pub job_type: String,
    /// Cron expression; on-demand jobs have none
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub source_system: String,
    pub target_system: String,
    #[serde(default)]
    pub retry: JobRetry,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub owner: Option<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_timeout_seconds() -> u32 {
    3600
}

fn default_enabled() -> bool {
    true
}

impl Job {
    pub fn new(
        job_id: impl Into<String>,
        name: impl Into<String>,
        job_type: impl Into<String>,
        source_system: impl Into<String>,
        target_system: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            name: name.into(),
            job_type: job_type.into(),
            schedule: None,
            timezone: default_timezone(),
            source_system: source_system.into(),
            target_system: target_system.into(),
            retry: JobRetry::default(),
            timeout_seconds: default_timeout_seconds(),
            enabled: true,
            owner: None,
        }
    }

    pub fn with_schedule(mut self, cron: impl Into<String>) -> Self {
        self.schedule = Some(cron.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// New current version of this job starting at `effective_from`
    pub fn current_version(&self, effective_from: DateTime<Utc>) -> JobDimRow {
        JobDimRow {
            job_key: Uuid::new_v4(),
            job_id: self.job_id.clone(),
            job_name: self.name.clone(),
            job_type: self.job_type.clone(),
            schedule: self.schedule.clone(),
            timezone: self.timezone.clone(),
            source_system: self.source_system.clone(),
            target_system: self.target_system.clone(),
            retry_max_attempts: self.retry.max_attempts,
            retry_backoff_seconds: self.retry.backoff_seconds,
            timeout_seconds: self.timeout_seconds,
            is_enabled: self.enabled,
            owner: self.owner.clone(),
            is_current: true,
            effective_from,
            effective_to: None,
        }
    }
}

/// Terminal or running state of an execution or stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTrigger {
    Schedule,
    Manual,
    Api,
    Retry,
}

impl ExecutionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Manual => "manual",
            Self::Api => "api",
            Self::Retry => "retry",
        }
    }
}

/// One pipeline stage inside an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRun {
    pub name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub records_in: u64,
    #[serde(default)]
    pub records_out: u64,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// One run of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecution {
    pub execution_id: Uuid,
    pub job_id: String,
    pub status: ExecutionStatus,
    pub trigger: ExecutionTrigger,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub records_processed: u64,
    #[serde(default)]
    pub records_failed: u64,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Stages in execution order
    #[serde(default)]
    pub stages: Vec<StageRun>,
}

fn duration_ms(started: DateTime<Utc>, finished: Option<DateTime<Utc>>) -> Option<u64> {
    finished.and_then(|end| u64::try_from((end - started).num_milliseconds()).ok())
}

impl JobExecution {
    pub fn to_row(&self) -> JobExecutionRow {
        JobExecutionRow {
            execution_id: self.execution_id,
            job_id: self.job_id.clone(),
            status: self.status.as_str().to_string(),
            trigger: self.trigger.as_str().to_string(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: duration_ms(self.started_at, self.finished_at),
            records_processed: self.records_processed,
            records_failed: self.records_failed,
            error_message: self.error_message.clone(),
            date_key: date_key(self.started_at.date_naive()),
        }
    }

    /// Stage rows numbered from 1 in execution order
    pub fn stage_rows(&self) -> Vec<PipelineStageRow> {
        self.stages
            .iter()
            .enumerate()
            .map(|(index, stage)| PipelineStageRow {
                execution_id: self.execution_id,
                job_id: self.job_id.clone(),
                stage_name: stage.name.clone(),
                stage_order: u16::try_from(index + 1).unwrap_or(u16::MAX),
                status: stage.status.as_str().to_string(),
                started_at: stage.started_at,
                finished_at: stage.finished_at,
                duration_ms: duration_ms(stage.started_at, stage.finished_at),
                records_in: stage.records_in,
                records_out: stage.records_out,
                error_message: stage.error_message.clone(),
                date_key: date_key(stage.started_at.date_naive()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn execution() -> JobExecution {
        let started = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 0).unwrap();
        JobExecution {
            execution_id: Uuid::new_v4(),
            job_id: "nightly_ach".into(),
            status: ExecutionStatus::Succeeded,
            trigger: ExecutionTrigger::Schedule,
            started_at: started,
            finished_at: Some(started + Duration::seconds(90)),
            records_processed: 1_000,
            records_failed: 3,
            error_message: None,
            stages: vec![
                StageRun {
                    name: "extract".into(),
                    status: ExecutionStatus::Succeeded,
                    started_at: started,
                    finished_at: Some(started + Duration::seconds(30)),
                    records_in: 0,
                    records_out: 1_000,
                    error_message: None,
                },
                StageRun {
                    name: "load".into(),
                    status: ExecutionStatus::Succeeded,
                    started_at: started + Duration::seconds(61),
                    finished_at: None,
                    records_in: 1_000,
                    records_out: 997,
                    error_message: None,
                },
            ],
        }
    }

    #[test]
    fn test_execution_row() {
        let row = execution().to_row();
        assert_eq!(row.status, "succeeded");
        assert_eq!(row.trigger, "schedule");
        assert_eq!(row.duration_ms, Some(90_000));
        assert_eq!(row.date_key, 20240331);
    }

    #[test]
    fn test_stage_rows() {
        let rows = execution().stage_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stage_order, 1);
        assert_eq!(rows[1].stage_order, 2);
        assert_eq!(rows[0].duration_ms, Some(30_000));
        assert_eq!(rows[1].duration_ms, None);
        // Stage crossed midnight
        assert_eq!(rows[1].date_key, 20240401);
    }

    #[test]
    fn test_job_defaults_from_json() {
        let job: Job = serde_json::from_str(
            r#"{"job_id": "j1", "name": "J1", "job_type": "etl",
                "source_system": "postgres", "target_system": "clickhouse"}"#,
        )
        .unwrap();
        assert_eq!(job.timezone, "UTC");
        assert!(job.enabled);
        assert_eq!(job.retry, JobRetry::default());
        assert_eq!(job.timeout_seconds, 3600);
    }

    #[test]
    fn test_current_version() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let job = Job::new("j1", "J1", "etl", "s3", "clickhouse").with_schedule("0 2 * * *");
        let first = job.current_version(at);
        let second = job.current_version(at);

        assert!(first.is_current);
        assert!(first.effective_to.is_none());
        assert_eq!(first.schedule.as_deref(), Some("0 2 * * *"));
        assert_ne!(first.job_key, second.job_key);
    }
}
