//! Domain events the synchronizer reacts to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use whsync_schema::{AuditLogRow, date_key};

use crate::job::{Job, JobExecution};

/// Mutable profile fields of a user; `None` leaves a stored value untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
}

impl UserProfile {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.department.is_none()
    }

    /// Set fields as `(column, value)` pairs
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("username", self.username.as_deref()),
            ("email", self.email.as_deref()),
            ("role", self.role.as_deref()),
            ("department", self.department.as_deref()),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, v)))
    }
}

/// A recorded audit trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub action: String,
    pub resource_type: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    /// success, failure, denied
    pub outcome: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub details: Value,
}

impl AuditEvent {
    pub fn to_row(&self) -> AuditLogRow {
        let details = match &self.details {
            Value::Null => "{}".to_string(),
            other => other.to_string(),
        };
        AuditLogRow {
            event_id: self.event_id,
            occurred_at: self.occurred_at,
            user_id: self.user_id.clone(),
            action: self.action.clone(),
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id.clone(),
            outcome: self.outcome.clone(),
            ip_address: self.ip_address.clone(),
            details,
            date_key: date_key(self.occurred_at.date_naive()),
        }
    }
}

/// Something happened in the platform that the warehouse should reflect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A job's configuration was created or changed
    JobSaved { job: Job },
    /// A user signed in or their profile changed
    UserSeen {
        user_id: String,
        #[serde(default)]
        profile: UserProfile,
    },
    /// The authoritative network list changed
    NetworkCatalogUpdated,
    /// A job run finished (or was recorded while running)
    JobExecuted { execution: JobExecution },
    AuditRecorded { event: AuditEvent },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobSaved { .. } => "job_saved",
            Self::UserSeen { .. } => "user_seen",
            Self::NetworkCatalogUpdated => "network_catalog_updated",
            Self::JobExecuted { .. } => "job_executed",
            Self::AuditRecorded { .. } => "audit_recorded",
        }
    }
}
