//! Dimension synchronization
//!
//! [`DimensionSynchronizer`] maintains the warehouse dimensions and appends facts:
//!
//! | Operation | Table | Style |
//! |-----------|-------|-------|
//! | `sync_banking_networks` | dim_banking_networks | full refresh from a [`NetworkCatalog`] |
//! | `upsert_job` | dim_jobs | SCD Type 2 |
//! | `upsert_user` | dim_users | update or insert |
//! | `generate_date_dimension` | dim_date | full refresh from [`Calendar`] |
//! | `record_job_execution` | fact_job_executions, fact_pipeline_stages | append |
//! | `record_audit_event` | fact_audit_logs | append |
//!
//! Domain events ([`DomainEvent`]) dispatch to the same operations through
//! [`DimensionSynchronizer::handle`].

mod calendar;
mod catalog;
mod error;
mod events;
mod job;
mod sync;

pub use calendar::{Calendar, DEFAULT_FISCAL_START_MONTH, iso_week, year_bounds};
pub use catalog::{BankingNetwork, NetworkCatalog, StaticCatalog};
pub use error::{DimensionError, Result};
pub use events::{AuditEvent, DomainEvent, UserProfile};
pub use job::{ExecutionStatus, ExecutionTrigger, Job, JobExecution, JobRetry, StageRun};
pub use sync::{DimensionSynchronizer, SyncSummary, UserUpsert};
