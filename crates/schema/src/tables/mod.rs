//! Typed rows for every warehouse table
//!
//! Each row struct carries its table's DDL in its doc comment and binds its
//! [`TableSchema`](crate::TableSchema) through [`TableRow`](crate::TableRow).

mod dimensions;
mod facts;

pub use dimensions::{BankingNetworkDimRow, DateDimRow, JobDimRow, UserDimRow};
pub use facts::{AuditLogRow, BankingTransactionRow, JobExecutionRow, PipelineStageRow};

use chrono::{Datelike, NaiveDate};

/// Surrogate key of a calendar day: `YYYYMMDD`
pub fn date_key(date: NaiveDate) -> u32 {
    date.year() as u32 * 10_000 + date.month() * 100 + date.day()
}
