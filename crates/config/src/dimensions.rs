//! Dimension and fact table configuration

use serde::Deserialize;

/// Dimension configuration
///
/// # Example
///
/// ```toml
/// [dimensions]
/// start_year = 2020
/// end_year = 2030
/// fiscal_year_start_month = 10
/// catalog_path = "configs/networks.json"
///
/// [dimensions.tables]
/// dim_jobs = "dim_jobs"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DimensionsConfig {
    /// First calendar year of `dim_date`
    /// Default: 2020
    pub start_year: i32,

    /// Last calendar year of `dim_date` (inclusive)
    /// Default: 2030
    pub end_year: i32,

    /// Month the fiscal year starts in (1-12)
    /// Default: 10 (October)
    pub fiscal_year_start_month: u32,

    /// JSON network catalog; the built-in catalog is used when unset
    pub catalog_path: Option<String>,

    /// Table names
    pub tables: TableNames,
}

impl Default for DimensionsConfig {
    fn default() -> Self {
        Self {
            start_year: 2020,
            end_year: 2030,
            fiscal_year_start_month: 10,
            catalog_path: None,
            tables: TableNames::default(),
        }
    }
}

/// Destination table names
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TableNames {
    pub dim_jobs: String,
    pub dim_banking_networks: String,
    pub dim_users: String,
    pub dim_date: String,
    pub fact_banking_transactions: String,
    pub fact_audit_logs: String,
    pub fact_job_executions: String,
    pub fact_pipeline_stages: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            dim_jobs: "dim_jobs".into(),
            dim_banking_networks: "dim_banking_networks".into(),
            dim_users: "dim_users".into(),
            dim_date: "dim_date".into(),
            fact_banking_transactions: "fact_banking_transactions".into(),
            fact_audit_logs: "fact_audit_logs".into(),
            fact_job_executions: "fact_job_executions".into(),
            fact_pipeline_stages: "fact_pipeline_stages".into(),
        }
    }
}

impl TableNames {
    /// All configured names, dimensions first
    pub fn all(&self) -> [(&'static str, &str); 8] {
        [
            ("dim_jobs", &self.dim_jobs),
            ("dim_banking_networks", &self.dim_banking_networks),
            ("dim_users", &self.dim_users),
            ("dim_date", &self.dim_date),
            ("fact_banking_transactions", &self.fact_banking_transactions),
            ("fact_audit_logs", &self.fact_audit_logs),
            ("fact_job_executions", &self.fact_job_executions),
            ("fact_pipeline_stages", &self.fact_pipeline_stages),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DimensionsConfig::default();
        assert_eq!(config.start_year, 2020);
        assert_eq!(config.end_year, 2030);
        assert_eq!(config.fiscal_year_start_month, 10);
        assert!(config.catalog_path.is_none());
        assert_eq!(config.tables.dim_date, "dim_date");
    }

    #[test]
    fn test_table_names_all() {
        let tables = TableNames::default();
        let all = tables.all();
        assert_eq!(all.len(), 8);
        assert!(all.iter().all(|(key, name)| key == name));
    }
}
