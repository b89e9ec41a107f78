//! Warehouse connection configuration

use serde::Deserialize;
use std::time::Duration;

/// Warehouse connection settings
///
/// # Example
///
/// ```toml
/// [warehouse]
/// url = "http://localhost:8123"
/// dataset = "analytics"
/// timeout = "30s"
///
/// [warehouse.roles]
/// viewer = "analytics_viewer"
/// job_runner = "analytics_job_runner"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// ClickHouse HTTP URL, used when the credential blob doesn't carry one
    /// Default: http://localhost:8123
    pub url: String,

    /// Dataset (ClickHouse database) all tables live in
    /// Default: analytics
    pub dataset: String,

    /// Per-request timeout
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Roles granted by `grant_read_only_access`
    pub roles: AccessRoles,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".into(),
            dataset: "analytics".into(),
            timeout: Duration::from_secs(30),
            roles: AccessRoles::default(),
        }
    }
}

/// Role names for read-only grants
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccessRoles {
    /// Read access to every table of the dataset
    pub viewer: String,
    /// Permission to run queries against the dataset
    pub job_runner: String,
}

impl Default for AccessRoles {
    fn default() -> Self {
        Self {
            viewer: "warehouse_viewer".into(),
            job_runner: "warehouse_job_runner".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WarehouseConfig::default();
        assert_eq!(config.url, "http://localhost:8123");
        assert_eq!(config.dataset, "analytics");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.roles.viewer, "warehouse_viewer");
        assert_eq!(config.roles.job_runner, "warehouse_job_runner");
    }

    #[test]
    fn test_partial_roles_keep_defaults() {
        let config: WarehouseConfig = toml::from_str("[roles]\nviewer = \"bi_read\"").unwrap();
        assert_eq!(config.roles.viewer, "bi_read");
        assert_eq!(config.roles.job_runner, "warehouse_job_runner");
    }
}
