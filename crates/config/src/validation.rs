//! Configuration validation
//!
//! Validates config consistency:
//! - Dataset, table and role names are safe ClickHouse identifiers
//! - Batch size and retry count are within bounds
//! - The calendar range is ordered and the fiscal month exists

use crate::Config;
use crate::error::{ConfigError, Result};

/// Retries beyond this stop being backoff and start being an outage
const MAX_RETRIES_LIMIT: u32 = 10;

/// Earliest and latest calendar years `dim_date` may cover
pub const MIN_CALENDAR_YEAR: i32 = 1900;
pub const MAX_CALENDAR_YEAR: i32 = 2200;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_warehouse(config)?;
    validate_ingest(config)?;
    validate_dimensions(config)?;
    Ok(())
}

fn validate_warehouse(config: &Config) -> Result<()> {
    let wh = &config.warehouse;

    if wh.url.trim().is_empty() {
        return Err(ConfigError::missing_field("warehouse", "url"));
    }
    if !wh.url.starts_with("http://") && !wh.url.starts_with("https://") {
        return Err(ConfigError::invalid_value(
            "warehouse",
            "url",
            format!("'{}' must start with http:// or https://", wh.url),
        ));
    }
    if !is_valid_identifier(&wh.dataset) {
        return Err(ConfigError::invalid_value(
            "warehouse",
            "dataset",
            format!("'{}' is not a valid identifier", wh.dataset),
        ));
    }
    if wh.timeout.is_zero() {
        return Err(ConfigError::invalid_value(
            "warehouse",
            "timeout",
            "must be greater than 0",
        ));
    }
    for (field, role) in [("roles.viewer", &wh.roles.viewer), ("roles.job_runner", &wh.roles.job_runner)] {
        if !is_valid_identifier(role) {
            return Err(ConfigError::invalid_value(
                "warehouse",
                field,
                format!("'{}' is not a valid identifier", role),
            ));
        }
    }

    Ok(())
}

fn validate_ingest(config: &Config) -> Result<()> {
    let ingest = &config.ingest;

    if ingest.batch_size == 0 {
        return Err(ConfigError::invalid_value(
            "ingest",
            "batch_size",
            "must be greater than 0",
        ));
    }
    if ingest.max_retries > MAX_RETRIES_LIMIT {
        return Err(ConfigError::invalid_value(
            "ingest",
            "max_retries",
            format!("must be at most {}", MAX_RETRIES_LIMIT),
        ));
    }

    Ok(())
}

fn validate_dimensions(config: &Config) -> Result<()> {
    let dims = &config.dimensions;

    if !(1..=12).contains(&dims.fiscal_year_start_month) {
        return Err(ConfigError::invalid_value(
            "dimensions",
            "fiscal_year_start_month",
            format!("{} is not a month (1-12)", dims.fiscal_year_start_month),
        ));
    }
    for (field, year) in [("start_year", dims.start_year), ("end_year", dims.end_year)] {
        if !(MIN_CALENDAR_YEAR..=MAX_CALENDAR_YEAR).contains(&year) {
            return Err(ConfigError::invalid_value(
                "dimensions",
                field,
                format!(
                    "{} is outside {}..={}",
                    year, MIN_CALENDAR_YEAR, MAX_CALENDAR_YEAR
                ),
            ));
        }
    }
    if dims.start_year > dims.end_year {
        return Err(ConfigError::invalid_value(
            "dimensions",
            "start_year",
            format!(
                "start_year {} is after end_year {}",
                dims.start_year, dims.end_year
            ),
        ));
    }
    for (_, table) in dims.tables.all() {
        if !is_valid_identifier(table) {
            return Err(ConfigError::invalid_value(
                "dimensions",
                "tables",
                format!("'{}' is not a valid identifier", table),
            ));
        }
    }

    Ok(())
}

/// Whether `name` can be used unquoted as a ClickHouse database, table or role name
///
/// ASCII letter or underscore first, then letters, digits and underscores, at most 64 chars.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("analytics"));
        assert!(is_valid_identifier("_staging_2"));
        assert!(is_valid_identifier("dim_jobs"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("drop table"));
        assert!(!is_valid_identifier("a;b"));
        assert!(!is_valid_identifier("db.table"));
        assert!(!is_valid_identifier(&"x".repeat(65)));
    }

    #[test]
    fn test_invalid_dataset() {
        let result = Config::from_str("[warehouse]\ndataset = \"bad-name\"");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "dataset", .. })
        ));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let result = Config::from_str("[warehouse]\nurl = \"clickhouse:8123\"");
        assert!(matches!(result, Err(ConfigError::InvalidValue { field: "url", .. })));
    }

    #[test]
    fn test_empty_url() {
        let result = Config::from_str("[warehouse]\nurl = \"\"");
        assert!(matches!(result, Err(ConfigError::MissingField { field: "url", .. })));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = Config::default();
        config.warehouse.timeout = Duration::ZERO;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_max_retries_limit() {
        assert!(Config::from_str("[ingest]\nmax_retries = 10").is_ok());
        assert!(Config::from_str("[ingest]\nmax_retries = 11").is_err());
        assert!(Config::from_str("[ingest]\nmax_retries = 0").is_ok());
    }

    #[test]
    fn test_fiscal_month_bounds() {
        assert!(Config::from_str("[dimensions]\nfiscal_year_start_month = 1").is_ok());
        assert!(Config::from_str("[dimensions]\nfiscal_year_start_month = 12").is_ok());
        assert!(Config::from_str("[dimensions]\nfiscal_year_start_month = 0").is_err());
        assert!(Config::from_str("[dimensions]\nfiscal_year_start_month = 13").is_err());
    }

    #[test]
    fn test_year_range() {
        assert!(Config::from_str("[dimensions]\nstart_year = 2024\nend_year = 2024").is_ok());
        assert!(Config::from_str("[dimensions]\nstart_year = 2025\nend_year = 2024").is_err());
        assert!(Config::from_str("[dimensions]\nstart_year = 1899").is_err());
        assert!(Config::from_str("[dimensions]\nend_year = 2201").is_err());
    }

    #[test]
    fn test_invalid_table_name() {
        let result = Config::from_str("[dimensions.tables]\ndim_users = \"users; DROP\"");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "tables", .. })
        ));
    }

    #[test]
    fn test_invalid_role_name() {
        let result = Config::from_str("[warehouse.roles]\nviewer = \"read only\"");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "roles.viewer", .. })
        ));
    }
}
