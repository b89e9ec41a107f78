//! whsync Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use whsync_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[warehouse]\ndataset = \"ops\"").unwrap();
//! assert_eq!(config.warehouse.dataset, "ops");
//! ```
//!
//! # Example Minimal Config
//!
//! ```toml
//! [warehouse]
//! url = "http://clickhouse:8123"
//! dataset = "operations"
//!
//! [credentials]
//! secret_id = "warehouse-ingest"
//! vault_dir = "/var/lib/whsync/vault"
//! ```
//!
//! Environment is consulted exactly once, in [`Config::resolve_env`], so the rest of the
//! process only ever sees the immutable value.

mod credentials;
mod dimensions;
mod error;
mod ingest;
mod logging;
mod validation;
mod warehouse;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use credentials::{CredentialsConfig, DEFAULT_KEY_FILE_ENV};
pub use dimensions::{DimensionsConfig, TableNames};
pub use error::{ConfigError, Result};
pub use ingest::IngestConfig;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use validation::{MAX_CALENDAR_YEAR, MIN_CALENDAR_YEAR, is_valid_identifier};
pub use warehouse::{AccessRoles, WarehouseConfig};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Warehouse connection (URL, dataset, timeouts, role names)
    pub warehouse: WarehouseConfig,

    /// Where credentials come from (vault secret, key file)
    pub credentials: CredentialsConfig,

    /// Insert batching and retry behavior
    pub ingest: IngestConfig,

    /// Dimension tables, calendar range, fiscal boundary
    pub dimensions: DimensionsConfig,

    /// Logging configuration
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Checks for:
    /// - Identifiers usable as ClickHouse database/table names
    /// - Non-zero batch size and bounded retry count
    /// - A sane calendar range and fiscal start month
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Fill the key-file reference from the environment if the file didn't set one
    ///
    /// Called once at startup. Returns `self` so it chains after `from_file`.
    pub fn resolve_env(mut self) -> Self {
        if self.credentials.key_file.is_none()
            && let Ok(path) = std::env::var(&self.credentials.key_file_env)
            && !path.trim().is_empty()
        {
            self.credentials.key_file = Some(path.trim().to_string());
        }
        self
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
