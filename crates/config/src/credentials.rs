//! Credential source configuration
//!
//! Credentials are looked up in the vault first (`secret_id` inside `vault_dir`),
//! then in the key file. The key file path may come from the environment
//! variable named by `key_file_env`; that variable is read once by
//! [`Config::resolve_env`](crate::Config::resolve_env).

use serde::Deserialize;

/// Default environment variable holding the key file path
pub const DEFAULT_KEY_FILE_ENV: &str = "WHSYNC_KEY_FILE";

/// Credential source configuration
///
/// # Example
///
/// ```toml
/// [credentials]
/// secret_id = "warehouse-ingest"
/// vault_dir = "/var/lib/whsync/vault"
/// key_file = "/etc/whsync/warehouse-key.json"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Secret identifier in the vault
    pub secret_id: Option<String>,

    /// Directory-backed vault (one `<secret_id>.json` per secret)
    pub vault_dir: Option<String>,

    /// Fallback key file (JSON with username/password)
    pub key_file: Option<String>,

    /// Environment variable consulted when `key_file` is unset
    /// Default: WHSYNC_KEY_FILE
    pub key_file_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            secret_id: None,
            vault_dir: None,
            key_file: None,
            key_file_env: DEFAULT_KEY_FILE_ENV.into(),
        }
    }
}

impl CredentialsConfig {
    /// Whether the vault lookup is configured at all
    pub fn has_vault(&self) -> bool {
        self.secret_id.is_some() && self.vault_dir.is_some()
    }

    /// Whether any credential source is configured
    pub fn has_any_source(&self) -> bool {
        self.has_vault() || self.key_file.is_some()
    }
}
