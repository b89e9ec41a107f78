//! Warehouse credential resolution
//!
//! The vault is consulted first; when it has no usable secret the key file is read.
//! Having neither is a configuration error.

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use whsync_config::CredentialsConfig;

use crate::error::{IngestError, Result};

/// Username/password for the warehouse, optionally with its URL
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Overrides the configured warehouse URL
    #[serde(default)]
    pub url: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("url", &self.url)
            .finish()
    }
}

impl Credentials {
    fn from_blob(blob: Value, origin: &str) -> Result<Self> {
        serde_json::from_value(blob).map_err(|e| {
            IngestError::Configuration(format!("{} does not hold valid credentials: {}", origin, e))
        })
    }
}

/// Secret vault
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret blob; `Ok(None)` when it doesn't exist
    async fn retrieve(&self, secret_id: &str) -> Result<Option<Value>>;
}

/// Vault backed by a directory of `<secret_id>.json` files
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn retrieve(&self, secret_id: &str) -> Result<Option<Value>> {
        if secret_id.is_empty()
            || secret_id.contains(['/', '\\'])
            || secret_id.starts_with('.')
        {
            return Err(IngestError::Configuration(format!(
                "invalid secret id '{}'",
                secret_id
            )));
        }

        let path = self.dir.join(format!("{}.json", secret_id));
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IngestError::Configuration(format!(
                    "failed to read secret {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&contents).map(Some).map_err(|e| {
            IngestError::Configuration(format!("secret {} is not JSON: {}", secret_id, e))
        })
    }
}

/// In-memory vault
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, Value>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, secret_id: impl Into<String>, blob: Value) -> Self {
        self.secrets.insert(secret_id.into(), blob);
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn retrieve(&self, secret_id: &str) -> Result<Option<Value>> {
        Ok(self.secrets.get(secret_id).cloned())
    }
}

/// Resolves credentials from the vault, falling back to a key file
#[derive(Clone, Default)]
pub struct CredentialResolver {
    vault: Option<(Arc<dyn SecretStore>, String)>,
    key_file: Option<PathBuf>,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("secret_id", &self.vault.as_ref().map(|(_, id)| id))
            .field("key_file", &self.key_file)
            .finish()
    }
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vault(mut self, store: Arc<dyn SecretStore>, secret_id: impl Into<String>) -> Self {
        self.vault = Some((store, secret_id.into()));
        self
    }

    pub fn with_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Build from the `[credentials]` section (after `Config::resolve_env`)
    pub fn from_config(config: &CredentialsConfig) -> Self {
        let mut resolver = Self::new();
        if let (Some(secret_id), Some(dir)) = (&config.secret_id, &config.vault_dir) {
            resolver = resolver.with_vault(Arc::new(FileSecretStore::new(dir)), secret_id.clone());
        }
        if let Some(path) = &config.key_file {
            resolver = resolver.with_key_file(path);
        }
        resolver
    }

    pub fn has_source(&self) -> bool {
        self.vault.is_some() || self.key_file.is_some()
    }

    /// Produce usable credentials or fail with a configuration error
    pub async fn resolve(&self) -> Result<Credentials> {
        if let Some((store, secret_id)) = &self.vault {
            match store.retrieve(secret_id).await {
                Ok(Some(blob)) => {
                    debug!(secret_id = %secret_id, "credentials resolved from vault");
                    return Credentials::from_blob(blob, &format!("secret {}", secret_id));
                }
                Ok(None) => {
                    debug!(secret_id = %secret_id, "secret not in vault, trying key file");
                }
                Err(e) => {
                    warn!(secret_id = %secret_id, error = %e, "vault lookup failed, trying key file");
                }
            }
        }

        if let Some(path) = &self.key_file {
            let credentials = read_key_file(path).await?;
            debug!(path = %path.display(), "credentials resolved from key file");
            return Ok(credentials);
        }

        Err(IngestError::Configuration(
            "no warehouse credentials: vault has no secret and no key file is configured"
                .to_string(),
        ))
    }
}

async fn read_key_file(path: &Path) -> Result<Credentials> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        IngestError::Configuration(format!("failed to read key file {}: {}", path.display(), e))
    })?;
    let blob: Value = serde_json::from_str(&contents).map_err(|e| {
        IngestError::Configuration(format!("key file {} is not JSON: {}", path.display(), e))
    })?;
    Credentials::from_blob(blob, &format!("key file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn blob(user: &str) -> Value {
        json!({"username": user, "password": "pw"})
    }

    #[tokio::test]
    async fn test_vault_wins_over_key_file() {
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        write!(key_file, "{}", blob("from_file")).unwrap();

        let resolver = CredentialResolver::new()
            .with_vault(
                Arc::new(StaticSecretStore::new().with_secret("ingest", blob("from_vault"))),
                "ingest",
            )
            .with_key_file(key_file.path());

        assert_eq!(resolver.resolve().await.unwrap().username, "from_vault");
    }

    #[tokio::test]
    async fn test_falls_back_to_key_file() {
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        write!(
            key_file,
            "{}",
            json!({"username": "svc", "password": "pw", "url": "https://ch.internal:8443"})
        )
        .unwrap();

        let resolver = CredentialResolver::new()
            .with_vault(Arc::new(StaticSecretStore::new()), "missing")
            .with_key_file(key_file.path());

        let creds = resolver.resolve().await.unwrap();
        assert_eq!(creds.username, "svc");
        assert_eq!(creds.url.as_deref(), Some("https://ch.internal:8443"));
    }

    #[tokio::test]
    async fn test_no_source_is_configuration_error() {
        let err = CredentialResolver::new().resolve().await.unwrap_err();
        assert!(err.is_configuration());

        let err = CredentialResolver::new()
            .with_vault(Arc::new(StaticSecretStore::new()), "missing")
            .resolve()
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_malformed_secret() {
        let resolver = CredentialResolver::new().with_vault(
            Arc::new(StaticSecretStore::new().with_secret("ingest", json!({"user": "x"}))),
            "ingest",
        );
        assert!(resolver.resolve().await.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_file_secret_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ingest.json"), blob("svc").to_string()).unwrap();
        let store = FileSecretStore::new(dir.path());

        assert!(store.retrieve("ingest").await.unwrap().is_some());
        assert!(store.retrieve("other").await.unwrap().is_none());
        assert!(store.retrieve("../etc/passwd").await.is_err());
    }

    #[test]
    fn test_from_config() {
        let config = CredentialsConfig {
            secret_id: Some("ingest".into()),
            vault_dir: Some("/var/lib/whsync/vault".into()),
            key_file: None,
            key_file_env: "UNUSED".into(),
        };
        let resolver = CredentialResolver::from_config(&config);
        assert!(resolver.has_source());
        assert!(!CredentialResolver::from_config(&CredentialsConfig::default()).has_source());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials {
            username: "svc".into(),
            password: "hunter2".into(),
            url: None,
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
