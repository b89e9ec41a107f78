//! Command implementations for the whsync CLI

pub mod apply;
pub mod grant;
pub mod init;
pub mod insert;
pub mod load;
pub mod query;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use whsync_config::Config;
use whsync_dimensions::{DimensionSynchronizer, NetworkCatalog, StaticCatalog};
use whsync_ingest::{ClickHouseConnector, CredentialResolver, IngestClient, IngestSettings};

/// Client that connects to the configured warehouse on first use
pub fn ingest_client(config: &Config) -> Result<Arc<IngestClient>> {
    let resolver = CredentialResolver::from_config(&config.credentials);
    if !resolver.has_source() {
        anyhow::bail!(
            "no credential source configured: set [credentials] secret_id and vault_dir, \
             key_file, or the {} environment variable",
            config.credentials.key_file_env
        );
    }

    Ok(Arc::new(IngestClient::new(
        IngestSettings::from_config(config),
        resolver,
        Arc::new(ClickHouseConnector::from_config(&config.warehouse)),
    )))
}

/// Synchronizer over the configured catalog and calendar
pub fn synchronizer(config: &Config) -> Result<DimensionSynchronizer> {
    let catalog: Arc<dyn NetworkCatalog> = match &config.dimensions.catalog_path {
        Some(path) => {
            let catalog = StaticCatalog::from_json_file(path)
                .with_context(|| format!("failed to load network catalog {}", path))?;
            info!(path = %path, networks = catalog.len(), "network catalog loaded");
            Arc::new(catalog)
        }
        None => Arc::new(StaticCatalog::builtin()),
    };

    DimensionSynchronizer::new(ingest_client(config)?, catalog, &config.dimensions)
        .context("invalid dimension settings")
}

/// Log what the client did over the run
pub fn log_metrics(client: &IngestClient) {
    let m = client.metrics().snapshot();
    info!(
        rows_inserted = m.rows_inserted,
        rows_failed = m.rows_failed,
        chunks_sent = m.chunks_sent,
        chunks_failed = m.chunks_failed,
        retries = m.retries,
        validation_rejections = m.validation_rejections,
        partial_failures = m.partial_failures,
        loads = m.loads,
        grants = m.grants,
        "ingest summary"
    );
}
