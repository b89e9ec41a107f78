//! Banking network catalog
//!
//! The authoritative list of payment networks that dim_banking_networks mirrors.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use whsync_schema::BankingNetworkDimRow;

use crate::error::{DimensionError, Result};

/// One payment network and what it supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankingNetwork {
    pub id: String,
    pub name: String,
    /// ach, wire, realtime, card, messaging
    pub network_type: String,
    pub category: String,
    #[serde(default)]
    pub supports_realtime: bool,
    #[serde(default)]
    pub supports_batch: bool,
    #[serde(default)]
    pub supports_webhooks: bool,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub auth_methods: Vec<String>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
}

impl BankingNetwork {
    /// Snapshot as a dimension row stamped with `updated_at`
    pub fn to_dim_row(&self, updated_at: DateTime<Utc>) -> BankingNetworkDimRow {
        BankingNetworkDimRow {
            network_id: self.id.clone(),
            network_name: self.name.clone(),
            network_type: self.network_type.clone(),
            category: self.category.clone(),
            supports_realtime: self.supports_realtime,
            supports_batch: self.supports_batch,
            supports_webhooks: self.supports_webhooks,
            protocols: self.protocols.clone(),
            auth_methods: self.auth_methods.clone(),
            api_endpoint: self.api_endpoint.clone(),
            updated_at,
        }
    }
}

/// Source of the current network list
#[async_trait]
pub trait NetworkCatalog: Send + Sync {
    async fn networks(&self) -> Result<Vec<BankingNetwork>>;
}

/// Fixed network list, from code or a JSON file
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    networks: Vec<BankingNetwork>,
}

impl StaticCatalog {
    pub fn new(networks: Vec<BankingNetwork>) -> Self {
        Self { networks }
    }

    /// Load a JSON array of networks
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DimensionError::Catalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
            .map_err(|e| DimensionError::Catalog(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, String> {
        let networks: Vec<BankingNetwork> =
            serde_json::from_str(json).map_err(|e| e.to_string())?;

        let mut seen = std::collections::HashSet::new();
        for network in &networks {
            if network.id.is_empty() {
                return Err("network with empty id".to_string());
            }
            if !seen.insert(network.id.as_str()) {
                return Err(format!("duplicate network id '{}'", network.id));
            }
        }
        Ok(Self { networks })
    }

    /// Networks shipped with the engine
    pub fn builtin() -> Self {
        Self::new(builtin_networks())
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[async_trait]
impl NetworkCatalog for StaticCatalog {
    async fn networks(&self) -> Result<Vec<BankingNetwork>> {
        Ok(self.networks.clone())
    }
}

#[allow(clippy::too_many_arguments)]
fn network(
    id: &str,
    name: &str,
    network_type: &str,
    category: &str,
    capabilities: (bool, bool, bool),
    protocols: &[&str],
    auth_methods: &[&str],
    api_endpoint: Option<&str>,
) -> BankingNetwork {
    let (supports_realtime, supports_batch, supports_webhooks) = capabilities;
    BankingNetwork {
        id: id.to_string(),
        name: name.to_string(),
        network_type: network_type.to_string(),
        category: category.to_string(),
        supports_realtime,
        supports_batch,
        supports_webhooks,
        protocols: protocols.iter().map(|p| p.to_string()).collect(),
        auth_methods: auth_methods.iter().map(|a| a.to_string()).collect(),
        api_endpoint: api_endpoint.map(str::to_string),
    }
}

fn builtin_networks() -> Vec<BankingNetwork> {
    vec![
        network(
            "ach",
            "ACH Network",
            "ach",
            "domestic_clearing",
            (false, true, false),
            &["NACHA"],
            &["sftp_key", "mtls"],
            None,
        ),
        network(
            "fedwire",
            "Fedwire Funds Service",
            "wire",
            "domestic_clearing",
            (true, false, false),
            &["ISO20022", "FAIM"],
            &["mtls", "fedline_token"],
            None,
        ),
        network(
            "fednow",
            "FedNow Service",
            "realtime",
            "instant_payments",
            (true, false, true),
            &["ISO20022"],
            &["mtls"],
            Some("https://fednow.frb.org/api"),
        ),
        network(
            "rtp",
            "RTP Network",
            "realtime",
            "instant_payments",
            (true, false, true),
            &["ISO20022"],
            &["mtls", "oauth2"],
            Some("https://api.theclearinghouse.org/rtp"),
        ),
        network(
            "swift",
            "SWIFT",
            "messaging",
            "cross_border",
            (false, true, false),
            &["MT", "ISO20022"],
            &["pki", "hsm"],
            None,
        ),
        network(
            "sepa",
            "SEPA Credit Transfer",
            "ach",
            "cross_border",
            (false, true, false),
            &["ISO20022"],
            &["mtls", "pki"],
            None,
        ),
        network(
            "visa",
            "Visa",
            "card",
            "card_network",
            (true, true, true),
            &["ISO8583", "REST"],
            &["api_key", "mtls"],
            Some("https://api.visa.com"),
        ),
        network(
            "mastercard",
            "Mastercard",
            "card",
            "card_network",
            (true, true, true),
            &["ISO8583", "REST"],
            &["oauth1", "mtls"],
            Some("https://api.mastercard.com"),
        ),
    ]
}
