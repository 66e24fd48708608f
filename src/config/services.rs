use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use crate::error::user_error;

/// Service registry keyed by the short name steps refer to. A BTreeMap
/// keeps channel creation order deterministic.
pub type Services = BTreeMap<String, Service>;

/// One backend service under test.
#[derive(Debug, Clone, Deserialize)]
pub struct Service {
    /// host:port the channel connects to.
    pub address: String,
    /// Declared proto service name, package included (e.g. `shop.v1.Cart`).
    pub service: String,
    pub tls: Option<TlsSettings>,
    /// Default metadata attached to every call; values are materialized by
    /// the variable environment once, before the first step runs.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsSettings {
    /// CA bundle used to verify the server.
    pub cert_file: Option<PathBuf>,
    /// Client certificate and key for mutual auth.
    pub cert_config: Option<CertConfig>,
    /// SNI / authority override.
    pub server_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

pub fn load_services(configs: &Path) -> Result<Services> {
    let path = configs.join("services.yaml");
    let content = std::fs::read_to_string(&path)
        .map_err(|err| user_error(format!("error reading {}: {err}", path.display())))?;

    serde_yaml::from_str(&content)
        .map_err(|err| user_error(format!("error parsing {}: {err}", path.display())))
}
