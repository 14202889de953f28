//! Client configuration
//!
//! TOML file with CLI overrides. The operator id is the only field with no
//! usable default; commands refuse to run until it is set.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::correlator::DEFAULT_REQUEST_TIMEOUT;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identity presented to the hub on every request.
    pub operator_id: String,

    /// This client's identity on the mesh.
    pub peer_id: String,

    /// TCP address of the hub's mesh listener.
    pub hub_addr: String,

    /// The hub's identity on the mesh.
    pub hub_peer_id: String,

    /// JSON-RPC endpoint of the local signing wallet daemon.
    pub wallet_rpc_url: String,

    /// Deadline for one hub request, seconds.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            operator_id: String::new(),
            peer_id: "meshwallet-client".to_string(),
            hub_addr: "127.0.0.1:4871".to_string(),
            hub_peer_id: "meshwallet-hub".to_string(),
            wallet_rpc_url: "http://127.0.0.1:18083/json_rpc".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".meshwallet")
        .join("client.toml")
}

impl ClientConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = default_config_path();
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "operator_id = \"alice\"\nhub_addr = \"10.0.0.1:4871\"\n").unwrap();

        let config = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(config.operator_id, "alice");
        assert_eq!(config.hub_addr, "10.0.0.1:4871");
        assert_eq!(config.hub_peer_id, "meshwallet-hub");
        assert_eq!(config.request_timeout_secs, 300);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = ClientConfig::load(None).unwrap();
        assert_eq!(config.peer_id, "meshwallet-client");
        assert_eq!(
            config.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT.as_secs()
        );
    }
}
