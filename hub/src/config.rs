//! Hub configuration
//!
//! TOML file with CLI overrides layered on top. Every field has a default
//! so a bare `meshwallet-hub` run works against a local daemon.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// JSON-RPC endpoint of the view-only wallet daemon.
    pub wallet_rpc_url: String,

    /// Directory holding the operator registry.
    pub data_dir: PathBuf,

    /// TCP listen address for mesh peers.
    pub listen: String,

    /// This hub's identity on the mesh.
    pub peer_id: String,

    /// Serve operators without a registry binding from whatever wallet the
    /// daemon has open. Only sane when exactly one operator exists.
    pub single_tenant: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            wallet_rpc_url: "http://127.0.0.1:18082/json_rpc".to_string(),
            data_dir: default_data_dir(),
            listen: "0.0.0.0:4871".to_string(),
            peer_id: "meshwallet-hub".to_string(),
            single_tenant: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".meshwallet")
        .join("hub")
}

impl HubConfig {
    /// Load from `path` if given, from the default location if that file
    /// exists, otherwise defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = default_data_dir().join("hub.toml");
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
    fn test_defaults_when_no_config_given() {
        let config = HubConfig::default();
        assert_eq!(config.wallet_rpc_url, "http://127.0.0.1:18082/json_rpc");
        assert!(!config.single_tenant);
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_the_rest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        fs::write(&path, "single_tenant = true\nlisten = \"127.0.0.1:9000\"\n").unwrap();

        let config = HubConfig::load(Some(&path)).unwrap();
        assert!(config.single_tenant);
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.wallet_rpc_url, "http://127.0.0.1:18082/json_rpc");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        fs::write(&path, "listen = [1, 2]").unwrap();
        assert!(HubConfig::load(Some(&path)).is_err());
    }
}
