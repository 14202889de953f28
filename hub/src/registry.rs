//! Durable operator → wallet registry
//!
//! One JSON file maps each operator id to the view-only wallet provisioned
//! for it. The file is re-read on every lookup and rewritten whole on every
//! bind, so hub restarts and concurrent sessions always see current state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

const REGISTRY_FILE: &str = "operator_wallets.json";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry io: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// The wallet provisioned for one operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBinding {
    pub wallet_name: String,
    pub address: String,
    /// Unix seconds at provisioning time.
    pub created_at: u64,
}

/// File-backed operator registry. The internal mutex serializes the
/// read-modify-write cycle when several sessions provision at once.
pub struct OperatorRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl OperatorRegistry {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(REGISTRY_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, WalletBinding>, RegistryError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    /// Look up the wallet bound to an operator, reading current file state.
    pub fn lookup(&self, operator_id: &str) -> Result<Option<WalletBinding>, RegistryError> {
        Ok(self.read_all()?.remove(operator_id))
    }

    /// Bind an operator to a wallet, replacing any previous binding.
    pub fn bind(&self, operator_id: &str, binding: WalletBinding) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut all = self.read_all()?;
        all.insert(operator_id.to_string(), binding);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&all)?)?;
        Ok(())
    }

    /// Number of operators with a provisioned wallet.
    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.read_all()?.len())
    }
}
