//! Open-wallet lease
//!
//! The daemon holds exactly one wallet open at a time, so every request that
//! touches wallet state must hold the lease from wallet selection through
//! the last RPC of the request. Sessions for different operators share one
//! lease per daemon; acquiring it serializes wallet switches.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use mw_wallet_rpc::{GatewayError, WalletRpc};

struct LeaseInner<G> {
    gateway: G,
    /// Name of the wallet currently open on the daemon, once known.
    open_wallet: Option<String>,
}

/// Shared handle to the daemon plus the name of its open wallet.
pub struct WalletLease<G> {
    inner: Arc<Mutex<LeaseInner<G>>>,
}

impl<G> Clone for WalletLease<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: WalletRpc> WalletLease<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LeaseInner {
                gateway,
                open_wallet: None,
            })),
        }
    }

    /// Take exclusive use of the daemon for the duration of one request.
    pub async fn acquire(&self) -> LeaseGuard<G> {
        LeaseGuard {
            inner: Arc::clone(&self.inner).lock_owned().await,
        }
    }
}

/// Exclusive access to the daemon while a request runs.
pub struct LeaseGuard<G> {
    inner: OwnedMutexGuard<LeaseInner<G>>,
}

impl<G: WalletRpc> LeaseGuard<G> {
    pub fn gateway(&self) -> &G {
        &self.inner.gateway
    }

    pub fn open_wallet_name(&self) -> Option<&str> {
        self.inner.open_wallet.as_deref()
    }

    /// Switch the daemon to `wallet_name` unless it is already open.
    pub async fn ensure_open(&mut self, wallet_name: &str) -> Result<(), GatewayError> {
        if self.inner.open_wallet.as_deref() == Some(wallet_name) {
            return Ok(());
        }
        info!(wallet = wallet_name, "switching open wallet");
        self.inner.gateway.open_wallet(wallet_name, "").await?;
        self.inner.open_wallet = Some(wallet_name.to_string());
        Ok(())
    }

    /// Record that the daemon opened `wallet_name` as a side effect of
    /// another call (wallet creation leaves the new wallet open).
    pub fn note_open(&mut self, wallet_name: &str) {
        self.inner.open_wallet = Some(wallet_name.to_string());
    }
}
