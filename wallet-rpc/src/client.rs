//! JSON-RPC 2.0 client for the wallet daemon
//!
//! The daemon holds one wallet open at a time; this client is stateless and
//! safe to share, provided callers serialize access per open wallet (the hub
//! does this with its wallet lease).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use mw_protocol::SignedKeyImage;

/// Timeout for daemon RPC requests. Refresh of a long-unsynced wallet can
/// legitimately take a while.
const RPC_TIMEOUT: Duration = Duration::from_secs(120);

/// Normalized gateway failure classes.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The daemon did not answer within the RPC deadline.
    #[error("wallet-rpc timed out")]
    Timeout,

    /// The daemon could not be reached at all.
    #[error("wallet-rpc unreachable: {0}")]
    Unreachable(String),

    /// The daemon answered with an application-level error.
    #[error("wallet-rpc error {code}: {message}")]
    Application { code: i64, message: String },
}

impl GatewayError {
    /// The message a peer should see; application errors surface the
    /// daemon's own text, transport classes keep the full description.
    pub fn peer_message(&self) -> String {
        match self {
            GatewayError::Application { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Unreachable(e.to_string())
        }
    }
}

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: &'static str,
    method: String,
    params: Value,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

fn take_result<T>(response: JsonRpcResponse<T>) -> Result<T, GatewayError> {
    if let Some(error) = response.error {
        return Err(GatewayError::Application {
            code: error.code,
            message: error.message,
        });
    }
    response.result.ok_or_else(|| {
        GatewayError::Unreachable("wallet-rpc response carried neither result nor error".into())
    })
}

// Daemon result shapes (only the fields the gateway consumes).

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceInfo {
    /// Total balance, atomic units.
    pub balance: u64,
    /// Spendable balance, atomic units.
    pub unlocked_balance: u64,
}

#[derive(Debug, Deserialize)]
struct HeightResult {
    height: u64,
}

#[derive(Debug, Deserialize)]
struct AddressResult {
    address: String,
}

#[derive(Debug, Deserialize)]
struct ExportOutputsResult {
    outputs_data_hex: String,
}

#[derive(Debug, Deserialize)]
struct TransferResult {
    #[serde(default)]
    unsigned_txset: String,
    #[serde(default)]
    tx_metadata: String,
    #[serde(default)]
    fee: u64,
}

/// An unsigned transfer as handed to the cold signer.
#[derive(Debug, Clone)]
pub struct UnsignedTransfer {
    pub unsigned_txset: String,
    /// Fee in atomic units.
    pub fee: u64,
}

#[derive(Debug, Deserialize)]
struct SubmitTransferResult {
    #[serde(default)]
    tx_hash_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RelayTxResult {
    tx_hash: String,
}

/// Result of importing key images into a view-only wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyImageImport {
    pub height: u64,
    /// Spent total, atomic units.
    pub spent: u64,
    /// Unspent total, atomic units.
    pub unspent: u64,
}

#[derive(Debug, Deserialize)]
struct ExportKeyImagesResult {
    #[serde(default)]
    signed_key_images: Vec<SignedKeyImage>,
}

/// A signed transfer ready for submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedTransfer {
    pub signed_txset: String,
    #[serde(default)]
    pub tx_hash_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ImportOutputsResult {
    num_imported: u64,
}

/// Keys for `create_wallet_from_keys`. `spend_key` stays `None` on the hub;
/// only a client provisioning its local signing wallet ever sets it.
#[derive(Debug, Clone)]
pub struct ViewWalletSpec {
    pub filename: String,
    pub address: String,
    pub view_key: String,
    pub spend_key: Option<String>,
    pub restore_height: u64,
}

/// The fixed daemon operation catalogue the system consumes.
#[async_trait]
pub trait WalletRpc: Send + Sync {
    async fn get_balance(&self) -> Result<BalanceInfo, GatewayError>;
    async fn get_height(&self) -> Result<u64, GatewayError>;
    async fn refresh(&self) -> Result<(), GatewayError>;
    async fn get_address(&self) -> Result<String, GatewayError>;
    async fn export_outputs(&self, all_outputs: bool) -> Result<String, GatewayError>;

    /// Create a transfer without relaying it. The `do_not_relay` flag is
    /// not a parameter: funds must never leave without an explicit signed
    /// submission.
    async fn create_unsigned_transfer(
        &self,
        destination: &str,
        amount_atomic: u64,
        priority: u8,
    ) -> Result<UnsignedTransfer, GatewayError>;

    async fn submit_signed_transfer(&self, signed_txset: &str) -> Result<Vec<String>, GatewayError>;
    async fn relay_raw(&self, tx_hex: &str) -> Result<String, GatewayError>;
    async fn import_key_images(
        &self,
        images: &[SignedKeyImage],
        offset: u64,
    ) -> Result<KeyImageImport, GatewayError>;
    async fn export_key_images(&self, all_images: bool) -> Result<Vec<SignedKeyImage>, GatewayError>;
    async fn sign_transfer(&self, unsigned_txset: &str) -> Result<SignedTransfer, GatewayError>;
    async fn import_outputs(&self, outputs_data_hex: &str) -> Result<u64, GatewayError>;
    async fn open_wallet(&self, filename: &str, password: &str) -> Result<(), GatewayError>;
    async fn create_wallet_from_keys(&self, spec: &ViewWalletSpec) -> Result<(), GatewayError>;
}

/// Shared handles to a gateway are gateways themselves.
#[async_trait]
impl<T: WalletRpc + ?Sized> WalletRpc for Arc<T> {
    async fn get_balance(&self) -> Result<BalanceInfo, GatewayError> {
        (**self).get_balance().await
    }

    async fn get_height(&self) -> Result<u64, GatewayError> {
        (**self).get_height().await
    }

    async fn refresh(&self) -> Result<(), GatewayError> {
        (**self).refresh().await
    }

    async fn get_address(&self) -> Result<String, GatewayError> {
        (**self).get_address().await
    }

    async fn export_outputs(&self, all_outputs: bool) -> Result<String, GatewayError> {
        (**self).export_outputs(all_outputs).await
    }

    async fn create_unsigned_transfer(
        &self,
        destination: &str,
        amount_atomic: u64,
        priority: u8,
    ) -> Result<UnsignedTransfer, GatewayError> {
        (**self)
            .create_unsigned_transfer(destination, amount_atomic, priority)
            .await
    }

    async fn submit_signed_transfer(&self, signed_txset: &str) -> Result<Vec<String>, GatewayError> {
        (**self).submit_signed_transfer(signed_txset).await
    }

    async fn relay_raw(&self, tx_hex: &str) -> Result<String, GatewayError> {
        (**self).relay_raw(tx_hex).await
    }

    async fn import_key_images(
        &self,
        images: &[SignedKeyImage],
        offset: u64,
    ) -> Result<KeyImageImport, GatewayError> {
        (**self).import_key_images(images, offset).await
    }

    async fn export_key_images(&self, all_images: bool) -> Result<Vec<SignedKeyImage>, GatewayError> {
        (**self).export_key_images(all_images).await
    }

    async fn sign_transfer(&self, unsigned_txset: &str) -> Result<SignedTransfer, GatewayError> {
        (**self).sign_transfer(unsigned_txset).await
    }

    async fn import_outputs(&self, outputs_data_hex: &str) -> Result<u64, GatewayError> {
        (**self).import_outputs(outputs_data_hex).await
    }

    async fn open_wallet(&self, filename: &str, password: &str) -> Result<(), GatewayError> {
        (**self).open_wallet(filename, password).await
    }

    async fn create_wallet_from_keys(&self, spec: &ViewWalletSpec) -> Result<(), GatewayError> {
        (**self).create_wallet_from_keys(spec).await
    }
}

/// Reqwest-backed gateway against a wallet daemon endpoint.
pub struct WalletRpcClient {
    http: reqwest::Client,
    url: String,
}

impl WalletRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw JSON-RPC call; the typed catalogue methods go through here.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, GatewayError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: "0",
            method: method.to_string(),
            params,
        };

        debug!(method, "wallet-rpc call");
        let response = self.http.post(&self.url).json(&request).send().await?;
        let response: JsonRpcResponse<T> = response.json().await?;
        take_result(response)
    }

    /// Probe the daemon; used by both binaries at startup.
    pub async fn check_connection(&self) -> Result<(), GatewayError> {
        let _: Value = self.call("get_version", json!({})).await?;
        Ok(())
    }
}

#[async_trait]
impl WalletRpc for WalletRpcClient {
    async fn get_balance(&self) -> Result<BalanceInfo, GatewayError> {
        self.call("get_balance", json!({})).await
    }

    async fn get_height(&self) -> Result<u64, GatewayError> {
        let result: HeightResult = self.call("get_height", json!({})).await?;
        Ok(result.height)
    }

    async fn refresh(&self) -> Result<(), GatewayError> {
        let _: Value = self.call("refresh", json!({})).await?;
        Ok(())
    }

    async fn get_address(&self) -> Result<String, GatewayError> {
        let result: AddressResult = self.call("get_address", json!({})).await?;
        Ok(result.address)
    }

    async fn export_outputs(&self, all_outputs: bool) -> Result<String, GatewayError> {
        let result: ExportOutputsResult = self
            .call("export_outputs", json!({ "all": all_outputs }))
            .await?;
        Ok(result.outputs_data_hex)
    }

    async fn create_unsigned_transfer(
        &self,
        destination: &str,
        amount_atomic: u64,
        priority: u8,
    ) -> Result<UnsignedTransfer, GatewayError> {
        let result: TransferResult = self
            .call(
                "transfer",
                json!({
                    "destinations": [{ "amount": amount_atomic, "address": destination }],
                    "priority": priority,
                    "do_not_relay": true,
                    "get_tx_metadata": true,
                }),
            )
            .await?;

        // Some daemon versions only populate tx_metadata for view-only
        // wallets; either blob is signable.
        let unsigned_txset = if result.unsigned_txset.is_empty() {
            result.tx_metadata
        } else {
            result.unsigned_txset
        };

        Ok(UnsignedTransfer {
            unsigned_txset,
            fee: result.fee,
        })
    }

    async fn submit_signed_transfer(&self, signed_txset: &str) -> Result<Vec<String>, GatewayError> {
        let result: SubmitTransferResult = self
            .call("submit_transfer", json!({ "tx_data_hex": signed_txset }))
            .await?;
        Ok(result.tx_hash_list)
    }

    async fn relay_raw(&self, tx_hex: &str) -> Result<String, GatewayError> {
        let result: RelayTxResult = self.call("relay_tx", json!({ "hex": tx_hex })).await?;
        Ok(result.tx_hash)
    }

    async fn import_key_images(
        &self,
        images: &[SignedKeyImage],
        offset: u64,
    ) -> Result<KeyImageImport, GatewayError> {
        self.call(
            "import_key_images",
            json!({ "signed_key_images": images, "offset": offset }),
        )
        .await
    }

    async fn export_key_images(&self, all_images: bool) -> Result<Vec<SignedKeyImage>, GatewayError> {
        let result: ExportKeyImagesResult = self
            .call("export_key_images", json!({ "all": all_images }))
            .await?;
        Ok(result.signed_key_images)
    }

    async fn sign_transfer(&self, unsigned_txset: &str) -> Result<SignedTransfer, GatewayError> {
        self.call("sign_transfer", json!({ "unsigned_txset": unsigned_txset }))
            .await
    }

    async fn import_outputs(&self, outputs_data_hex: &str) -> Result<u64, GatewayError> {
        let result: ImportOutputsResult = self
            .call("import_outputs", json!({ "outputs_data_hex": outputs_data_hex }))
            .await?;
        Ok(result.num_imported)
    }

    async fn open_wallet(&self, filename: &str, password: &str) -> Result<(), GatewayError> {
        let _: Value = self
            .call(
                "open_wallet",
                json!({ "filename": filename, "password": password }),
            )
            .await?;
        Ok(())
    }

    async fn create_wallet_from_keys(&self, spec: &ViewWalletSpec) -> Result<(), GatewayError> {
        let mut params = json!({
            "filename": spec.filename,
            "address": spec.address,
            "viewkey": spec.view_key,
            "password": "",
            "restore_height": spec.restore_height,
            "autosave_current": true,
        });
        if let Some(spend_key) = &spec.spend_key {
            params["spendkey"] = json!(spend_key);
        }
        let _: Value = self.call("generate_from_keys", params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_result_surfaces_application_error() {
        let response: JsonRpcResponse<Value> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"0","error":{"code":-17,"message":"No wallet file"}}"#,
        )
        .unwrap();
        match take_result(response) {
            Err(GatewayError::Application { code, message }) => {
                assert_eq!(code, -17);
                assert_eq!(message, "No wallet file");
            }
            other => panic!("expected Application error, got {:?}", other),
        }
    }

    #[test]
    fn test_take_result_unwraps_result() {
        let response: JsonRpcResponse<BalanceInfo> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"0","result":{"balance":5000000000000,"unlocked_balance":4000000000000}}"#,
        )
        .unwrap();
        let info = take_result(response).unwrap();
        assert_eq!(info.balance, 5_000_000_000_000);
        assert_eq!(info.unlocked_balance, 4_000_000_000_000);
    }

    #[test]
    fn test_take_result_empty_response_is_unreachable() {
        let response: JsonRpcResponse<Value> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"0"}"#).unwrap();
        assert!(matches!(
            take_result(response),
            Err(GatewayError::Unreachable(_))
        ));
    }

    #[test]
    fn test_peer_message_prefers_daemon_text() {
        let err = GatewayError::Application {
            code: -4,
            message: "not enough money".into(),
        };
        assert_eq!(err.peer_message(), "not enough money");
        assert_eq!(GatewayError::Timeout.peer_message(), "wallet-rpc timed out");
    }
}
