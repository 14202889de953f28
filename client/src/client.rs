//! Hub-facing client facade
//!
//! Pairs the request correlator with the local signing wallet's gateway.
//! Remote calls go to the hub as typed requests; local calls talk to the
//! offline daemon that holds the spend key. The transaction workflow in
//! [`crate::workflow`] composes both sides.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use mw_protocol::{
    BalanceRequest, CreateTxRequest, ExportOutputsRequest, ImportKeyImagesRequest, Message,
    MessageKind, ProvisionWalletRequest, SignedKeyImage, SubmitTxRequest,
};
use mw_wallet_rpc::units::AmountError;
use mw_wallet_rpc::{GatewayError, SignedTransfer, WalletRpc};

use crate::correlator::{Correlator, RequestError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The hub did not answer within the request deadline.
    #[error("Request timed out")]
    Timeout,

    /// The hub answered with a failure.
    #[error("{0}")]
    Hub(String),

    /// The hub answered with a kind that does not match the request.
    #[error("unexpected response kind: {0}")]
    UnexpectedResponse(MessageKind),

    #[error("transport: {0}")]
    Transport(String),

    /// The local signing daemon failed.
    #[error("local wallet: {0}")]
    LocalWallet(String),

    #[error(transparent)]
    Amount(#[from] AmountError),
}

impl From<RequestError> for ClientError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Timeout => ClientError::Timeout,
            RequestError::Transport(t) => ClientError::Transport(t.to_string()),
            RequestError::Codec(c) => ClientError::Transport(c.to_string()),
        }
    }
}

impl From<GatewayError> for ClientError {
    fn from(e: GatewayError) -> Self {
        ClientError::LocalWallet(e.to_string())
    }
}

fn hub_failure(error: Option<String>) -> ClientError {
    ClientError::Hub(error.unwrap_or_else(|| "hub reported failure without detail".to_string()))
}

/// Hub-reported wallet state, display units.
#[derive(Debug, Clone)]
pub struct HubBalance {
    pub balance: f64,
    pub unlocked_balance: f64,
    pub block_height: u64,
}

/// Unsigned transfer handed back by the hub, display units.
#[derive(Debug, Clone)]
pub struct HubUnsignedTx {
    pub unsigned_txset: String,
    pub fee: f64,
    pub amount: f64,
}

/// Outcome of pushing local key images to the hub's view wallet.
#[derive(Debug, Clone)]
pub struct KeyImageSyncReport {
    pub height: u64,
    /// Spent total, atomic units.
    pub spent: u64,
    /// Unspent total, atomic units.
    pub unspent: u64,
}

pub struct MeshClient<L: WalletRpc> {
    correlator: Arc<Correlator>,
    local: L,
    operator_id: String,
    request_timeout: Duration,
}

impl<L: WalletRpc> MeshClient<L> {
    pub fn new(
        correlator: Arc<Correlator>,
        local: L,
        operator_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            correlator,
            local,
            operator_id: operator_id.into(),
            request_timeout,
        }
    }

    pub fn operator_id(&self) -> &str {
        &self.operator_id
    }

    async fn request(&self, msg: Message) -> Result<Message, ClientError> {
        Ok(self.correlator.send_request(msg, self.request_timeout).await?)
    }

    // Remote operations (through the hub)

    pub async fn get_balance(&self) -> Result<HubBalance, ClientError> {
        let request = Message::BalanceRequest(BalanceRequest::new(&self.operator_id));
        match self.request(request).await? {
            Message::BalanceResponse(r) if r.success => Ok(HubBalance {
                balance: r.balance,
                unlocked_balance: r.unlocked_balance,
                block_height: r.block_height,
            }),
            Message::BalanceResponse(r) => Err(hub_failure(r.error)),
            Message::Error(e) => Err(ClientError::Hub(e.error)),
            other => Err(ClientError::UnexpectedResponse(other.kind())),
        }
    }

    pub async fn provision_wallet(
        &self,
        view_key: &str,
        address: &str,
        restore_height: u64,
    ) -> Result<String, ClientError> {
        let request = Message::ProvisionWalletRequest(ProvisionWalletRequest::new(
            &self.operator_id,
            view_key,
            address,
            restore_height,
        ));
        match self.request(request).await? {
            Message::ProvisionAck(a) if a.success => {
                Ok(a.status.unwrap_or_else(|| "provisioned".to_string()))
            }
            Message::ProvisionAck(a) => Err(hub_failure(a.error)),
            Message::Error(e) => Err(ClientError::Hub(e.error)),
            other => Err(ClientError::UnexpectedResponse(other.kind())),
        }
    }

    pub async fn export_hub_outputs(&self, all_outputs: bool) -> Result<String, ClientError> {
        let request =
            Message::ExportOutputsRequest(ExportOutputsRequest::new(&self.operator_id, all_outputs));
        match self.request(request).await? {
            Message::ExportOutputsResponse(r) if r.success => Ok(r.outputs_data_hex),
            Message::ExportOutputsResponse(r) => Err(hub_failure(r.error)),
            Message::Error(e) => Err(ClientError::Hub(e.error)),
            other => Err(ClientError::UnexpectedResponse(other.kind())),
        }
    }

    pub async fn create_transaction(
        &self,
        destination: &str,
        amount: f64,
        priority: u8,
    ) -> Result<HubUnsignedTx, ClientError> {
        let request = Message::CreateTxRequest(CreateTxRequest::new(
            &self.operator_id,
            destination,
            amount,
            priority,
        ));
        match self.request(request).await? {
            Message::CreateTxResponse(r) if r.success => Ok(HubUnsignedTx {
                unsigned_txset: r.unsigned_txset,
                fee: r.fee,
                amount: r.amount,
            }),
            Message::CreateTxResponse(r) => Err(hub_failure(r.error)),
            Message::Error(e) => Err(ClientError::Hub(e.error)),
            other => Err(ClientError::UnexpectedResponse(other.kind())),
        }
    }

    pub async fn submit_transaction(&self, signed_txset: &str) -> Result<String, ClientError> {
        let request =
            Message::SubmitTxRequest(SubmitTxRequest::new(&self.operator_id, signed_txset));
        match self.request(request).await? {
            Message::SubmitTxResponse(r) if r.success => Ok(r.tx_hash),
            Message::SubmitTxResponse(r) => Err(hub_failure(r.error)),
            Message::Error(e) => Err(ClientError::Hub(e.error)),
            other => Err(ClientError::UnexpectedResponse(other.kind())),
        }
    }

    /// Export key images from the local signing wallet and push them to the
    /// hub so its view wallet learns what is spent.
    pub async fn sync_key_images(&self) -> Result<KeyImageSyncReport, ClientError> {
        let images = self.export_local_key_images(true).await?;
        debug!(count = images.len(), "pushing key images to hub");
        let request = Message::ImportKeyImagesRequest(ImportKeyImagesRequest::new(
            &self.operator_id,
            images,
            0,
        ));
        match self.request(request).await? {
            Message::ImportKeyImagesResponse(r) if r.success => Ok(KeyImageSyncReport {
                height: r.height,
                spent: r.spent,
                unspent: r.unspent,
            }),
            Message::ImportKeyImagesResponse(r) => Err(hub_failure(r.error)),
            Message::Error(e) => Err(ClientError::Hub(e.error)),
            other => Err(ClientError::UnexpectedResponse(other.kind())),
        }
    }

    // Local operations (against the offline signing daemon)

    pub async fn import_outputs_local(&self, outputs_data_hex: &str) -> Result<u64, ClientError> {
        Ok(self.local.import_outputs(outputs_data_hex).await?)
    }

    pub async fn sign_local(&self, unsigned_txset: &str) -> Result<SignedTransfer, ClientError> {
        Ok(self.local.sign_transfer(unsigned_txset).await?)
    }

    pub async fn export_local_key_images(
        &self,
        all_images: bool,
    ) -> Result<Vec<SignedKeyImage>, ClientError> {
        Ok(self.local.export_key_images(all_images).await?)
    }

    pub async fn local_address(&self) -> Result<String, ClientError> {
        Ok(self.local.get_address().await?)
    }
}
