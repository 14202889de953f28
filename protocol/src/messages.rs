//! Message Envelope & Codec
//!
//! Every message is a JSON object with a `type` discriminator, a
//! `correlation_id` matching responses to requests, and a unix `timestamp`.
//! The kind set is closed: anything else fails to decode.
//!
//! Amounts in these messages are decimal display units. Conversion to and
//! from atomic units is the wallet-rpc gateway's job, never the codec's.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Current unix time in fractional seconds, as carried on the wire.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Encoding failure (the message could not be serialized).
#[derive(Debug, thiserror::Error)]
#[error("failed to encode message: {0}")]
pub struct CodecError(#[from] serde_json::Error);

/// Decoding failure.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not valid JSON, or a known kind with a malformed payload.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The `type` field is missing or not a string.
    #[error("message has no kind discriminator")]
    MissingKind,

    /// The discriminator names a kind outside the closed set.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),
}

/// Closed set of message kinds, matching the wire `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    BalanceRequest,
    ExportOutputsRequest,
    CreateTxRequest,
    SubmitTxRequest,
    ImportKeyImagesRequest,
    ProvisionWalletRequest,
    BalanceResponse,
    ExportOutputsResponse,
    CreateTxResponse,
    SubmitTxResponse,
    ImportKeyImagesResponse,
    ProvisionAck,
    Error,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BalanceRequest => "balance_request",
            Self::ExportOutputsRequest => "export_outputs_request",
            Self::CreateTxRequest => "create_tx_request",
            Self::SubmitTxRequest => "submit_tx_request",
            Self::ImportKeyImagesRequest => "import_key_images_request",
            Self::ProvisionWalletRequest => "provision_wallet_request",
            Self::BalanceResponse => "balance_response",
            Self::ExportOutputsResponse => "export_outputs_response",
            Self::CreateTxResponse => "create_tx_response",
            Self::SubmitTxResponse => "submit_tx_response",
            Self::ImportKeyImagesResponse => "import_key_images_response",
            Self::ProvisionAck => "provision_ack",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "balance_request" => Self::BalanceRequest,
            "export_outputs_request" => Self::ExportOutputsRequest,
            "create_tx_request" => Self::CreateTxRequest,
            "submit_tx_request" => Self::SubmitTxRequest,
            "import_key_images_request" => Self::ImportKeyImagesRequest,
            "provision_wallet_request" => Self::ProvisionWalletRequest,
            "balance_response" => Self::BalanceResponse,
            "export_outputs_response" => Self::ExportOutputsResponse,
            "create_tx_response" => Self::CreateTxResponse,
            "submit_tx_response" => Self::SubmitTxResponse,
            "import_key_images_response" => Self::ImportKeyImagesResponse,
            "provision_ack" => Self::ProvisionAck,
            "error" => Self::Error,
            _ => return None,
        })
    }

    /// Request kinds travel client → hub; everything else is hub → client.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::BalanceRequest
                | Self::ExportOutputsRequest
                | Self::CreateTxRequest
                | Self::SubmitTxRequest
                | Self::ImportKeyImagesRequest
                | Self::ProvisionWalletRequest
        )
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key image plus the signature proving it came from the spend credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedKeyImage {
    pub key_image: String,
    pub signature: String,
}

// Requests (client -> hub)

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRequest {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub operator_id: String,
}

impl BalanceRequest {
    pub fn new(operator_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: unix_now(),
            operator_id: operator_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOutputsRequest {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub operator_id: String,
    pub all_outputs: bool,
}

impl ExportOutputsRequest {
    pub fn new(operator_id: impl Into<String>, all_outputs: bool) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: unix_now(),
            operator_id: operator_id.into(),
            all_outputs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTxRequest {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub operator_id: String,
    pub destination: String,
    /// Amount in display units.
    pub amount: f64,
    /// Daemon priority, 0-3.
    pub priority: u8,
}

impl CreateTxRequest {
    pub fn new(
        operator_id: impl Into<String>,
        destination: impl Into<String>,
        amount: f64,
        priority: u8,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: unix_now(),
            operator_id: operator_id.into(),
            destination: destination.into(),
            amount,
            priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitTxRequest {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub operator_id: String,
    pub signed_txset: String,
}

impl SubmitTxRequest {
    pub fn new(operator_id: impl Into<String>, signed_txset: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: unix_now(),
            operator_id: operator_id.into(),
            signed_txset: signed_txset.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportKeyImagesRequest {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub operator_id: String,
    pub signed_key_images: Vec<SignedKeyImage>,
    pub offset: u64,
}

impl ImportKeyImagesRequest {
    pub fn new(
        operator_id: impl Into<String>,
        signed_key_images: Vec<SignedKeyImage>,
        offset: u64,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: unix_now(),
            operator_id: operator_id.into(),
            signed_key_images,
            offset,
        }
    }
}

/// One-time wallet provisioning. The payload is a view credential only;
/// unknown fields are rejected so a spend key can never ride along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionWalletRequest {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub operator_id: String,
    pub view_key: String,
    pub address: String,
    pub restore_height: u64,
}

impl ProvisionWalletRequest {
    pub fn new(
        operator_id: impl Into<String>,
        view_key: impl Into<String>,
        address: impl Into<String>,
        restore_height: u64,
    ) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            timestamp: unix_now(),
            operator_id: operator_id.into(),
            view_key: view_key.into(),
            address: address.into(),
            restore_height,
        }
    }
}

// Responses (hub -> client)

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub success: bool,
    pub balance: f64,
    pub unlocked_balance: f64,
    pub block_height: u64,
    pub error: Option<String>,
}

impl BalanceResponse {
    pub fn ok(correlation_id: Uuid, balance: f64, unlocked_balance: f64, block_height: u64) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: true,
            balance,
            unlocked_balance,
            block_height,
            error: None,
        }
    }

    pub fn err(correlation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: false,
            balance: 0.0,
            unlocked_balance: 0.0,
            block_height: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOutputsResponse {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub success: bool,
    pub outputs_data_hex: String,
    pub error: Option<String>,
}

impl ExportOutputsResponse {
    pub fn ok(correlation_id: Uuid, outputs_data_hex: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: true,
            outputs_data_hex: outputs_data_hex.into(),
            error: None,
        }
    }

    pub fn err(correlation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: false,
            outputs_data_hex: String::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTxResponse {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub success: bool,
    pub unsigned_txset: String,
    /// Fee in display units.
    pub fee: f64,
    /// Echo of the requested amount, display units.
    pub amount: f64,
    pub error: Option<String>,
}

impl CreateTxResponse {
    pub fn ok(correlation_id: Uuid, unsigned_txset: impl Into<String>, fee: f64, amount: f64) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: true,
            unsigned_txset: unsigned_txset.into(),
            fee,
            amount,
            error: None,
        }
    }

    pub fn err(correlation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: false,
            unsigned_txset: String::new(),
            fee: 0.0,
            amount: 0.0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitTxResponse {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub success: bool,
    pub tx_hash: String,
    pub error: Option<String>,
}

impl SubmitTxResponse {
    pub fn ok(correlation_id: Uuid, tx_hash: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: true,
            tx_hash: tx_hash.into(),
            error: None,
        }
    }

    pub fn err(correlation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: false,
            tx_hash: String::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportKeyImagesResponse {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub success: bool,
    pub height: u64,
    /// Spent total, atomic units.
    pub spent: u64,
    /// Unspent total, atomic units.
    pub unspent: u64,
    pub error: Option<String>,
}

impl ImportKeyImagesResponse {
    pub fn ok(correlation_id: Uuid, height: u64, spent: u64, unspent: u64) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: true,
            height,
            spent,
            unspent,
            error: None,
        }
    }

    pub fn err(correlation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: false,
            height: 0,
            spent: 0,
            unspent: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionAck {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub success: bool,
    pub operator_id: String,
    pub status: Option<String>,
    pub error: Option<String>,
}

impl ProvisionAck {
    pub fn ok(correlation_id: Uuid, operator_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: true,
            operator_id: operator_id.into(),
            status: Some(status.into()),
            error: None,
        }
    }

    pub fn err(correlation_id: Uuid, operator_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            success: false,
            operator_id: operator_id.into(),
            status: None,
            error: Some(error.into()),
        }
    }
}

/// Sent when a request could not be parsed into any typed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub correlation_id: Uuid,
    pub timestamp: f64,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(correlation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            timestamp: unix_now(),
            error: error.into(),
        }
    }
}

/// The closed tagged union of all protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    BalanceRequest(BalanceRequest),
    ExportOutputsRequest(ExportOutputsRequest),
    CreateTxRequest(CreateTxRequest),
    SubmitTxRequest(SubmitTxRequest),
    ImportKeyImagesRequest(ImportKeyImagesRequest),
    ProvisionWalletRequest(ProvisionWalletRequest),
    BalanceResponse(BalanceResponse),
    ExportOutputsResponse(ExportOutputsResponse),
    CreateTxResponse(CreateTxResponse),
    SubmitTxResponse(SubmitTxResponse),
    ImportKeyImagesResponse(ImportKeyImagesResponse),
    ProvisionAck(ProvisionAck),
    Error(ErrorResponse),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::BalanceRequest(_) => MessageKind::BalanceRequest,
            Self::ExportOutputsRequest(_) => MessageKind::ExportOutputsRequest,
            Self::CreateTxRequest(_) => MessageKind::CreateTxRequest,
            Self::SubmitTxRequest(_) => MessageKind::SubmitTxRequest,
            Self::ImportKeyImagesRequest(_) => MessageKind::ImportKeyImagesRequest,
            Self::ProvisionWalletRequest(_) => MessageKind::ProvisionWalletRequest,
            Self::BalanceResponse(_) => MessageKind::BalanceResponse,
            Self::ExportOutputsResponse(_) => MessageKind::ExportOutputsResponse,
            Self::CreateTxResponse(_) => MessageKind::CreateTxResponse,
            Self::SubmitTxResponse(_) => MessageKind::SubmitTxResponse,
            Self::ImportKeyImagesResponse(_) => MessageKind::ImportKeyImagesResponse,
            Self::ProvisionAck(_) => MessageKind::ProvisionAck,
            Self::Error(_) => MessageKind::Error,
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        match self {
            Self::BalanceRequest(m) => m.correlation_id,
            Self::ExportOutputsRequest(m) => m.correlation_id,
            Self::CreateTxRequest(m) => m.correlation_id,
            Self::SubmitTxRequest(m) => m.correlation_id,
            Self::ImportKeyImagesRequest(m) => m.correlation_id,
            Self::ProvisionWalletRequest(m) => m.correlation_id,
            Self::BalanceResponse(m) => m.correlation_id,
            Self::ExportOutputsResponse(m) => m.correlation_id,
            Self::CreateTxResponse(m) => m.correlation_id,
            Self::SubmitTxResponse(m) => m.correlation_id,
            Self::ImportKeyImagesResponse(m) => m.correlation_id,
            Self::ProvisionAck(m) => m.correlation_id,
            Self::Error(m) => m.correlation_id,
        }
    }

    pub fn is_request(&self) -> bool {
        self.kind().is_request()
    }
}

/// Serialize a message to wire bytes.
pub fn encode(msg: &Message) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(msg)?)
}

/// Parse wire bytes into a typed message.
///
/// The discriminator is inspected before typed parsing so an unknown kind is
/// reported as such rather than as a generic deserialization failure.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(DecodeError::MissingKind)?;
    if MessageKind::from_str(kind).is_none() {
        return Err(DecodeError::UnknownKind(kind.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

/// Best-effort correlation id extraction from bytes that failed to decode,
/// so the peer can still be sent a typed error response.
pub fn recover_correlation_id(bytes: &[u8]) -> Option<Uuid> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value
        .get("correlation_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}
