//! Meshwallet Wire Protocol
//!
//! Typed request/response messages exchanged between a cold-signing client
//! and a view-only hub, plus the transport seam they travel over.
//!
//! ## Security Model
//!
//! - The spend credential never appears in any message kind
//! - Currency crosses the wire in decimal display units; atomic conversion
//!   happens only at the wallet-rpc edge
//! - Every response is matched to its request by correlation id

pub mod messages;
pub mod transport;

pub use messages::{
    decode, encode, recover_correlation_id, unix_now, BalanceRequest, BalanceResponse, CodecError,
    CreateTxRequest, CreateTxResponse, DecodeError, ErrorResponse, ExportOutputsRequest,
    ExportOutputsResponse, ImportKeyImagesRequest, ImportKeyImagesResponse, Message, MessageKind,
    ProvisionAck, ProvisionWalletRequest, SignedKeyImage, SubmitTxRequest, SubmitTxResponse,
};
pub use transport::{MeshEvent, MeshTransport, PeerId, TransportError};
