//! Meshwallet Client
//!
//! Offline half of the cold-signing pair. Talks to a local wallet daemon
//! holding the spend key and to a remote hub over a high-latency mesh. The
//! hub sees outputs and builds transactions; only this side can sign.

pub mod client;
pub mod commands;
pub mod config;
pub mod correlator;
pub mod workflow;

pub use client::{ClientError, HubBalance, HubUnsignedTx, KeyImageSyncReport, MeshClient};
pub use config::ClientConfig;
pub use correlator::{Correlator, RequestError, DEFAULT_REQUEST_TIMEOUT};
pub use workflow::{send_transaction, TransferReceipt, WorkflowError, WorkflowStep};
