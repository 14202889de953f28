//! Meshwallet Hub
//!
//! Internet-connected half of the cold-signing pair. Holds view-only
//! wallets on a local wallet daemon and answers client requests arriving
//! over the mesh: balances, output export, unsigned transfer creation,
//! signed submission, and key-image import. It can see funds and build
//! transactions but can never spend.

pub mod config;
pub mod lease;
pub mod registry;
pub mod service;
pub mod session;

pub use config::HubConfig;
pub use lease::WalletLease;
pub use registry::{OperatorRegistry, RegistryError, WalletBinding};
pub use service::HubService;
pub use session::{OperatorSession, SessionState};
