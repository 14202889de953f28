//! Wallet RPC Gateway
//!
//! Normalized client for the wallet daemon's JSON-RPC surface. Both halves
//! of the system use it: the hub against its view-only wallet daemon, the
//! client against the local daemon holding the spending credential.
//!
//! Amounts enter and leave this crate in atomic units; conversion from the
//! wire's decimal display units happens here and nowhere else.

pub mod client;
pub mod units;

pub use client::{
    BalanceInfo, GatewayError, KeyImageImport, SignedTransfer, UnsignedTransfer, ViewWalletSpec,
    WalletRpc, WalletRpcClient,
};
