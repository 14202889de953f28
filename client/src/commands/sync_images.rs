//! Key-image sync command
//!
//! Pushes the local signing wallet's key images to the hub so its view
//! wallet can tell spent outputs from unspent ones.

use anyhow::Result;

use mw_wallet_rpc::units::format_amount;
use mw_wallet_rpc::WalletRpc;

use crate::client::MeshClient;

use super::print_success;

/// Run the sync-images command
pub async fn run<L: WalletRpc>(client: &MeshClient<L>) -> Result<()> {
    println!("Exporting key images from the local signing wallet...");

    let report = client.sync_key_images().await?;

    println!();
    print_success("Key images synced to the hub.");
    println!("Hub view at height {}", report.height);
    println!("Spent:   {}", format_amount(report.spent));
    println!("Unspent: {}", format_amount(report.unspent));
    Ok(())
}
