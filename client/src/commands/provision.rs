//! Provision command
//!
//! Registers this operator with the hub by sending the view credential.
//! The hub builds a view-only wallet from it; the spend key stays here.

use anyhow::Result;

use mw_wallet_rpc::WalletRpc;

use crate::client::MeshClient;

use super::print_success;

/// Run the provision command
pub async fn run<L: WalletRpc>(
    client: &MeshClient<L>,
    view_key: &str,
    address: &str,
    restore_height: u64,
) -> Result<()> {
    println!(
        "Provisioning view-only wallet on the hub for operator '{}'...",
        client.operator_id()
    );

    let status = client.provision_wallet(view_key, address, restore_height).await?;

    println!();
    print_success(&status);
    Ok(())
}
