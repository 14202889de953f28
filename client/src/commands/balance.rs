//! Balance check command

use anyhow::Result;

use mw_wallet_rpc::WalletRpc;

use crate::client::MeshClient;

use super::print_success;

/// Run the balance command
pub async fn run<L: WalletRpc>(client: &MeshClient<L>) -> Result<()> {
    println!("Querying hub as operator '{}'...", client.operator_id());

    let balance = client.get_balance().await?;

    println!();
    print_success(&format!("Balance:  {:.12}", balance.balance));
    println!("Unlocked: {:.12}", balance.unlocked_balance);
    println!();
    println!("Hub view wallet synced to block {}", balance.block_height);
    Ok(())
}
