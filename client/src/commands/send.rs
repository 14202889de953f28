//! Send transaction command
//!
//! Drives the full cold-signing workflow; the spend key never leaves the
//! local daemon.

use anyhow::{anyhow, Result};

use mw_wallet_rpc::units::validate_amount;
use mw_wallet_rpc::WalletRpc;

use crate::client::MeshClient;
use crate::workflow::{self, WorkflowStep};

use super::{print_success, print_warning, prompt_confirm};

/// Run the send command
pub async fn run<L: WalletRpc>(
    client: &MeshClient<L>,
    address: &str,
    amount: f64,
    priority: u8,
    skip_confirm: bool,
) -> Result<()> {
    validate_amount(amount).map_err(|e| anyhow!("{e}"))?;

    println!("Send {:.12} to {}", amount, address);
    println!("Priority: {}", priority);
    if !skip_confirm && !prompt_confirm("Proceed with cold-signing workflow?")? {
        println!("Aborted.");
        return Ok(());
    }

    println!();
    println!("Running cold-signing workflow (this can take a while over the mesh)...");
    let receipt = workflow::send_transaction(client, address, amount, priority).await?;

    println!();
    print_success(&format!("Transaction submitted: {}", receipt.tx_hash));
    println!("Amount: {:.12}", receipt.amount);
    println!("Fee:    {:.12}", receipt.fee);
    if !receipt.key_images_synced {
        print_warning(&format!(
            "{} did not complete; the hub's balance view may lag until the next sync.",
            WorkflowStep::SyncKeyImages
        ));
    }
    Ok(())
}
