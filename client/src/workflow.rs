//! Cold-signing transaction workflow
//!
//! Six steps, strictly ordered, each gated on the previous one:
//!
//! 1. Export outputs from the hub's view wallet
//! 2. Import them into the local signing wallet
//! 3. Ask the hub to create the unsigned transfer
//! 4. Sign locally
//! 5. Submit the signed txset through the hub
//! 6. Push key images back so the hub sees the spend (best-effort)
//!
//! Step 6 runs after the funds have moved; its failure degrades the hub's
//! balance view but must not fail a transfer that is already on the chain.

use tracing::{info, warn};

use mw_wallet_rpc::units::validate_amount;
use mw_wallet_rpc::WalletRpc;

use crate::client::{ClientError, MeshClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    ValidateAmount,
    ExportOutputs,
    ImportOutputs,
    CreateTx,
    SignTx,
    SubmitTx,
    SyncKeyImages,
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ValidateAmount => "Validate amount",
            Self::ExportOutputs => "Export outputs",
            Self::ImportOutputs => "Import outputs",
            Self::CreateTx => "Create tx",
            Self::SignTx => "Sign tx",
            Self::SubmitTx => "Submit tx",
            Self::SyncKeyImages => "Sync key images",
        })
    }
}

/// A workflow failure, attributed to the step that caused it.
#[derive(Debug, thiserror::Error)]
#[error("{step} failed: {source}")]
pub struct WorkflowError {
    pub step: WorkflowStep,
    #[source]
    pub source: ClientError,
}

fn at_step<T>(step: WorkflowStep, result: Result<T, ClientError>) -> Result<T, WorkflowError> {
    result.map_err(|source| WorkflowError { step, source })
}

/// What the operator gets back after a successful transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub tx_hash: String,
    /// Fee in display units.
    pub fee: f64,
    /// Amount in display units.
    pub amount: f64,
    /// Whether the best-effort key-image sync reached the hub.
    pub key_images_synced: bool,
}

/// Run the full cold-signing transfer workflow.
pub async fn send_transaction<L: WalletRpc>(
    client: &MeshClient<L>,
    destination: &str,
    amount: f64,
    priority: u8,
) -> Result<TransferReceipt, WorkflowError> {
    at_step(
        WorkflowStep::ValidateAmount,
        validate_amount(amount).map(|_| ()).map_err(ClientError::from),
    )?;

    info!(step = %WorkflowStep::ExportOutputs, "workflow step");
    let outputs = at_step(
        WorkflowStep::ExportOutputs,
        client.export_hub_outputs(true).await,
    )?;

    info!(step = %WorkflowStep::ImportOutputs, "workflow step");
    let imported = at_step(
        WorkflowStep::ImportOutputs,
        client.import_outputs_local(&outputs).await,
    )?;
    info!(imported, "outputs imported into signing wallet");

    info!(step = %WorkflowStep::CreateTx, "workflow step");
    let unsigned = at_step(
        WorkflowStep::CreateTx,
        client.create_transaction(destination, amount, priority).await,
    )?;
    info!(fee = unsigned.fee, "unsigned transfer created");

    info!(step = %WorkflowStep::SignTx, "workflow step");
    let signed = at_step(
        WorkflowStep::SignTx,
        client.sign_local(&unsigned.unsigned_txset).await,
    )?;

    info!(step = %WorkflowStep::SubmitTx, "workflow step");
    let tx_hash = at_step(
        WorkflowStep::SubmitTx,
        client.submit_transaction(&signed.signed_txset).await,
    )?;
    info!(%tx_hash, "transfer submitted");

    // The transfer is on the network from here on; a sync failure is
    // reported in the receipt, never as a workflow failure.
    info!(step = %WorkflowStep::SyncKeyImages, "workflow step");
    let key_images_synced = match client.sync_key_images().await {
        Ok(report) => {
            info!(height = report.height, "key images synced");
            true
        }
        Err(e) => {
            warn!("{} failed: {e}", WorkflowStep::SyncKeyImages);
            false
        }
    };

    Ok(TransferReceipt {
        tx_hash,
        fee: unsigned.fee,
        amount: unsigned.amount,
        key_images_synced,
    })
}
