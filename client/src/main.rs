//! Meshwallet client CLI
//!
//! Cold-signing wallet operations over a mesh hub.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshwallet_client::{commands, ClientConfig, Correlator, MeshClient};
use mw_protocol::transport::TcpMesh;
use mw_protocol::PeerId;
use mw_wallet_rpc::WalletRpcClient;

#[derive(Parser)]
#[command(name = "meshwallet")]
#[command(about = "Cold-signing wallet client for a meshwallet hub")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Operator id (overrides config)
    #[arg(short, long, global = true)]
    operator: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check balance on the hub's view wallet
    Balance,

    /// Send funds through the cold-signing workflow
    Send {
        /// Recipient address
        address: String,

        /// Amount to send, display units
        amount: f64,

        /// Daemon priority, 0-3
        #[arg(short, long, default_value = "1")]
        priority: u8,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Provision a view-only wallet for this operator on the hub
    Provision {
        /// Private view key (hex)
        #[arg(long)]
        view_key: String,

        /// Primary address the view key belongs to
        #[arg(long)]
        address: String,

        /// Restore height for the view wallet scan
        #[arg(long, default_value = "0")]
        restore_height: u64,
    },

    /// Push local key images to the hub's view wallet
    SyncImages,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(operator) = cli.operator {
        config.operator_id = operator;
    }
    if config.operator_id.is_empty() {
        bail!("no operator id configured; set operator_id in the config or pass --operator");
    }

    let local = WalletRpcClient::new(&config.wallet_rpc_url);
    let (mesh, events) = TcpMesh::connect(PeerId::new(config.peer_id.clone()), &config.hub_addr)
        .await
        .with_context(|| format!("failed to reach hub at {}", config.hub_addr))?;

    let correlator = Correlator::new(mesh, PeerId::new(config.hub_peer_id.clone()));
    correlator.spawn_pump(events);
    let client = MeshClient::new(
        correlator,
        local,
        config.operator_id.clone(),
        Duration::from_secs(config.request_timeout_secs),
    );

    match cli.command {
        Commands::Balance => commands::balance::run(&client).await,
        Commands::Send {
            address,
            amount,
            priority,
            yes,
        } => commands::send::run(&client, &address, amount, priority, yes).await,
        Commands::Provision {
            view_key,
            address,
            restore_height,
        } => commands::provision::run(&client, &view_key, &address, restore_height).await,
        Commands::SyncImages => commands::sync_images::run(&client).await,
    }
}
