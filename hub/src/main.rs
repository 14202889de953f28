//! Meshwallet Hub daemon
//!
//! Bridges mesh peers to a local view-only wallet daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshwallet_hub::{HubConfig, HubService, OperatorRegistry};
use mw_protocol::transport::TcpMesh;
use mw_protocol::PeerId;
use mw_wallet_rpc::WalletRpcClient;

#[derive(Parser)]
#[command(name = "meshwallet-hub")]
#[command(about = "View-only wallet hub for cold-signing mesh clients")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wallet daemon JSON-RPC URL (overrides config)
    #[arg(long)]
    wallet_rpc_url: Option<String>,

    /// Data directory for the operator registry (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Mesh listen address (overrides config)
    #[arg(long)]
    listen: Option<String>,

    /// Serve unknown operators from the daemon's open wallet
    #[arg(long)]
    single_tenant: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = HubConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.wallet_rpc_url {
        config.wallet_rpc_url = url;
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if cli.single_tenant {
        config.single_tenant = true;
    }

    let gateway = WalletRpcClient::new(&config.wallet_rpc_url);
    match gateway.check_connection().await {
        Ok(()) => info!(url = %config.wallet_rpc_url, "wallet daemon reachable"),
        Err(e) => warn!(
            url = %config.wallet_rpc_url,
            error = %e,
            "wallet daemon not reachable yet; requests will fail until it is"
        ),
    }

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    let registry = Arc::new(OperatorRegistry::new(&config.data_dir));
    let operators = registry.len()?;
    info!(registry = %registry.path().display(), operators, "operator registry loaded");

    let local = PeerId::new(config.peer_id.clone());
    let (mesh, events, addr) = TcpMesh::listen(local, &config.listen)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen))?;
    info!(%addr, "mesh listener up");

    let service = HubService::new(mesh, gateway, registry, config.single_tenant);
    service.run(events).await;
    Ok(())
}
