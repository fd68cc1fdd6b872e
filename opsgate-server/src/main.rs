//! opsgate HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p opsgate-server --release
//!
//! # Run with a custom config path
//! opsgate-server --config /path/to/config.toml
//!
//! # Configure logging level
//! RUST_LOG=debug opsgate-server
//! ```
//!
//! `.env.local` and `.env` are loaded, in that order, before configuration.
//! `RUST_LOG` sets the log filter (default: `info`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use opsgate::ChargeNegotiator;
use opsgate_evm::executor::TransactionExecutor;
use opsgate_evm::funding::FundingOrchestrator;
use opsgate_evm::provider::{AlloySettlementChain, SettlementChain};
use opsgate_http::{ChargeClient, MarketplaceClient};
use opsgate_server::config::ServerConfig;
use opsgate_server::handlers::{AppState, router};
use opsgate_server::{BearerToken, ConfigError};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    for file in [".env.local", ".env"] {
        // Absent files are expected.
        let _ = dotenvy::from_filename(file);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("opsgate failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load_from(&cli.config)?;
    let credentials = config.credentials()?;
    let chains = config.chain_registry()?;
    let settlement_chain = config.settlement_chain()?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        chain = %settlement_chain,
        signer = %credentials.signer.address(),
        funding_wallet = %credentials.funding_wallet,
        "Loaded configuration"
    );

    let descriptor = chains
        .get(settlement_chain)
        .ok_or(ConfigError::Missing("settlement.chain"))?;
    let rpc_url = chains
        .rpc_url(settlement_chain, &credentials.rpc_api_key)
        .ok_or(ConfigError::Missing("rpc.urls"))?;
    let rpc_url = Url::parse(&rpc_url).map_err(|e| ConfigError::Invalid {
        field: "rpc.urls",
        reason: e.to_string(),
    })?;

    let chain: Arc<dyn SettlementChain> = Arc::new(AlloySettlementChain::new(
        credentials.signer.clone(),
        rpc_url,
        config.rpc.rate_limit,
    ));
    let executor = TransactionExecutor::new(chain)
        .with_confirmation_timeout(config.confirmation_timeout())
        .with_confirmations(config.settlement.confirmations);

    let billing = ChargeClient::try_new(config.billing.base_url.clone(), &credentials.billing_api_key)?
        .with_timeout(std::time::Duration::from_secs(config.billing.timeout_secs));
    let negotiator: Arc<dyn ChargeNegotiator> = Arc::new(billing);

    let funding = FundingOrchestrator::new(negotiator, executor, credentials.funding_wallet)
        .with_settlement(config.settlement_config()?)
        .with_chain_id(descriptor.chain_id)
        .with_max_amount(config.settlement.max_amount_usd);

    let marketplace = MarketplaceClient::try_new(
        credentials.marketplace_url.clone(),
        &credentials.marketplace_api_key,
    )?;

    let state = Arc::new(AppState {
        funding,
        marketplace: Arc::new(marketplace),
        chains,
        account: credentials.funding_wallet,
        listing_ttl: config.listing_ttl(),
    });
    let app = router(
        state,
        BearerToken::new(credentials.bearer_token),
        config.request_timeout(),
    );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("opsgate listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("opsgate shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
