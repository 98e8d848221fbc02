use anyhow::{Context, Result};
use approval_scanner::api::{AppState, router};
use approval_scanner::config::Config;
use approval_scanner::logging::init_tracing;
use approval_scanner::price::{CoinGeckoClient, PriceService};
use approval_scanner::rpc::RpcClient;
use approval_scanner::service::ApprovalService;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    info!("Starting approval scanner API");
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let client = RpcClient::new(&config.json_rpc_urls, &config.retry)?;
    info!("RPC client connected");

    let prices = CoinGeckoClient::new(&config.prices, config.scan.max_concurrent_lookups)?;
    let state = AppState {
        service: Arc::new(ApprovalService::new(Arc::new(client), &config.scan)),
        prices: Arc::new(PriceService::new(prices)),
    };

    let listener = TcpListener::bind(config.server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server_addr))?;
    info!("Listening on {}", config.server_addr);

    if let Err(e) = axum::serve(listener, router(state)).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
