use alloy_primitives::Address;
use anyhow::Result;
use approval_scanner::codec::{InvalidAddress, validate_address};
use approval_scanner::config::Config;
use approval_scanner::logging::init_tracing;
use approval_scanner::price::{CoinGeckoClient, PriceService};
use approval_scanner::report::{OutputFormat, cmd_scan};
use approval_scanner::rpc::RpcClient;
use approval_scanner::service::ApprovalService;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "approvals")]
#[command(
    about = "Fetch ERC-20 token approval events for an Ethereum address using eth_getLogs",
    long_about = None
)]
struct Cli {
    /// Owner address to scan; repeat to scan several
    #[arg(short, long = "address", required = true, value_parser = parse_address)]
    addresses: Vec<Address>,

    /// text, table, json or csv
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Attach USD prices from CoinGecko
    #[arg(long, default_value = "false")]
    prices: bool,

    /// RPC endpoint, overrides JSON_RPC_URL(S) from the environment
    #[arg(long)]
    rpc_url: Option<String>,

    #[arg(long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,
}

fn parse_address(s: &str) -> Result<Address, InvalidAddress> {
    validate_address(s)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env_with_rpc_url(cli.rpc_url)?;
    let log_level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_tracing(&log_level);
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let client = RpcClient::new(&config.json_rpc_urls, &config.retry)?;
    let service = ApprovalService::new(Arc::new(client), &config.scan);

    let prices = if cli.prices {
        let client = CoinGeckoClient::new(&config.prices, config.scan.max_concurrent_lookups)?;
        Some(PriceService::new(client))
    } else {
        None
    };

    cmd_scan(&service, prices.as_ref(), &cli.addresses, &format).await
}
