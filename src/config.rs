use anyhow::{Context, Result, bail};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_INFURA_ENDPOINT: &str = "https://mainnet.infura.io/v3/";
const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Chunking and fan-out limits for one scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub blocks_per_chunk: u64,
    pub max_concurrent_chunks: usize,
    /// Concurrent token metadata lookups during reconciliation.
    pub max_concurrent_lookups: usize,
    /// Concurrent owner scans in a multi-address request.
    pub max_concurrent_tasks: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            blocks_per_chunk: 10_000,
            max_concurrent_chunks: 5,
            max_concurrent_lookups: 10,
            max_concurrent_tasks: 2,
        }
    }
}

/// Backoff bounds applied to every RPC request.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub scan: ScanConfig,
    pub retry: RetryConfig,
    pub prices: PriceConfig,
    pub server_addr: SocketAddr,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_rpc_url(None)
    }

    /// Loads `.env` and the environment. A given `rpc_url` replaces every
    /// RPC setting from the environment.
    pub fn from_env_with_rpc_url(rpc_url: Option<String>) -> Result<Self> {
        dotenv::dotenv().ok();

        let json_rpc_urls = match rpc_url {
            Some(url) => vec![url],
            None => rpc_urls_from(
                optional_var("JSON_RPC_URLS"),
                optional_var("JSON_RPC_URL"),
                optional_var("INFURA_API_KEY"),
                optional_var("INFURA_ENDPOINT"),
            )?,
        };

        let defaults = ScanConfig::default();
        let scan = ScanConfig {
            blocks_per_chunk: env_or("BLOCKS_PER_CHUNK", defaults.blocks_per_chunk)?,
            max_concurrent_chunks: env_or("MAX_CONCURRENT_CHUNKS", defaults.max_concurrent_chunks)?,
            max_concurrent_lookups: env_or(
                "MAX_CONCURRENT_LOOKUPS",
                defaults.max_concurrent_lookups,
            )?,
            max_concurrent_tasks: env_or("MAX_CONCURRENT_TASKS", defaults.max_concurrent_tasks)?,
        };

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_attempts: env_or("MAX_RETRY_ATTEMPTS", defaults.max_attempts)?,
            min_wait: Duration::from_millis(env_or(
                "RETRY_MIN_WAIT_MS",
                millis(defaults.min_wait),
            )?),
            max_wait: Duration::from_millis(env_or(
                "RETRY_MAX_WAIT_MS",
                millis(defaults.max_wait),
            )?),
            request_timeout: Duration::from_secs(env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout.as_secs(),
            )?),
        };

        let prices = PriceConfig {
            base_url: optional_var("COINGECKO_BASE_URL")
                .unwrap_or_else(|| DEFAULT_COINGECKO_BASE_URL.to_string()),
            api_key: optional_var("COINGECKO_API_KEY"),
            request_timeout: Duration::from_secs(10),
        };

        let server_addr = env_or(
            "SERVER_ADDR",
            SocketAddr::from(([127, 0, 0, 1], 8000)),
        )?;

        let log_level = optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let config = Config {
            json_rpc_urls,
            scan,
            retry,
            prices,
            server_addr,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.json_rpc_urls.is_empty() {
            bail!("At least one RPC URL must be configured");
        }
        if self.scan.blocks_per_chunk == 0 {
            bail!("BLOCKS_PER_CHUNK must be greater than zero");
        }
        if self.scan.max_concurrent_chunks == 0
            || self.scan.max_concurrent_lookups == 0
            || self.scan.max_concurrent_tasks == 0
        {
            bail!("Concurrency limits must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            bail!("MAX_RETRY_ATTEMPTS must be at least 1");
        }
        if self.retry.min_wait > self.retry.max_wait {
            bail!("RETRY_MIN_WAIT_MS must not exceed RETRY_MAX_WAIT_MS");
        }
        Ok(())
    }
}

/// Resolves the RPC endpoint list. An explicit URL list wins over a single
/// URL, which wins over an Infura endpoint built from an API key.
fn rpc_urls_from(
    urls: Option<String>,
    url: Option<String>,
    infura_api_key: Option<String>,
    infura_endpoint: Option<String>,
) -> Result<Vec<String>> {
    if let Some(urls) = urls {
        let urls: Vec<String> = urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();
        if !urls.is_empty() {
            return Ok(urls);
        }
    }

    if let Some(url) = url {
        return Ok(vec![url]);
    }

    let api_key = infura_api_key
        .context("JSON_RPC_URLS, JSON_RPC_URL or INFURA_API_KEY must be set in .env")?;
    let endpoint = infura_endpoint.unwrap_or_else(|| DEFAULT_INFURA_ENDPOINT.to_string());
    Ok(vec![format!("{endpoint}{api_key}")])
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {key} value: {raw}")),
        None => Ok(default),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
