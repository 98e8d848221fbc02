use crate::config::PriceConfig;
use crate::throttle::Throttle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Token address (lowercase) to USD price. `None` when no price is known.
pub type PriceMap = HashMap<String, Option<f64>>;

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_multiple_prices(&self, tokens: &[String]) -> PriceMap;
}

#[derive(Debug, Deserialize)]
struct CoinResponse {
    #[serde(default)]
    market_data: Option<MarketData>,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    #[serde(default)]
    current_price: HashMap<String, f64>,
}

pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    throttle: Throttle,
}

impl CoinGeckoClient {
    /// Header for the CoinGecko demo tier.
    const API_KEY_HEADER: &'static str = "x-cg-demo-api-key";
    const PLATFORM: &'static str = "ethereum";
    const CURRENCY: &'static str = "usd";

    pub fn new(config: &PriceConfig, max_concurrent_requests: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build CoinGecko HTTP client")?;

        Ok(CoinGeckoClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            throttle: Throttle::new(max_concurrent_requests),
        })
    }

    fn token_url(&self, token: &str) -> String {
        format!(
            "{}/coins/{}/contract/{}",
            self.base_url,
            Self::PLATFORM,
            token.to_lowercase()
        )
    }

    async fn get_token_price(&self, token: &str) -> Result<Option<f64>> {
        let url = self.token_url(token);

        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.header(Self::API_KEY_HEADER, api_key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send CoinGecko request for {token}"))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                debug!("CoinGecko has no listing for {}", token);
                return Ok(None);
            }
            status => {
                warn!("CoinGecko API error: {} for {}", status, url);
                return Ok(None);
            }
        }

        let body: CoinResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse CoinGecko response for {token}"))?;
        Ok(extract_price(&body, Self::CURRENCY))
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn get_multiple_prices(&self, tokens: &[String]) -> PriceMap {
        let results = self
            .throttle
            .submit(tokens.iter(), |token| async move {
                (token.to_lowercase(), self.get_token_price(token).await)
            })
            .await;

        results
            .into_iter()
            .map(|(token, result)| {
                let price = result.unwrap_or_else(|e| {
                    warn!("Failed to fetch price for {}: {:#}", token, e);
                    None
                });
                (token, price)
            })
            .collect()
    }
}

fn extract_price(body: &CoinResponse, currency: &str) -> Option<f64> {
    body.market_data
        .as_ref()
        .and_then(|market| market.current_price.get(currency))
        .copied()
}

pub struct PriceService<P> {
    source: P,
}

impl<P: PriceSource> PriceService<P> {
    pub fn new(source: P) -> Self {
        PriceService { source }
    }

    /// Prices each distinct token once, keyed by lowercase address.
    pub async fn fetch_prices(&self, token_addresses: &[String]) -> PriceMap {
        if token_addresses.is_empty() {
            return PriceMap::new();
        }

        let unique: Vec<String> = token_addresses
            .iter()
            .map(|t| t.to_lowercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        self.source.get_multiple_prices(&unique).await
    }
}
