use crate::codec::UNKNOWN_TOKEN;
use crate::config::RetryConfig;
use crate::events::{decode_token_string, nameCall, symbolCall};
use crate::source::{LogSource, RawLog, SourceError};
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, TransactionInput, TransactionRequest};
use alloy::sol_types::SolCall;
use alloy::transports::{RpcError, TransportErrorKind, TransportResult};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use regex::RegexSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

// Provider wordings for "this range holds more logs than I will return".
const RESULT_SET_TOO_LARGE_PATTERNS: &[&str] = &[
    r"(?i)query returned more than",
    r"(?i)too many results",
    r"(?i)result set too large",
    r"(?i)exceeds maximum",
    r"(?i)exceeds max results",
    r"(?i)log response size exceeded",
];

const EXECUTION_REVERTED_PATTERN: &str = r"(?i)execution reverted";

static RESULT_SET_TOO_LARGE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(RESULT_SET_TOO_LARGE_PATTERNS).expect("result cap patterns are valid")
});

static EXECUTION_REVERTED: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([EXECUTION_REVERTED_PATTERN]).expect("revert pattern is valid")
});

#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    retry: RetryConfig,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String], retry: &RetryConfig) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            retry: retry.clone(),
        })
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        let min_wait_ms = u64::try_from(self.retry.min_wait.as_millis()).unwrap_or(u64::MAX);
        ExponentialBackoff::from_millis(2)
            .factor((min_wait_ms / 2).max(1))
            .max_delay(self.retry.max_wait)
            .map(jitter)
            .take(self.retry.max_attempts.saturating_sub(1))
    }

    fn handle_error(&self, error: &RpcError<TransportErrorKind>) -> SourceError {
        let classified = classify_rpc_error(error);
        if classified.is_transient() {
            warn!(
                "RPC error on {}: {}, rotating provider",
                self.get_current_url(),
                error
            );
            self.rotate_provider();
        } else {
            debug!("RPC request rejected by {}: {}", self.get_current_url(), error);
        }
        classified
    }

    fn handle_timeout(&self) -> SourceError {
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            self.retry.request_timeout.as_secs(),
            self.get_current_url()
        );
        self.rotate_provider();
        SourceError::Timeout(self.retry.request_timeout)
    }

    async fn request<T, F, Fut>(&self, call: F) -> Result<T, SourceError>
    where
        F: Fn(AlloyFullProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let action = || {
            let future = call(self.get_provider().clone());
            async move {
                match timeout(self.retry.request_timeout, future).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(self.handle_error(&e)),
                    Err(_) => Err(self.handle_timeout()),
                }
            }
        };

        retry_transient(self.get_retry_strategy(), action).await
    }

    async fn read_token_string<C>(&self, token: Address, call: C) -> String
    where
        C: SolCall<Return = String>,
    {
        let tx = TransactionRequest::default()
            .to(token)
            .input(TransactionInput::new(call.abi_encode().into()));

        match self
            .request(|provider| {
                let tx = tx.clone();
                async move { provider.call(tx).await }
            })
            .await
        {
            Ok(output) => decode_token_string::<C>(&output).unwrap_or_else(|| {
                debug!("Token {:?} returned no usable data for {}", token, C::SIGNATURE);
                UNKNOWN_TOKEN.to_string()
            }),
            Err(e) => {
                debug!("Failed to call {} on token {:?}: {}", C::SIGNATURE, token, e);
                UNKNOWN_TOKEN.to_string()
            }
        }
    }
}

#[async_trait]
impl LogSource for RpcClient {
    async fn latest_block_number(&self) -> Result<u64, SourceError> {
        let block_number = self
            .request(|provider| async move { provider.get_block_number().await })
            .await?;
        debug!("Latest block number: {}", block_number);
        Ok(block_number)
    }

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        topics: &[B256],
    ) -> Result<Vec<RawLog>, SourceError> {
        let filter = build_filter(from_block, to_block, topics);
        debug!("Fetching logs from block {} to {}", from_block, to_block);

        let logs = self
            .request(|provider| {
                let filter = filter.clone();
                async move { provider.get_logs(&filter).await }
            })
            .await?;

        debug!(
            "Retrieved {} logs for blocks {} to {}",
            logs.len(),
            from_block,
            to_block
        );
        Ok(logs.into_iter().map(RawLog::from).collect())
    }

    async fn token_symbol(&self, token: Address) -> String {
        self.read_token_string(token, symbolCall {}).await
    }

    async fn token_name(&self, token: Address) -> String {
        self.read_token_string(token, nameCall {}).await
    }
}

fn build_filter(from_block: u64, to_block: u64, topics: &[B256]) -> Filter {
    let mut filter = Filter::new().from_block(from_block).to_block(to_block);
    if let Some(signature) = topics.first() {
        filter = filter.event_signature(*signature);
    }
    if let Some(topic) = topics.get(1) {
        filter = filter.topic1(*topic);
    }
    if let Some(topic) = topics.get(2) {
        filter = filter.topic2(*topic);
    }
    if let Some(topic) = topics.get(3) {
        filter = filter.topic3(*topic);
    }
    filter
}

async fn retry_transient<T, A, Fut>(
    strategy: impl Iterator<Item = Duration>,
    action: A,
) -> Result<T, SourceError>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    RetryIf::spawn(strategy, action, |e: &SourceError| e.is_transient()).await
}

pub fn classify_rpc_error(error: &RpcError<TransportErrorKind>) -> SourceError {
    let message = error.to_string();
    if is_result_set_too_large(&message) {
        return SourceError::ResultSetTooLarge(message);
    }

    match error {
        RpcError::ErrorResp(payload) => classify_error_code(payload.code, message),
        RpcError::Transport(TransportErrorKind::HttpError(http)) => {
            classify_http_status(http.status, message)
        }
        RpcError::SerError(_)
        | RpcError::UnsupportedFeature(_)
        | RpcError::LocalUsageError(_) => SourceError::Rejected(message),
        _ => SourceError::Transient(message),
    }
}

pub fn is_result_set_too_large(message: &str) -> bool {
    RESULT_SET_TOO_LARGE.is_match(message)
}

// Malformed requests and reverted calls are final.
pub fn classify_error_code(code: i64, message: String) -> SourceError {
    match code {
        -32602..=-32600 | 3 => SourceError::Rejected(message),
        _ if EXECUTION_REVERTED.is_match(&message) => SourceError::Rejected(message),
        _ => SourceError::Transient(message),
    }
}

pub fn classify_http_status(status: u16, message: String) -> SourceError {
    match status {
        408 | 425 | 429 | 500..=599 => SourceError::Transient(message),
        400..=499 => SourceError::Rejected(message),
        _ => SourceError::Transient(message),
    }
}
