//! The log-query capability the scanner and reconciler run against.

use alloy::rpc::types::Log;
use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A log entry as returned by `eth_getLogs`, reduced to the fields the
/// reconciler reads. Optional fields stay optional until the parse step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<B256>,
}

impl From<Log> for RawLog {
    fn from(log: Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The provider refused to return the range because it exceeds its
    /// per-query result cap. Callers split the range and try again.
    #[error("Result set too large: {0}")]
    ResultSetTooLarge(String),
    #[error("Transient provider error: {0}")]
    Transient(String),
    #[error("Request timeout after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("Provider rejected request: {0}")]
    Rejected(String),
}

impl SourceError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

#[async_trait]
pub trait LogSource: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64, SourceError>;

    /// `topics[0]` is the event signature, `topics[1..]` constrain the
    /// indexed parameters in order.
    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        topics: &[B256],
    ) -> Result<Vec<RawLog>, SourceError>;

    /// Never fails: unresolvable symbols come back as `"UnknownERC20"`.
    async fn token_symbol(&self, token: Address) -> String;

    /// Never fails: unresolvable names come back as `"UnknownERC20"`.
    async fn token_name(&self, token: Address) -> String;
}
