use crate::codec::{INFINITY, UNKNOWN_TOKEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub const fn len(&self) -> u64 {
        self.to.saturating_sub(self.from).saturating_add(1)
    }

    pub const fn is_empty(&self) -> bool {
        self.to < self.from
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// The current allowance an owner has granted a spender on one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub token_address: String,
    pub token_symbol: Option<String>,
    pub token_name: Option<String>,
    pub owner: String,
    pub spender: String,
    /// Decimal amount, or `"INFINITY"` for values at or above 2^255.
    pub value: String,
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl ApprovalEvent {
    pub fn is_unlimited(&self) -> bool {
        self.value == INFINITY
    }

    /// Symbol, falling back to the name, then to `"UnknownERC20"`.
    pub fn display_token(&self) -> &str {
        self.token_symbol
            .as_deref()
            .or(self.token_name.as_deref())
            .unwrap_or(UNKNOWN_TOKEN)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEventCollection {
    pub address: String,
    pub total_events: usize,
    pub scanned_blocks: u64,
    pub events: Vec<ApprovalEvent>,
    pub fetched_at: DateTime<Utc>,
    /// Ranges whose chunk query failed after retries. Empty for a complete scan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_ranges: Vec<BlockRange>,
}

impl ApprovalEventCollection {
    pub fn new(address: String, latest_block: u64, events: Vec<ApprovalEvent>) -> Self {
        Self {
            address,
            total_events: events.len(),
            scanned_blocks: latest_block.saturating_add(1),
            events,
            fetched_at: Utc::now(),
            missing_ranges: Vec::new(),
        }
    }

    pub fn with_missing_ranges(mut self, missing_ranges: Vec<BlockRange>) -> Self {
        self.missing_ranges = missing_ranges;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.missing_ranges.is_empty()
    }

    pub fn missing_blocks(&self) -> u64 {
        self.missing_ranges.iter().map(BlockRange::len).sum()
    }
}
