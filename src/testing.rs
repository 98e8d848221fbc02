//! In-memory [`LogSource`] for unit tests.

use crate::codec::{APPROVAL_EVENT_SIGNATURE, UNKNOWN_TOKEN, pad_topic};
use crate::models::BlockRange;
use crate::source::{LogSource, RawLog, SourceError};
use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn approval_log(
    token: Address,
    owner: Address,
    spender: Address,
    value: U256,
    block: u64,
    log_index: u64,
) -> RawLog {
    RawLog {
        address: token,
        topics: vec![APPROVAL_EVENT_SIGNATURE, pad_topic(&owner), pad_topic(&spender)],
        data: Bytes::from(value.to_be_bytes::<32>().to_vec()),
        block_number: Some(block),
        log_index: Some(log_index),
        transaction_hash: Some(B256::repeat_byte((block % 256) as u8)),
    }
}

pub struct MockSource {
    latest_block: Result<u64, SourceError>,
    logs: Vec<RawLog>,
    /// Queries spanning more blocks than this are refused as too large.
    max_range: Option<u64>,
    /// Chunk queries overlapping one of these fail transiently.
    failing_ranges: Vec<BlockRange>,
    /// Queries for these owners are rejected outright.
    failing_owners: Vec<Address>,
    symbols: HashMap<Address, String>,
    names: HashMap<Address, String>,
    latency: Duration,
    log_calls: Mutex<Vec<BlockRange>>,
    latest_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new(latest_block: u64) -> Self {
        MockSource {
            latest_block: Ok(latest_block),
            logs: Vec::new(),
            max_range: None,
            failing_ranges: Vec::new(),
            failing_owners: Vec::new(),
            symbols: HashMap::new(),
            names: HashMap::new(),
            latency: Duration::ZERO,
            log_calls: Mutex::new(Vec::new()),
            latest_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_latest_block(error: SourceError) -> Self {
        MockSource {
            latest_block: Err(error),
            ..Self::new(0)
        }
    }

    pub fn with_logs(mut self, logs: Vec<RawLog>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_max_range(mut self, blocks: u64) -> Self {
        self.max_range = Some(blocks);
        self
    }

    pub fn with_failing_range(mut self, range: BlockRange) -> Self {
        self.failing_ranges.push(range);
        self
    }

    pub fn with_failing_owner(mut self, owner: Address) -> Self {
        self.failing_owners.push(owner);
        self
    }

    pub fn with_token(mut self, token: Address, symbol: &str, name: &str) -> Self {
        self.symbols.insert(token, symbol.to_string());
        self.names.insert(token, name.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn log_calls(&self) -> Vec<BlockRange> {
        self.log_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    /// Symbol and name lookups combined.
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, range: BlockRange, topics: &[B256]) -> Result<Vec<RawLog>, SourceError> {
        if topics
            .get(1)
            .is_some_and(|owner| self.failing_owners.iter().any(|o| pad_topic(o) == *owner))
        {
            return Err(SourceError::Rejected("owner blocked".to_string()));
        }
        if self.max_range.is_some_and(|max| range.len() > max) {
            return Err(SourceError::ResultSetTooLarge(
                "query returned more than 10000 results".to_string(),
            ));
        }
        if self
            .failing_ranges
            .iter()
            .any(|f| f.from <= range.to && range.from <= f.to)
        {
            return Err(SourceError::Transient("connection reset".to_string()));
        }

        Ok(self
            .logs
            .iter()
            .filter(|log| {
                log.block_number
                    .is_some_and(|b| range.from <= b && b <= range.to)
            })
            .filter(|log| {
                topics
                    .iter()
                    .zip(&log.topics)
                    .all(|(wanted, actual)| wanted == actual)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LogSource for MockSource {
    async fn latest_block_number(&self) -> Result<u64, SourceError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        self.latest_block.clone()
    }

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        topics: &[B256],
    ) -> Result<Vec<RawLog>, SourceError> {
        let range = BlockRange::new(from_block, to_block);
        if let Ok(mut calls) = self.log_calls.lock() {
            calls.push(range);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.answer(range, topics)
    }

    async fn token_symbol(&self, token: Address) -> String {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.symbols
            .get(&token)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_TOKEN.to_string())
    }

    async fn token_name(&self, token: Address) -> String {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.names
            .get(&token)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_TOKEN.to_string())
    }
}
