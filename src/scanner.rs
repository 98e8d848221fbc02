use crate::codec::{APPROVAL_EVENT_SIGNATURE, pad_topic};
use crate::config::ScanConfig;
use crate::models::BlockRange;
use crate::source::{LogSource, RawLog, SourceError};
use crate::throttle::Throttle;
use alloy_primitives::{Address, B256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

// `failed_ranges` holds chunks dropped after exhausting their retries.
#[derive(Debug, Clone, Default)]
pub struct LogScan {
    pub logs: Vec<RawLog>,
    pub failed_ranges: Vec<BlockRange>,
}

impl LogScan {
    pub fn is_complete(&self) -> bool {
        self.failed_ranges.is_empty()
    }
}

pub struct ChunkedScanner<S> {
    source: Arc<S>,
    blocks_per_chunk: u64,
    throttle: Throttle,
}

impl<S: LogSource> ChunkedScanner<S> {
    pub fn new(source: Arc<S>, config: &ScanConfig) -> Self {
        ChunkedScanner {
            source,
            blocks_per_chunk: config.blocks_per_chunk.max(1),
            throttle: Throttle::new(config.max_concurrent_chunks),
        }
    }

    /// Falls back to fixed-size chunks only when the full-range query is
    /// refused as too large.
    pub async fn fetch_all_approval_logs(
        &self,
        owner: Address,
        latest_block: u64,
    ) -> Result<LogScan, SourceError> {
        let topics = approval_topics(&owner);

        info!(
            "Attempting to fetch all approvals in single query (blocks 0 to {})",
            latest_block
        );

        match self.source.get_logs(0, latest_block, &topics).await {
            Ok(logs) => {
                info!("Fetched {} approval events in single query", logs.len());
                Ok(LogScan {
                    logs,
                    failed_ranges: Vec::new(),
                })
            }
            Err(SourceError::ResultSetTooLarge(message)) => {
                warn!(
                    "Query returned too many results ({}). Falling back to chunking strategy",
                    message
                );
                Ok(self.fetch_with_chunking(latest_block, &topics).await)
            }
            Err(e) => {
                error!("Unexpected error during full range query: {}", e);
                Err(e)
            }
        }
    }

    async fn fetch_with_chunking(&self, latest_block: u64, topics: &[B256]) -> LogScan {
        let chunks = generate_chunks(0, latest_block, self.blocks_per_chunk);
        let total_chunks = chunks.len();
        let start = Instant::now();

        info!(
            "Scanning {} blocks in {} chunks of {} blocks",
            latest_block.saturating_add(1),
            total_chunks,
            self.blocks_per_chunk
        );

        let results = self
            .throttle
            .submit(chunks.into_iter().enumerate(), |(index, range)| async move {
                info!(
                    "Processing chunk {}/{} (blocks {})",
                    index + 1,
                    total_chunks,
                    range
                );
                let result = self.source.get_logs(range.from, range.to, topics).await;
                (index, range, result)
            })
            .await;

        let mut scan = LogScan::default();
        for (index, range, result) in results {
            match result {
                Ok(logs) => {
                    info!(
                        "Chunk {}/{} complete: found {} events",
                        index + 1,
                        total_chunks,
                        logs.len()
                    );
                    scan.logs.extend(logs);
                }
                Err(e) => {
                    error!(
                        "Chunk {}/{} (blocks {}) failed, its events are missing from the result: {}",
                        index + 1,
                        total_chunks,
                        range,
                        e
                    );
                    scan.failed_ranges.push(range);
                }
            }
        }

        info!(
            "Chunked scan complete: fetched {} approval events in {:?}",
            scan.logs.len(),
            start.elapsed()
        );
        if !scan.is_complete() {
            warn!(
                "{} of {} chunks failed; result is incomplete",
                scan.failed_ranges.len(),
                total_chunks
            );
        }

        scan
    }
}

pub fn approval_topics(owner: &Address) -> [B256; 2] {
    [APPROVAL_EVENT_SIGNATURE, pad_topic(owner)]
}

pub fn generate_chunks(start: u64, end: u64, chunk_size: u64) -> Vec<BlockRange> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = start;

    while current <= end {
        let chunk_end = current.saturating_add(chunk_size - 1).min(end);
        chunks.push(BlockRange::new(current, chunk_end));
        match chunk_end.checked_add(1) {
            Some(next) => current = next,
            None => break,
        }
    }

    chunks
}
