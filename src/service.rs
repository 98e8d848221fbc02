use crate::codec::{InvalidAddress, canonical, validate_address};
use crate::config::ScanConfig;
use crate::models::ApprovalEventCollection;
use crate::reconciler::Reconciler;
use crate::scanner::ChunkedScanner;
use crate::source::{LogSource, SourceError};
use crate::throttle::Throttle;
use alloy_primitives::Address;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    InvalidAddress(#[from] InvalidAddress),
    #[error("Failed to query chain provider: {0}")]
    Provider(#[from] SourceError),
}

/// One-shot approval scans: latest block, log retrieval, reconciliation.
pub struct ApprovalService<S> {
    source: Arc<S>,
    scanner: ChunkedScanner<S>,
    reconciler: Reconciler<S>,
    throttle: Throttle,
}

impl<S: LogSource> ApprovalService<S> {
    pub fn new(source: Arc<S>, config: &ScanConfig) -> Self {
        ApprovalService {
            scanner: ChunkedScanner::new(Arc::clone(&source), config),
            reconciler: Reconciler::new(Arc::clone(&source), config),
            throttle: Throttle::new(config.max_concurrent_tasks),
            source,
        }
    }

    /// Validates `owner` before touching the network, then scans.
    pub async fn fetch_all_approvals(
        &self,
        owner: &str,
    ) -> Result<ApprovalEventCollection, ScanError> {
        let owner = validate_address(owner)?;
        self.fetch_approvals(owner).await
    }

    pub async fn fetch_approvals(
        &self,
        owner: Address,
    ) -> Result<ApprovalEventCollection, ScanError> {
        let start = Instant::now();
        info!("Starting approval event scan for address: {}", canonical(&owner));

        let latest_block = self.source.latest_block_number().await?;
        info!("Latest block: {}", latest_block);

        let scan = self
            .scanner
            .fetch_all_approval_logs(owner, latest_block)
            .await?;
        info!("Retrieved {} total approval events", scan.logs.len());

        let collection = self
            .reconciler
            .reconcile(&scan.logs, owner, latest_block)
            .await
            .with_missing_ranges(scan.failed_ranges);

        if collection.is_complete() {
            info!(
                "Fetched {} approvals for {} in {:?}",
                collection.total_events,
                collection.address,
                start.elapsed()
            );
        } else {
            warn!(
                "Fetched {} approvals for {} in {:?}, but {} blocks could not be scanned",
                collection.total_events,
                collection.address,
                start.elapsed(),
                collection.missing_blocks()
            );
        }

        Ok(collection)
    }

    /// Scans several owners with at most `max_concurrent_tasks` in flight.
    ///
    /// Every owner is scanned; a failure for one owner is returned in its
    /// slot and does not cancel the others. Results follow input order.
    pub async fn fetch_many(
        &self,
        owners: &[Address],
    ) -> Vec<Result<ApprovalEventCollection, ScanError>> {
        self.throttle
            .submit(owners.iter().copied(), |owner| async move {
                let result = self.fetch_approvals(owner).await;
                if let Err(e) = &result {
                    error!("Approval scan for {} failed: {}", canonical(&owner), e);
                }
                result
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::INFINITY;
    use crate::models::BlockRange;
    use crate::codec::{APPROVAL_EVENT_SIGNATURE, pad_topic};
    use crate::source::RawLog;
    use crate::testing::{MockSource, approval_log};
    use alloy_primitives::{B256, Bytes, U256};

    const OWNER: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0";

    fn owner() -> Address {
        OWNER.parse().unwrap()
    }

    fn config() -> ScanConfig {
        ScanConfig {
            blocks_per_chunk: 1_000,
            ..ScanConfig::default()
        }
    }

    #[tokio::test]
    async fn latest_approval_per_pair_with_metadata() {
        let token = Address::repeat_byte(0xaa);
        let router = Address::repeat_byte(0xbb);
        let bridge = Address::repeat_byte(0xcc);
        let source = Arc::new(
            MockSource::new(5_000)
                .with_logs(vec![
                    approval_log(token, owner(), router, U256::from(100), 100, 3),
                    approval_log(token, owner(), router, U256::from(0), 300, 1),
                    approval_log(token, owner(), router, U256::from(1000), 200, 7),
                    approval_log(token, owner(), bridge, U256::MAX, 250, 0),
                ])
                .with_token(token, "USDT", "Tether USD"),
        );
        let service = ApprovalService::new(Arc::clone(&source), &config());

        let collection = service.fetch_all_approvals(OWNER).await.unwrap();

        assert_eq!(collection.address, OWNER.to_lowercase());
        assert_eq!(collection.total_events, 2);
        assert_eq!(collection.scanned_blocks, 5_001);
        assert!(collection.is_complete());

        let values: Vec<(String, &str, u64)> = collection
            .events
            .iter()
            .map(|e| (e.spender.clone(), e.value.as_str(), e.block_number))
            .collect();
        assert_eq!(
            values,
            vec![
                (canonical(&bridge), INFINITY, 250),
                (canonical(&router), "0", 300),
            ]
        );
        assert!(collection.events.iter().all(|e| {
            e.token_symbol.as_deref() == Some("USDT") && e.token_name.as_deref() == Some("Tether USD")
        }));
        // one symbol and one name lookup for the single token
        assert_eq!(source.metadata_calls(), 2);
    }

    #[tokio::test]
    async fn invalid_address_fails_before_any_request() {
        let source = Arc::new(MockSource::new(100));
        let service = ApprovalService::new(Arc::clone(&source), &config());

        let err = service.fetch_all_approvals("0x123").await.unwrap_err();

        assert!(matches!(err, ScanError::InvalidAddress(_)));
        assert_eq!(source.latest_calls(), 0);
        assert!(source.log_calls().is_empty());
    }

    #[tokio::test]
    async fn latest_block_failure_is_fatal() {
        let source = Arc::new(MockSource::failing_latest_block(SourceError::Timeout(
            std::time::Duration::from_secs(30),
        )));
        let service = ApprovalService::new(Arc::clone(&source), &config());

        let err = service.fetch_approvals(owner()).await.unwrap_err();

        assert!(matches!(err, ScanError::Provider(SourceError::Timeout(_))));
        assert!(source.log_calls().is_empty());
    }

    #[tokio::test]
    async fn skipped_chunks_surface_as_missing_ranges() {
        let token = Address::repeat_byte(0xaa);
        let spender = Address::repeat_byte(0xbb);
        let source = Arc::new(
            MockSource::new(2_999)
                .with_logs(vec![
                    approval_log(token, owner(), spender, U256::from(5), 10, 0),
                    approval_log(token, owner(), spender, U256::from(9), 1_500, 0),
                ])
                .with_max_range(1_000)
                .with_failing_range(BlockRange::new(1_500, 1_500)),
        );
        let service = ApprovalService::new(Arc::clone(&source), &config());

        let collection = service.fetch_approvals(owner()).await.unwrap();

        assert!(!collection.is_complete());
        assert_eq!(collection.missing_ranges, vec![BlockRange::new(1_000, 1_999)]);
        assert_eq!(collection.missing_blocks(), 1_000);
        assert_eq!(collection.events.len(), 1);
        assert_eq!(collection.events[0].value, "5");
    }

    #[tokio::test]
    async fn unknown_metadata_is_absent() {
        let token = Address::repeat_byte(0xaa);
        let source = Arc::new(MockSource::new(10).with_logs(vec![approval_log(
            token,
            owner(),
            Address::repeat_byte(0xbb),
            U256::from(1),
            1,
            0,
        )]));
        let service = ApprovalService::new(source, &config());

        let collection = service.fetch_approvals(owner()).await.unwrap();

        assert_eq!(collection.events[0].token_symbol, None);
        assert_eq!(collection.events[0].token_name, None);
        assert_eq!(collection.events[0].display_token(), "UnknownERC20");
    }

    #[tokio::test]
    async fn no_logs_yields_empty_collection() {
        let service = ApprovalService::new(Arc::new(MockSource::new(10)), &config());

        let collection = service.fetch_approvals(owner()).await.unwrap();

        assert_eq!(collection.total_events, 0);
        assert!(collection.events.is_empty());
    }

    #[tokio::test]
    async fn fetch_many_keeps_order_and_isolates_failures() {
        let blocked = Address::repeat_byte(0x09);
        let source = Arc::new(MockSource::new(10).with_failing_owner(blocked));
        let service = ApprovalService::new(source, &config());

        let results = service.fetch_many(&[owner(), blocked, owner()]).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(ScanError::Provider(SourceError::Rejected(_)))
        ));
        assert_eq!(
            results[2].as_ref().map(|c| c.address.clone()).ok(),
            Some(OWNER.to_lowercase())
        );
    }

    #[tokio::test]
    async fn malformed_logs_are_skipped_and_the_rest_kept() {
        let token = Address::repeat_byte(0xaa);
        let spender = Address::repeat_byte(0xbb);
        let nft = RawLog {
            address: Address::repeat_byte(0xcc),
            topics: vec![
                APPROVAL_EVENT_SIGNATURE,
                pad_topic(&owner()),
                pad_topic(&spender),
                B256::with_last_byte(7),
            ],
            data: Bytes::new(),
            block_number: Some(20),
            log_index: Some(0),
            transaction_hash: None,
        };
        let short = RawLog {
            address: Address::repeat_byte(0xdd),
            topics: vec![APPROVAL_EVENT_SIGNATURE, pad_topic(&owner()), pad_topic(&spender)],
            data: Bytes::from(vec![0u8; 16]),
            block_number: Some(30),
            log_index: Some(0),
            transaction_hash: None,
        };
        let source = Arc::new(
            MockSource::new(100)
                .with_logs(vec![
                    nft,
                    approval_log(token, owner(), spender, U256::from(77), 10, 0),
                    short,
                ])
                .with_token(token, "LINK", "ChainLink Token"),
        );
        let service = ApprovalService::new(Arc::clone(&source), &config());

        let collection = service.fetch_approvals(owner()).await.unwrap();

        assert_eq!(collection.total_events, 1);
        assert_eq!(collection.events[0].token_address, canonical(&token));
        assert_eq!(collection.events[0].value, "77");
        // metadata only for the token that parsed
        assert_eq!(source.metadata_calls(), 2);
    }
}
