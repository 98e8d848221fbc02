use crate::codec::{APPROVAL_EVENT_SIGNATURE, UNKNOWN_TOKEN, canonical, normalize_amount};
use crate::config::ScanConfig;
use crate::events::decode_approval_event;
use crate::models::{ApprovalEvent, ApprovalEventCollection};
use crate::source::{LogSource, RawLog};
use crate::throttle::Throttle;
use alloy_primitives::{Address, B256, hex};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("not an Approval log (topic0 {0:?})")]
    NotApproval(Option<B256>),
    #[error("expected 3 topics, found {0}")]
    TopicCount(usize),
    #[error("data payload is {0} bytes, expected at least 32")]
    ShortData(usize),
    #[error("log has no block number")]
    MissingBlockNumber,
    #[error("failed to decode Approval: {0}")]
    Decode(String),
}

/// Where a log sits in the chain. Orders by block, then by index within the
/// block; a log without an index sorts before any indexed log of its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: Option<u64>,
}

/// The fields of one Approval log, before token metadata is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedApproval {
    pub token: Address,
    pub spender: Address,
    pub value: String,
    pub position: LogPosition,
    pub transaction_hash: Option<B256>,
}

/// An approval together with the position of the log it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedApproval {
    pub event: ApprovalEvent,
    pub position: LogPosition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
}

/// Validates one raw log and extracts spender, amount and emitting token.
///
/// ERC-721 shares the Approval signature but indexes the token id as a
/// fourth topic and carries no data; those logs are rejected here.
pub fn parse_log(log: &RawLog) -> Result<DecodedApproval, ParseError> {
    let signature = log.topics.first().copied();
    if signature != Some(APPROVAL_EVENT_SIGNATURE) {
        return Err(ParseError::NotApproval(signature));
    }
    if log.topics.len() != 3 {
        return Err(ParseError::TopicCount(log.topics.len()));
    }
    if log.data.len() < 32 {
        return Err(ParseError::ShortData(log.data.len()));
    }
    let block_number = log.block_number.ok_or(ParseError::MissingBlockNumber)?;

    let event = decode_approval_event(log).map_err(|e| ParseError::Decode(e.to_string()))?;

    Ok(DecodedApproval {
        token: log.address,
        spender: event.spender,
        value: normalize_amount(event.value),
        position: LogPosition {
            block_number,
            log_index: log.log_index,
        },
        transaction_hash: log.transaction_hash,
    })
}

/// Keeps one approval per (token, spender): the one from the latest log.
///
/// A later position strictly replaces an earlier one. When two entries share
/// the exact same position the first one seen is kept. Keys are compared in
/// lowercase. The output is ordered by position.
pub fn filter_latest_approvals(observed: Vec<ObservedApproval>) -> Vec<ApprovalEvent> {
    let mut latest: HashMap<(String, String), ObservedApproval> = HashMap::new();

    for approval in observed {
        let key = (
            approval.event.token_address.to_ascii_lowercase(),
            approval.event.spender.to_ascii_lowercase(),
        );
        match latest.entry(key) {
            Entry::Occupied(mut slot) => {
                if approval.position > slot.get().position {
                    slot.insert(approval);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(approval);
            }
        }
    }

    let mut survivors: Vec<ObservedApproval> = latest.into_values().collect();
    survivors.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.event.token_address.cmp(&b.event.token_address))
            .then_with(|| a.event.spender.cmp(&b.event.spender))
    });
    survivors.into_iter().map(|o| o.event).collect()
}

pub struct Reconciler<S> {
    source: Arc<S>,
    throttle: Throttle,
}

impl<S: LogSource> Reconciler<S> {
    pub fn new(source: Arc<S>, config: &ScanConfig) -> Self {
        Reconciler {
            source,
            throttle: Throttle::new(config.max_concurrent_lookups),
        }
    }

    /// Turns the raw logs of one scan into the current approval state of
    /// `owner`. Malformed logs are skipped with a warning.
    pub async fn reconcile(
        &self,
        logs: &[RawLog],
        owner: Address,
        latest_block: u64,
    ) -> ApprovalEventCollection {
        let owner = canonical(&owner);

        let mut observed = Vec::with_capacity(logs.len());
        let mut tokens = BTreeSet::new();
        for log in logs {
            match parse_log(log) {
                Ok(decoded) => {
                    tokens.insert(decoded.token);
                    observed.push(ObservedApproval {
                        event: ApprovalEvent {
                            token_address: canonical(&decoded.token),
                            token_symbol: None,
                            token_name: None,
                            owner: owner.clone(),
                            spender: canonical(&decoded.spender),
                            value: decoded.value,
                            block_number: decoded.position.block_number,
                            transaction_hash: decoded.transaction_hash.map(hex::encode_prefixed),
                        },
                        position: decoded.position,
                    });
                }
                Err(e) => warn!(
                    "Failed to parse log {:?} from {:?}: {}",
                    log.transaction_hash, log.address, e
                ),
            }
        }
        info!("Successfully parsed {} of {} approval logs", observed.len(), logs.len());

        let mut events = filter_latest_approvals(observed);
        info!(
            "After filtering duplicates: {} unique approvals remain",
            events.len()
        );

        // every token keeps at least one approval through deduplication
        let metadata: HashMap<String, TokenMetadata> = self
            .fetch_token_metadata(tokens)
            .await
            .into_iter()
            .map(|(token, meta)| (canonical(&token), meta))
            .collect();
        for event in &mut events {
            if let Some(meta) = metadata.get(&event.token_address) {
                event.token_symbol = meta.symbol.clone();
                event.token_name = meta.name.clone();
            }
        }

        ApprovalEventCollection::new(owner, latest_block, events)
    }

    /// Looks up symbol and name once per token. Lookups for this scan only;
    /// nothing is cached across scans.
    async fn fetch_token_metadata(
        &self,
        tokens: BTreeSet<Address>,
    ) -> HashMap<Address, TokenMetadata> {
        self.throttle
            .submit(tokens, |token| async move { (token, self.token_metadata(token).await) })
            .await
            .into_iter()
            .collect()
    }

    async fn token_metadata(&self, token: Address) -> TokenMetadata {
        let (symbol, name) = tokio::join!(
            self.source.token_symbol(token),
            self.source.token_name(token)
        );
        debug!("Token {:?}: symbol={:?} name={:?}", token, symbol, name);

        TokenMetadata {
            symbol: metadata_value(symbol),
            name: metadata_value(name),
        }
    }
}

fn metadata_value(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == UNKNOWN_TOKEN {
        None
    } else {
        Some(trimmed.to_string())
    }
}
