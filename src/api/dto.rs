use crate::models::{ApprovalEventCollection, BlockRange};
use crate::price::PriceMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEventResponse {
    pub owner: String,
    pub token_address: String,
    pub token_symbol: Option<String>,
    pub token_name: Option<String>,
    pub spender: String,
    pub value: String,
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
}

/// An owner whose scan skipped some block ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncompleteScan {
    pub address: String,
    pub missing_ranges: Vec<BlockRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalsResponse {
    pub events: Vec<ApprovalEventResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub incomplete: Vec<IncompleteScan>,
}

pub fn to_response(
    collections: &[ApprovalEventCollection],
    prices: Option<&PriceMap>,
) -> ApprovalsResponse {
    let events = collections
        .iter()
        .flat_map(|collection| collection.events.iter())
        .map(|event| ApprovalEventResponse {
            owner: event.owner.clone(),
            token_address: event.token_address.clone(),
            token_symbol: event.token_symbol.clone(),
            token_name: event.token_name.clone(),
            spender: event.spender.clone(),
            value: event.value.clone(),
            block_number: event.block_number,
            price_usd: prices
                .and_then(|prices| prices.get(&event.token_address))
                .copied()
                .flatten(),
        })
        .collect();

    let incomplete = collections
        .iter()
        .filter(|collection| !collection.is_complete())
        .map(|collection| IncompleteScan {
            address: collection.address.clone(),
            missing_ranges: collection.missing_ranges.clone(),
        })
        .collect();

    ApprovalsResponse { events, incomplete }
}
