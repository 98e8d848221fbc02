use crate::models::{ApprovalEvent, ApprovalEventCollection};
use crate::price::PriceMap;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

pub const NO_APPROVALS: &str = "No approval events found.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "table" => OutputFormat::Table,
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Text,
        }
    }
}

pub fn format_collection(
    collection: &ApprovalEventCollection,
    prices: Option<&PriceMap>,
    format: &OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => format_approval_text(collection),
        OutputFormat::Table => format_approval_table(collection, prices),
        OutputFormat::Json => format_approval_json(collection, prices),
        OutputFormat::Csv => format_approval_csv(collection, prices),
    }
}

/// One `approval on <token> to <spender> on amount of <amount>` line per event.
pub fn format_approval_text(collection: &ApprovalEventCollection) -> String {
    let mut lines: Vec<String> = collection
        .events
        .iter()
        .map(|event| {
            format!(
                "approval on {} to {} on amount of {}",
                event.display_token(),
                event.spender,
                event.value
            )
        })
        .collect();

    if lines.is_empty() {
        lines.push(NO_APPROVALS.to_string());
    }
    if let Some(warning) = incomplete_warning(collection) {
        lines.push(warning);
    }

    lines.join("\n")
}

fn format_approval_table(collection: &ApprovalEventCollection, prices: Option<&PriceMap>) -> String {
    if collection.events.is_empty() {
        return match incomplete_warning(collection) {
            Some(warning) => format!("{NO_APPROVALS}\n{warning}"),
            None => NO_APPROVALS.to_string(),
        };
    }

    let mut header = vec!["Block", "Token", "Token Address", "Spender", "Amount"];
    if prices.is_some() {
        header.push("Price (USD)");
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);

    for event in &collection.events {
        let mut row = vec![
            Cell::new(event.block_number),
            Cell::new(event.display_token()),
            Cell::new(&event.token_address),
            Cell::new(&event.spender),
            Cell::new(&event.value),
        ];
        if let Some(prices) = prices {
            row.push(Cell::new(
                price_of(prices, event).map_or("N/A".to_string(), |p| p.to_string()),
            ));
        }
        table.add_row(row);
    }

    match incomplete_warning(collection) {
        Some(warning) => format!("{table}\n{warning}"),
        None => table.to_string(),
    }
}

fn format_approval_json(collection: &ApprovalEventCollection, prices: Option<&PriceMap>) -> String {
    let events: Vec<_> = collection
        .events
        .iter()
        .map(|event| {
            let mut value = json!({
                "token_address": event.token_address,
                "token_symbol": event.token_symbol,
                "token_name": event.token_name,
                "spender": event.spender,
                "value": event.value,
                "block_number": event.block_number,
                "transaction_hash": event.transaction_hash,
            });
            if let Some(prices) = prices {
                value["price_usd"] = json!(price_of(prices, event));
            }
            value
        })
        .collect();

    serde_json::to_string_pretty(&json!({
        "address": collection.address,
        "total_events": collection.total_events,
        "scanned_blocks": collection.scanned_blocks,
        "fetched_at": collection.fetched_at,
        "missing_ranges": collection.missing_ranges,
        "events": events,
    }))
    .unwrap_or_else(|_| "{}".to_string())
}

fn format_approval_csv(collection: &ApprovalEventCollection, prices: Option<&PriceMap>) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let mut header = vec![
        "owner",
        "block_number",
        "token_address",
        "token_symbol",
        "token_name",
        "spender",
        "value",
    ];
    if prices.is_some() {
        header.push("price_usd");
    }
    let _ = wtr.write_record(&header);

    for event in &collection.events {
        let mut record = vec![
            event.owner.clone(),
            event.block_number.to_string(),
            event.token_address.clone(),
            event.token_symbol.clone().unwrap_or_default(),
            event.token_name.clone().unwrap_or_default(),
            event.spender.clone(),
            event.value.clone(),
        ];
        if let Some(prices) = prices {
            record.push(price_of(prices, event).map_or(String::new(), |p| p.to_string()));
        }
        let _ = wtr.write_record(&record);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

fn price_of(prices: &PriceMap, event: &ApprovalEvent) -> Option<f64> {
    prices.get(&event.token_address).copied().flatten()
}

fn incomplete_warning(collection: &ApprovalEventCollection) -> Option<String> {
    if collection.is_complete() {
        return None;
    }
    let ranges: Vec<String> = collection
        .missing_ranges
        .iter()
        .map(ToString::to_string)
        .collect();
    Some(format!(
        "WARNING: scan incomplete, blocks {} could not be queried",
        ranges.join(", ")
    ))
}
