use crate::models::ApprovalEventCollection;
use crate::price::{PriceMap, PriceService, PriceSource};
use crate::report::formatters::{OutputFormat, format_collection};
use crate::service::ApprovalService;
use crate::source::LogSource;
use alloy_primitives::Address;
use anyhow::Result;

/// Scans every owner, prints one report per owner and fails if any scan did.
///
/// Owners are scanned through [`ApprovalService::fetch_many`], so one failing
/// owner does not stop the reports for the others.
pub async fn cmd_scan<S, P>(
    service: &ApprovalService<S>,
    prices: Option<&PriceService<P>>,
    owners: &[Address],
    format: &OutputFormat,
) -> Result<()>
where
    S: LogSource,
    P: PriceSource,
{
    let results = service.fetch_many(owners).await;
    let multiple = owners.len() > 1;
    let mut failures = 0usize;

    for result in results {
        match result {
            Ok(collection) => {
                let price_map = match prices {
                    Some(prices) => Some(price_collection(prices, &collection).await),
                    None => None,
                };
                if multiple && matches!(format, OutputFormat::Text | OutputFormat::Table) {
                    println!("== {} ==", collection.address);
                }
                println!("{}", format_collection(&collection, price_map.as_ref(), format));
            }
            Err(e) => {
                eprintln!("Error: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} address scans failed", failures, owners.len());
    }
    Ok(())
}

async fn price_collection<P: PriceSource>(
    prices: &PriceService<P>,
    collection: &ApprovalEventCollection,
) -> PriceMap {
    let tokens: Vec<String> = collection
        .events
        .iter()
        .map(|event| event.token_address.clone())
        .collect();
    prices.fetch_prices(&tokens).await
}
