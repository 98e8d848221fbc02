pub mod api;
pub mod codec;
pub mod config;
pub mod events;
pub mod logging;
pub mod models;
pub mod price;
pub mod reconciler;
pub mod report;
pub mod rpc;
pub mod scanner;
pub mod service;
pub mod source;
#[cfg(test)]
mod testing;
pub mod throttle;

pub use models::{ApprovalEvent, ApprovalEventCollection, BlockRange};
pub use service::{ApprovalService, ScanError};
pub use source::{LogSource, RawLog, SourceError};
