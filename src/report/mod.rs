pub mod commands;
pub mod formatters;

pub use commands::cmd_scan;
pub use formatters::{OutputFormat, format_approval_text, format_collection};
