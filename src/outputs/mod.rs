//! Output generation.
//!
//! - [`json`]: export of fetched articles and the aggregated per-outlet report

pub mod json;

pub use json::{export_articles, write_report};
