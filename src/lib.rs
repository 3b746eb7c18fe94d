//! # Mediekompas
//!
//! Collects articles from Danish news outlets, normalizes their text and
//! scores each article for political bias by blending a weighted-lexicon rule
//! score with a text classifier. Per-outlet statistics are aggregated for
//! comparative reporting.
//!
//! ## Pipeline
//!
//! 1. [`SourceRegistry`] holds the validated outlet table
//! 2. [`Orchestrator::fetch_batch`] fetches outlets concurrently, static or rendered
//! 3. [`outputs::export_articles`] persists the batch as JSON
//! 4. [`BiasAnalyzer::analyze`] scores each [`Article`]
//! 5. [`aggregate()`] / [`aggregate_by_source`] fold results into [`AggregatedStats`]

pub mod aggregate;
pub mod analysis;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod outputs;
pub mod registry;
pub mod scrapers;
pub mod utils;

pub use aggregate::{aggregate, aggregate_by_source};
pub use analysis::BiasAnalyzer;
pub use analysis::inference::ScoringModels;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use models::{AggregatedStats, AnalysisResult, Article, Citation, EntityType, FetchStrategy, SourceConfig};
pub use registry::SourceRegistry;
pub use scrapers::{Orchestrator, Shutdown, ShutdownTrigger};
