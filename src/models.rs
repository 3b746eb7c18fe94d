//! Data models for outlets, fetched articles and their bias scores.
//!
//! This module defines the records that flow through the pipeline:
//! - [`SourceConfig`]: one outlet's fetch configuration
//! - [`Article`]: a fetched and normalized article
//! - [`AnalysisResult`]: the bias score of exactly one article
//! - [`AggregatedStats`]: per-outlet statistics over a batch of results
//!
//! All records are plain serde data so the web layer can marshal them to any
//! wire format. Serialized field names are snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// How an outlet's listing page has to be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Server-delivered HTML, parsed directly.
    Static,
    /// Client-side rendered; needs a headless browser session.
    Rendered,
}

/// Fetch configuration of a single outlet.
///
/// Loaded once by the [`SourceRegistry`](crate::registry::SourceRegistry),
/// validated there, and shared read-only by every fetch task.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Short identifier, e.g. `"dr"`.
    pub id: String,
    /// Outlet home page; relative listing links resolve against it.
    pub base_url: Url,
    /// Selects the listing elements on the home page.
    pub article_selector: String,
    /// Selects the headline on an article page.
    pub title_selector: String,
    /// Selects the body container on an article page.
    pub content_selector: String,
    /// Whether the home page needs script execution before links appear.
    #[serde(default)]
    pub requires_rendering: bool,
}

impl SourceConfig {
    pub fn strategy(&self) -> FetchStrategy {
        if self.requires_rendering {
            FetchStrategy::Rendered
        } else {
            FetchStrategy::Static
        }
    }
}

/// A fetched article with normalized text.
///
/// `content` is never empty: pages without body text are dropped during
/// extraction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    pub title: String,
    pub content: String,
    pub url: String,
    #[serde(rename = "source")]
    pub source_id: String,
    #[serde(rename = "timestamp")]
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

/// Named-entity category kept as a citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum EntityType {
    #[serde(rename = "PER")]
    Person,
    #[serde(rename = "ORG")]
    Organization,
}

impl EntityType {
    /// Map a recognizer label (`PER`, `B-PER`, `PERSON`, `ORG`, ...) to a
    /// citation type. Other labels are not citations.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label
            .trim()
            .trim_start_matches("B-")
            .trim_start_matches("I-")
            .to_ascii_uppercase();
        match label.as_str() {
            "PER" | "PERSON" => Some(EntityType::Person),
            "ORG" | "ORGANIZATION" => Some(EntityType::Organization),
            _ => None,
        }
    }
}

/// A person or organization mentioned in an article.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Citation {
    pub text: String,
    pub entity_type: EntityType,
}

/// Bias score of one article.
///
/// `bias_score` is conventionally in [-1, 1]: negative leans left, positive
/// leans right. `confidence` only measures lexicon evidence density, so a low
/// confidence says nothing about the model score.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalysisResult {
    pub source_id: String,
    pub url: String,
    pub bias_score: f64,
    pub confidence: f64,
    pub rule_based_score: f64,
    /// Class-1 probability from the classifier; `None` in rule-only mode.
    pub model_score: Option<f64>,
    /// Top-N non-stop-word token counts.
    pub word_frequencies: BTreeMap<String, usize>,
    /// Persons and organizations in order of first appearance, duplicates kept.
    pub citations: Vec<Citation>,
}

/// Bias score quartiles. `None` when the sample is empty.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Percentiles {
    #[serde(rename = "25")]
    pub p25: Option<f64>,
    #[serde(rename = "50")]
    pub p50: Option<f64>,
    #[serde(rename = "75")]
    pub p75: Option<f64>,
}

/// Per-outlet statistics over a finite batch of [`AnalysisResult`]s.
///
/// Every numeric field except `sample_size` is `None` ("undefined") for an
/// empty batch; zero would read as a neutral outlet.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregatedStats {
    pub source_id: String,
    pub sample_size: usize,
    pub mean_bias: Option<f64>,
    pub median_bias: Option<f64>,
    pub std_dev_bias: Option<f64>,
    pub mean_confidence: Option<f64>,
    pub mean_model_score: Option<f64>,
    pub percentiles: Percentiles,
}
