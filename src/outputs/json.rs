//! JSON persistence of fetch batches and aggregated reports.
//!
//! # Export record
//!
//! ```text
//! {
//!   "metadata": { "timestamp": "...", "total_articles": 2, "sources": ["dr", "tv2"] },
//!   "articles": [ { "title": ..., "content": ..., "url": ..., "source": ..., "timestamp": ... } ]
//! }
//! ```
//!
//! Parent directories are created as needed. A failed write may leave a
//! partial file behind; the failure is always reported as `ExportFailure`.

use crate::error::{Error, Result};
use crate::models::{AggregatedStats, Article};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExportMetadata {
    pub timestamp: DateTime<Utc>,
    pub total_articles: usize,
    /// Distinct source ids, sorted.
    pub sources: Vec<String>,
}

/// One exported fetch batch.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExportRecord {
    pub metadata: ExportMetadata,
    pub articles: Vec<Article>,
}

impl ExportRecord {
    pub fn new(articles: &[Article]) -> Self {
        Self {
            metadata: ExportMetadata {
                timestamp: Utc::now(),
                total_articles: articles.len(),
                sources: articles
                    .iter()
                    .map(|a| a.source_id.clone())
                    .unique()
                    .sorted()
                    .collect(),
            },
            articles: articles.to_vec(),
        }
    }
}

/// Aggregated statistics of every outlet in a run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AggregateReport {
    pub generated_at: DateTime<Utc>,
    pub outlets: Vec<AggregatedStats>,
}

/// Write `articles` as one [`ExportRecord`] to `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), articles = articles.len()))]
pub async fn export_articles(articles: &[Article], path: &Path) -> Result<()> {
    let record = ExportRecord::new(articles);
    write_json(&record, path).await?;
    info!(sources = ?record.metadata.sources, "Exported articles");
    Ok(())
}

/// Read an export written by [`export_articles`].
pub async fn read_export(path: &Path) -> Result<ExportRecord> {
    read_json(path).await
}

#[instrument(level = "info", skip_all, fields(path = %path.display(), outlets = stats.len()))]
pub async fn write_report(stats: &[AggregatedStats], path: &Path) -> Result<()> {
    let report = AggregateReport {
        generated_at: Utc::now(),
        outlets: stats.to_vec(),
    };
    write_json(&report, path).await?;
    info!("Wrote aggregate report");
    Ok(())
}

pub async fn read_report(path: &Path) -> Result<AggregateReport> {
    read_json(path).await
}

async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| export_failure(path, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create export dir");
            return Err(export_failure(path, e));
        }
    }

    fs::write(path, json).await.map_err(|e| {
        error!(error = %e, "Failed to write JSON");
        export_failure(path, e)
    })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).await.map_err(|e| export_failure(path, e))?;
    serde_json::from_str(&raw).map_err(|e| export_failure(path, e))
}

fn export_failure(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::ExportFailure {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(source: &str, url: &str) -> Article {
        Article {
            title: "Titel".to_string(),
            content: "Indhold".to_string(),
            url: url.to_string(),
            source_id: source.to_string(),
            fetched_at: Utc::now(),
            published_at: None,
            authors: Some(vec!["Redaktionen".to_string()]),
            keywords: None,
        }
    }

    #[test]
    fn test_record_metadata() {
        let articles = vec![
            article("tv2", "https://tv2.dk/1"),
            article("dr", "https://dr.dk/1"),
            article("tv2", "https://tv2.dk/2"),
        ];
        let record = ExportRecord::new(&articles);
        assert_eq!(record.metadata.total_articles, 3);
        assert_eq!(record.metadata.sources, vec!["dr", "tv2"]);
    }

    #[test]
    fn test_article_fields_use_export_names() {
        let value = serde_json::to_value(ExportRecord::new(&[article("dr", "https://dr.dk/1")])).unwrap();
        let first = &value["articles"][0];
        assert_eq!(first["source"], "dr");
        assert!(first.get("timestamp").is_some());
        assert!(first.get("source_id").is_none());
        assert!(first.get("keywords").is_none());
        assert_eq!(first["authors"][0], "Redaktionen");
        assert_eq!(value["metadata"]["total_articles"], 1);
    }

    #[tokio::test]
    async fn test_export_to_directory_path_fails() {
        let dir = std::env::temp_dir();
        let err = export_articles(&[], &dir).await.unwrap_err();
        assert!(matches!(err, Error::ExportFailure { .. }));
    }
}
