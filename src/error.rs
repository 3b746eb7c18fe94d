//! Error taxonomy shared by the fetch, scoring and export stages.
//!
//! Article- and outlet-scoped variants (`FetchTimeout`, `FetchFailure`,
//! `ExtractionFailure`) are caught inside the orchestrator and only logged.
//! `ModelUnavailable` and `ExportFailure` reach the caller.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown news source: {0}")]
    SourceNotFound(String),

    #[error("timed out after {after:?} waiting for {url}")]
    FetchTimeout { url: String, after: Duration },

    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("extraction failed for {url}: {reason}")]
    ExtractionFailure { url: String, reason: String },

    #[error("scoring model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("export to {path} failed: {reason}")]
    ExportFailure { path: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled by batch shutdown")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify a transport error for `url`.
    pub fn from_reqwest(url: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Error::FetchTimeout {
                url: url.to_string(),
                after: timeout,
            }
        } else {
            Error::FetchFailure {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    pub fn extraction(url: &str, reason: impl Into<String>) -> Self {
        Error::ExtractionFailure {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Error::Config(reason.into())
    }
}
