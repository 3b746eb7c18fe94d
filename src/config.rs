//! YAML application configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration against the built-in outlet table. CLI flags are
//! applied on top of the loaded values in `main`.

use crate::analysis::lexicon::Lexicon;
use crate::error::{Error, Result};
use crate::models::SourceConfig;
use crate::registry::SourceRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub browserless: BrowserlessConfig,
    pub inference: InferenceConfig,
    pub analysis: AnalysisConfig,
    /// Replaces the built-in outlet table when present.
    pub sources: Option<Vec<SourceConfig>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Outlets fetched at the same time.
    pub concurrency: usize,
    /// Browser sessions available to rendered outlets.
    pub render_sessions: usize,
    /// Maximum articles per outlet.
    pub limit: usize,
    pub http_timeout_secs: u64,
    /// Bound on waiting for the listing selector on a rendered page.
    pub render_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            render_sessions: 1,
            limit: 10,
            http_timeout_secs: 20,
            render_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserlessConfig {
    pub url: String,
    pub token: Option<String>,
}

impl Default for BrowserlessConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Base URL; model ids are appended as path segments.
    pub base_url: String,
    pub classifier_model: String,
    pub ner_model: String,
    pub token: Option<String>,
    /// Classifier input is truncated to this many tokens.
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-inference.huggingface.co/models".to_string(),
            classifier_model: "Maltehb/danish-bert-botxo".to_string(),
            ner_model: "saattrupdan/nbailab-base-ner-scandi".to_string(),
            token: None,
            max_tokens: 512,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Weight of the rule-based score in the blend; the model gets the rest.
    pub blend_weight: f64,
    /// Number of most frequent words kept per article.
    pub top_words: usize,
    /// Replaces the built-in lexicons when present.
    pub lexicon: Option<Lexicon>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            blend_weight: 0.5,
            top_words: 10,
            lexicon: None,
        }
    }
}

impl AppConfig {
    /// Load from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)
                    .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
                let config = Self::from_yaml(&yaml)?;
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            None => {
                info!("No configuration file given; using defaults");
                Self::default()
            }
        };
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = if yaml.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("invalid config: {e}")))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.analysis.blend_weight) {
            return Err(Error::config(format!(
                "analysis.blend_weight must be within [0, 1], got {}",
                self.analysis.blend_weight
            )));
        }
        if self.fetch.limit == 0 {
            return Err(Error::config("fetch.limit must be at least 1"));
        }
        if let Some(lexicon) = &self.analysis.lexicon {
            lexicon.validate()?;
        }
        Ok(())
    }

    /// Registry from `sources`, or the built-in table.
    pub fn registry(&self) -> Result<SourceRegistry> {
        match &self.sources {
            Some(sources) => SourceRegistry::from_sources(sources.clone()),
            None => SourceRegistry::builtin(),
        }
    }
}
