//! Source registry: the validated set of outlets the orchestrator can fetch.
//!
//! The registry is built once at startup, either from the built-in table in
//! `config/sources.yaml` or from a YAML list supplied by the user. Every entry
//! is validated at load time, so a bad selector or base URL fails fast instead
//! of surfacing mid-fetch.

use crate::error::{Error, Result};
use crate::models::SourceConfig;
use scraper::Selector;
use std::collections::HashSet;
use tracing::info;

const BUILTIN_SOURCES: &str = include_str!("../config/sources.yaml");

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    /// Registry of the built-in Danish outlets.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_SOURCES)
    }

    /// Parse and validate a YAML list of [`SourceConfig`] entries.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let sources: Vec<SourceConfig> = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid source list: {e}")))?;
        Self::from_sources(sources)
    }

    /// Validate already-deserialized entries.
    pub fn from_sources(sources: Vec<SourceConfig>) -> Result<Self> {
        let mut seen = HashSet::new();
        for source in &sources {
            validate(source)?;
            if !seen.insert(source.id.as_str()) {
                return Err(Error::config(format!("duplicate source id '{}'", source.id)));
            }
        }
        info!(count = sources.len(), "Loaded source registry");
        Ok(Self { sources })
    }

    pub fn get(&self, source_id: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.id == source_id)
            .ok_or_else(|| Error::SourceNotFound(source_id.to_string()))
    }

    /// All outlets in configuration order.
    pub fn list_all(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }
}

fn validate(source: &SourceConfig) -> Result<()> {
    if source.id.trim().is_empty() {
        return Err(Error::config("source id must not be empty"));
    }
    match source.base_url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::config(format!(
                "source '{}': base_url must be http(s), got '{other}'",
                source.id
            )));
        }
    }
    for (field, selector) in [
        ("article_selector", &source.article_selector),
        ("title_selector", &source.title_selector),
        ("content_selector", &source.content_selector),
    ] {
        if selector.trim().is_empty() {
            return Err(Error::config(format!("source '{}': {field} is empty", source.id)));
        }
        if let Err(e) = Selector::parse(selector) {
            return Err(Error::config(format!(
                "source '{}': {field} '{selector}' is not a valid CSS selector: {e}",
                source.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_loads() {
        let registry = SourceRegistry::builtin().unwrap();
        assert_eq!(registry.list_all().len(), 12);

        let dr = registry.get("dr").unwrap();
        assert_eq!(dr.base_url.as_str(), "https://www.dr.dk/");
        assert!(!dr.requires_rendering);

        let tv2 = registry.get("tv2").unwrap();
        assert!(tv2.requires_rendering);
        assert_eq!(tv2.content_selector, ".article__body");
    }

    #[test]
    fn test_unknown_source_is_not_found() {
        let registry = SourceRegistry::builtin().unwrap();
        match registry.get("zetland") {
            Err(Error::SourceNotFound(id)) => assert_eq!(id, "zetland"),
            other => panic!("expected SourceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_selector_fails_at_load() {
        let yaml = r#"
- id: x
  base_url: https://example.dk
  article_selector: "..listing"
  title_selector: h1
  content_selector: .body
"#;
        let err = SourceRegistry::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("article_selector"));
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let yaml = r#"
- id: x
  base_url: ftp://example.dk
  article_selector: article
  title_selector: h1
  content_selector: .body
"#;
        assert!(matches!(SourceRegistry::from_yaml(yaml), Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = r#"
- id: x
  base_url: https://a.dk
  article_selector: article
  title_selector: h1
  content_selector: .body
- id: x
  base_url: https://b.dk
  article_selector: article
  title_selector: h1
  content_selector: .body
"#;
        let err = SourceRegistry::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rendering_flag_defaults_to_false() {
        let yaml = r#"
- id: x
  base_url: https://a.dk
  article_selector: article a
  title_selector: h1
  content_selector: .body
"#;
        let registry = SourceRegistry::from_yaml(yaml).unwrap();
        assert!(!registry.get("x").unwrap().requires_rendering);
        assert_eq!(registry.ids(), vec!["x".to_string()]);
    }
}
