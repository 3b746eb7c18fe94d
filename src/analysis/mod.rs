//! Bias scoring engine.
//!
//! Each article gets two independent signals:
//!
//! 1. **Rule-based score** from the weighted [`Lexicon`]:
//!    `(right - left) / (left + right)`, or 0 without lexicon hits.
//! 2. **Model score**: the class-1 probability of the sequence classifier.
//!
//! They are blended as `w * rule + (1 - w) * model` with `w = 0.5` by default.
//! Confidence is `min((left + right) / 10, 1)` and only reflects lexicon
//! evidence; low confidence does not mean the model score is wrong.
//!
//! When the models are unavailable, [`BiasAnalyzer::analyze`] fails with
//! `ModelUnavailable`. Callers that accept a degraded score call
//! [`BiasAnalyzer::analyze_rule_only`] explicitly.

pub mod inference;
pub mod lexicon;

use crate::config::AnalysisConfig;
use crate::error::{Error, Result};
use crate::models::{AnalysisResult, Article, Citation, EntityType};
use inference::{EntitySpan, ScoringModels};
use lexicon::{Lexicon, LexiconHits, top_words, word_counts};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Lexicon evidence for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvidence {
    pub hits: LexiconHits,
    pub rule_based_score: f64,
    pub confidence: f64,
    pub word_frequencies: BTreeMap<String, usize>,
}

#[derive(Debug)]
pub struct BiasAnalyzer {
    lexicon: Lexicon,
    models: ScoringModels,
    blend_weight: f64,
    top_words: usize,
}

impl BiasAnalyzer {
    pub fn new(models: ScoringModels, config: &AnalysisConfig) -> Self {
        Self {
            lexicon: config.lexicon.clone().unwrap_or_default(),
            models,
            blend_weight: config.blend_weight,
            top_words: config.top_words,
        }
    }

    pub fn models(&self) -> &ScoringModels {
        &self.models
    }

    /// Hand the models back for shutdown.
    pub fn into_models(self) -> ScoringModels {
        self.models
    }

    /// Lexicon scoring only; pure and deterministic.
    pub fn score_rules(&self, text: &str) -> RuleEvidence {
        let counts = word_counts(text);
        let hits = self.lexicon.hits(&counts);
        RuleEvidence {
            hits,
            rule_based_score: hits.rule_score(),
            confidence: hits.confidence(),
            word_frequencies: top_words(&counts, self.top_words),
        }
    }

    pub fn blend(&self, rule_based_score: f64, model_score: f64) -> f64 {
        self.blend_weight * rule_based_score + (1.0 - self.blend_weight) * model_score
    }

    #[instrument(level = "debug", skip_all, fields(url = %article.url, source = %article.source_id))]
    pub async fn analyze(&self, article: &Article) -> Result<AnalysisResult> {
        let classifier = self.models.classifier()?;
        let recognizer = self.models.recognizer()?;

        let evidence = self.score_rules(&article.content);
        let distribution = classifier.classify(&article.content).await?;
        let model_score = class_one_probability(&distribution)?;
        let citations = citations_from(recognizer.recognize(&article.content).await?);

        let bias_score = self.blend(evidence.rule_based_score, model_score);
        debug!(
            bias_score,
            rule_based_score = evidence.rule_based_score,
            model_score,
            confidence = evidence.confidence,
            citations = citations.len(),
            "Analyzed article"
        );

        Ok(AnalysisResult {
            source_id: article.source_id.clone(),
            url: article.url.clone(),
            bias_score,
            confidence: evidence.confidence,
            rule_based_score: evidence.rule_based_score,
            model_score: Some(model_score),
            word_frequencies: evidence.word_frequencies,
            citations,
        })
    }

    /// Degraded scoring without the classifier or NER: the bias score is the
    /// rule-based score and there are no citations.
    pub fn analyze_rule_only(&self, article: &Article) -> AnalysisResult {
        let evidence = self.score_rules(&article.content);
        AnalysisResult {
            source_id: article.source_id.clone(),
            url: article.url.clone(),
            bias_score: evidence.rule_based_score,
            confidence: evidence.confidence,
            rule_based_score: evidence.rule_based_score,
            model_score: None,
            word_frequencies: evidence.word_frequencies,
            citations: Vec::new(),
        }
    }
}

fn class_one_probability(distribution: &[f64]) -> Result<f64> {
    match distribution.get(1) {
        Some(p) if p.is_finite() => Ok(p.clamp(0.0, 1.0)),
        Some(p) => Err(Error::ModelUnavailable(format!("classifier returned non-finite probability {p}"))),
        None => Err(Error::ModelUnavailable(format!(
            "classifier returned {} classes, expected 2",
            distribution.len()
        ))),
    }
}

/// Persons and organizations in order of appearance, duplicates kept.
pub fn citations_from(mut spans: Vec<EntitySpan>) -> Vec<Citation> {
    spans.sort_by_key(|span| span.start);
    spans
        .into_iter()
        .filter_map(|span| {
            EntityType::from_label(&span.label).map(|entity_type| Citation {
                text: span.text,
                entity_type,
            })
        })
        .filter(|citation| !citation.text.is_empty())
        .collect()
}
