//! Classifier and named-entity capabilities behind an explicit lifecycle.
//!
//! # Architecture
//!
//! - [`SequenceClassifier`] / [`EntityRecognizer`]: the two capabilities the
//!   analyzer consumes. Tests substitute their own implementations.
//! - [`HttpClassifier`] / [`HttpEntityRecognizer`]: bindings to a Hugging
//!   Face compatible inference endpoint.
//! - [`RetryPost`]: exponential backoff around inference requests that fail
//!   in transport or answer 5xx/429 (models answer 503 while warming up).
//!   Any other 4xx fails at once.
//! - [`ScoringModels`]: the service object. `initialize` probes both
//!   capabilities once and fails closed into an unavailable state;
//!   `shutdown` ends the lifecycle.
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::config::InferenceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::{Rng, rng};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

const PROBE_TEXT: &str = "Folketinget mødes i dag.";

/// Text → probability distribution over the classifier's classes.
#[async_trait]
pub trait SequenceClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Vec<f64>>;
}

/// A recognized entity span.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpan {
    pub text: String,
    pub label: String,
    /// Character offset of the span in the input, used for ordering.
    pub start: usize,
}

/// Text → entity spans with type labels.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>>;
}

/// POSTs JSON to one inference endpoint with backoff on failure.
pub struct RetryPost {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl fmt::Debug for RetryPost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPost")
            .field("endpoint", &self.endpoint)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl RetryPost {
    pub fn new(config: &InferenceConfig, model: &str) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ModelUnavailable(format!("cannot build inference client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/{}", config.base_url.trim_end_matches('/'), model),
            token: config.token.clone(),
            timeout,
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        })
    }

    /// Shorten the backoff, for tests against local stubs.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    async fn post_once(&self, body: &Value) -> Result<Value> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::from_reqwest(&self.endpoint, e, self.timeout))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let reason = format!("status {status}: {message}");
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(Error::FetchFailure {
                    url: self.endpoint.clone(),
                    reason,
                });
            }
            return Err(Error::ModelUnavailable(format!("{} rejected the request, {reason}", self.endpoint)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| Error::FetchFailure {
                url: self.endpoint.clone(),
                reason: format!("invalid JSON response: {e}"),
            })
    }

    #[instrument(level = "debug", skip_all, fields(endpoint = %self.endpoint))]
    pub async fn post(&self, body: &Value) -> Result<Value> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.post_once(body).await {
                Ok(value) => return Ok(value),
                Err(e @ Error::ModelUnavailable(_)) => {
                    error!(error = %e, "inference request rejected");
                    return Err(e);
                }
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "inference request exhausted retries"
                        );
                        return Err(Error::ModelUnavailable(e.to_string()));
                    }

                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1).min(16));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "inference request failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Cut `text` down to its first `max_tokens` whitespace-separated tokens.
pub fn truncate_tokens(text: &str, max_tokens: usize) -> String {
    text.split_whitespace()
        .take(max_tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassificationResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

/// Order label scores by class index (`LABEL_0`, `LABEL_1`, ...).
fn distribution_from(response: Value) -> Result<Vec<f64>> {
    let parsed: ClassificationResponse = serde_json::from_value(response)
        .map_err(|e| Error::ModelUnavailable(format!("unexpected classifier output: {e}")))?;
    let labels = match parsed {
        ClassificationResponse::Nested(mut batches) => {
            if batches.is_empty() {
                Vec::new()
            } else {
                batches.swap_remove(0)
            }
        }
        ClassificationResponse::Flat(labels) => labels,
    };
    if labels.is_empty() {
        return Err(Error::ModelUnavailable("classifier returned no labels".into()));
    }
    let mut indexed = Vec::with_capacity(labels.len());
    for label in labels {
        let Some(index) = class_index(&label.label) else {
            return Err(Error::ModelUnavailable(format!(
                "classifier label {:?} carries no class index",
                label.label
            )));
        };
        indexed.push((index, label.score));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, score)| score).collect())
}

fn class_index(label: &str) -> Option<usize> {
    label
        .rsplit(|c: char| !c.is_ascii_digit())
        .next()
        .and_then(|digits| digits.parse().ok())
}

pub struct HttpClassifier {
    inner: RetryPost,
    max_tokens: usize,
}

impl HttpClassifier {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        Ok(Self {
            inner: RetryPost::new(config, &config.classifier_model)?,
            max_tokens: config.max_tokens,
        })
    }

    pub fn from_parts(inner: RetryPost, max_tokens: usize) -> Self {
        Self { inner, max_tokens }
    }
}

#[async_trait]
impl SequenceClassifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<Vec<f64>> {
        let body = json!({
            "inputs": truncate_tokens(text, self.max_tokens),
            "parameters": { "top_k": null, "truncation": true, "max_length": self.max_tokens },
        });
        distribution_from(self.inner.post(&body).await?)
    }
}

#[derive(Debug, Deserialize)]
struct EntityGroup {
    #[serde(alias = "entity")]
    entity_group: String,
    word: String,
    #[serde(default)]
    start: usize,
}

pub struct HttpEntityRecognizer {
    inner: RetryPost,
    max_tokens: usize,
}

impl HttpEntityRecognizer {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        Ok(Self {
            inner: RetryPost::new(config, &config.ner_model)?,
            max_tokens: config.max_tokens,
        })
    }

    pub fn from_parts(inner: RetryPost, max_tokens: usize) -> Self {
        Self { inner, max_tokens }
    }
}

#[async_trait]
impl EntityRecognizer for HttpEntityRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>> {
        let body = json!({
            "inputs": truncate_tokens(text, self.max_tokens),
            "parameters": { "aggregation_strategy": "simple" },
        });
        let groups: Vec<EntityGroup> = serde_json::from_value(self.inner.post(&body).await?)
            .map_err(|e| Error::ModelUnavailable(format!("unexpected NER output: {e}")))?;
        Ok(groups
            .into_iter()
            .map(|g| EntitySpan {
                text: g.word.trim().to_string(),
                label: g.entity_group,
                start: g.start,
            })
            .collect())
    }
}

enum ModelState {
    Ready {
        classifier: Arc<dyn SequenceClassifier>,
        recognizer: Arc<dyn EntityRecognizer>,
    },
    Unavailable(String),
}

/// Classifier + NER service shared by every analysis task.
///
/// Both capabilities are `Send + Sync` and take `&self`, so concurrent
/// inference needs no further locking.
pub struct ScoringModels {
    state: ModelState,
}

impl fmt::Debug for ScoringModels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            ModelState::Ready { .. } => f.write_str("ScoringModels(ready)"),
            ModelState::Unavailable(reason) => write!(f, "ScoringModels(unavailable: {reason})"),
        }
    }
}

impl ScoringModels {
    /// Build the HTTP bindings and probe them once. Any failure leaves the
    /// service unavailable instead of aborting the process.
    #[instrument(level = "info", skip_all, fields(classifier = %config.classifier_model, ner = %config.ner_model))]
    pub async fn initialize(config: &InferenceConfig) -> Self {
        let t0 = Instant::now();
        let built = HttpClassifier::new(config).and_then(|classifier| {
            HttpEntityRecognizer::new(config).map(|recognizer| (classifier, recognizer))
        });
        let models = match built {
            Ok((classifier, recognizer)) => {
                Self::probe(Arc::new(classifier), Arc::new(recognizer)).await
            }
            Err(e) => Self::unavailable(e.to_string()),
        };
        info!(elapsed_ms = t0.elapsed().as_millis(), available = models.is_available(), "Scoring models initialized");
        models
    }

    /// Probe caller-supplied capabilities the same way `initialize` does.
    pub async fn probe(
        classifier: Arc<dyn SequenceClassifier>,
        recognizer: Arc<dyn EntityRecognizer>,
    ) -> Self {
        if let Err(e) = classifier.classify(PROBE_TEXT).await {
            warn!(error = %e, "Classifier failed to load");
            return Self::unavailable(format!("classifier: {e}"));
        }
        if let Err(e) = recognizer.recognize(PROBE_TEXT).await {
            warn!(error = %e, "Entity recognizer failed to load");
            return Self::unavailable(format!("entity recognizer: {e}"));
        }
        Self::ready(classifier, recognizer)
    }

    pub fn ready(classifier: Arc<dyn SequenceClassifier>, recognizer: Arc<dyn EntityRecognizer>) -> Self {
        Self {
            state: ModelState::Ready { classifier, recognizer },
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: ModelState::Unavailable(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, ModelState::Ready { .. })
    }

    pub fn classifier(&self) -> Result<&dyn SequenceClassifier> {
        match &self.state {
            ModelState::Ready { classifier, .. } => Ok(classifier.as_ref()),
            ModelState::Unavailable(reason) => Err(Error::ModelUnavailable(reason.clone())),
        }
    }

    pub fn recognizer(&self) -> Result<&dyn EntityRecognizer> {
        match &self.state {
            ModelState::Ready { recognizer, .. } => Ok(recognizer.as_ref()),
            ModelState::Unavailable(reason) => Err(Error::ModelUnavailable(reason.clone())),
        }
    }

    pub async fn shutdown(self) {
        match self.state {
            ModelState::Ready { .. } => info!("Scoring models shut down"),
            ModelState::Unavailable(reason) => info!(%reason, "Scoring models shut down (were unavailable)"),
        }
    }
}
