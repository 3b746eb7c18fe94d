//! Headless-browser sessions for outlets that render their listings client-side.
//!
//! A [`BrowserSession`] is stateful and serves one navigation at a time; every
//! method takes `&mut self`. Sessions are handed out by a [`BrowserPool`]
//! bounded by a semaphore, one session per concurrent rendering task. A
//! [`SessionLease`] must be given back with [`SessionLease::release`], which
//! closes the session; callers release on every exit path, including errors
//! and cancellation.
//!
//! The production binding talks to a [Browserless](https://www.browserless.io)
//! instance: `/content` renders the page, and `waitForSelector` makes it wait
//! for the listing markup before returning.

use super::ANCHOR;
use crate::config::BrowserlessConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument, warn};

/// Snapshot of one element matched on a rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedElement {
    pub outer_html: String,
}

impl RenderedElement {
    pub fn new(outer_html: impl Into<String>) -> Self {
        Self {
            outer_html: outer_html.into(),
        }
    }

    /// Attribute of the element itself.
    pub fn attribute(&self, name: &str) -> Option<String> {
        let fragment = Html::parse_fragment(&self.outer_html);
        let root = fragment.root_element().child_elements().next()?;
        root.value().attr(name).map(str::to_string)
    }

    /// `href` of the element if it is a link, otherwise of its first link
    /// descendant.
    pub fn link(&self) -> Option<String> {
        let fragment = Html::parse_fragment(&self.outer_html);
        fragment
            .select(&ANCHOR)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
    }
}

#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Wait until `selector` matches on the current page. Exceeding `timeout`
    /// is a `FetchTimeout`.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()>;

    async fn query_selector_all(&mut self, selector: &str) -> Result<Vec<RenderedElement>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens fresh sessions for the pool.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>>;
}

/// Bounded set of browser sessions.
#[derive(Clone)]
pub struct BrowserPool {
    factory: Arc<dyn SessionFactory>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl std::fmt::Debug for BrowserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserPool")
            .field("size", &self.size)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl BrowserPool {
    pub fn new(factory: Arc<dyn SessionFactory>, size: usize) -> Self {
        let size = size.max(1);
        info!(max_sessions = size, "Browser pool initialized");
        Self {
            factory,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Wait for a free slot and open a session in it.
    pub async fn acquire(&self) -> Result<SessionLease> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::config("browser pool closed"))?;
        let session = self.factory.open().await?;
        debug!(available = self.permits.available_permits(), "Browser session acquired");
        Ok(SessionLease {
            session,
            released: false,
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A session checked out of the pool. Give it back with [`release`](Self::release).
pub struct SessionLease {
    session: Box<dyn BrowserSession>,
    released: bool,
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    pub fn session(&mut self) -> &mut dyn BrowserSession {
        self.session.as_mut()
    }

    /// Close the session and free its pool slot.
    pub async fn release(mut self) {
        if let Err(e) = self.session.close().await {
            warn!(error = %e, "Closing browser session failed");
        }
        self.released = true;
        debug!("Browser session released");
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.released {
            warn!("Browser session dropped without release; its slot is freed but the session was not closed");
        }
    }
}

/// Session backed by a Browserless `/content` endpoint.
///
/// `navigate` renders the page once; `wait_for_selector` re-renders with
/// `waitForSelector` only if the snapshot does not match yet.
pub struct BrowserlessSession {
    client: reqwest::Client,
    endpoint: String,
    current_url: Option<String>,
    snapshot: Option<String>,
    closed: bool,
}

impl BrowserlessSession {
    pub fn new(client: reqwest::Client, config: &BrowserlessConfig) -> Self {
        let mut endpoint = format!("{}/content", config.url.trim_end_matches('/'));
        if let Some(token) = &config.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        Self {
            client,
            endpoint,
            current_url: None,
            snapshot: None,
            closed: false,
        }
    }

    fn current_url(&self) -> Result<String> {
        if self.closed {
            return Err(Error::FetchFailure {
                url: self.endpoint.clone(),
                reason: "browser session already closed".to_string(),
            });
        }
        self.current_url.clone().ok_or_else(|| Error::FetchFailure {
            url: self.endpoint.clone(),
            reason: "no page loaded".to_string(),
        })
    }

    async fn render(&self, url: &str, wait: Option<(&str, Duration)>) -> Result<String> {
        let mut body = json!({ "url": url });
        let mut request = self.client.post(&self.endpoint);
        if let Some((selector, timeout)) = wait {
            body["waitForSelector"] = json!({
                "selector": selector,
                "timeout": timeout.as_millis() as u64,
            });
            request = request.timeout(timeout + Duration::from_secs(15));
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(url, e, wait.map(|w| w.1).unwrap_or_default()))?;

        let status = response.status();
        if status == reqwest::StatusCode::REQUEST_TIMEOUT {
            return Err(Error::FetchTimeout {
                url: url.to_string(),
                after: wait.map(|w| w.1).unwrap_or_default(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::FetchFailure {
                url: url.to_string(),
                reason: format!("browserless status {status}: {message}"),
            });
        }
        response
            .text()
            .await
            .map_err(|e| Error::from_reqwest(url, e, Duration::default()))
    }
}

fn matches_selector(html: &str, selector: &str) -> Result<bool> {
    let selector = Selector::parse(selector)
        .map_err(|e| Error::config(format!("invalid selector '{selector}': {e}")))?;
    Ok(Html::parse_document(html).select(&selector).next().is_some())
}

fn select_elements(html: &str, selector: &str) -> Result<Vec<RenderedElement>> {
    let selector = Selector::parse(selector)
        .map_err(|e| Error::config(format!("invalid selector '{selector}': {e}")))?;
    Ok(Html::parse_document(html)
        .select(&selector)
        .map(|el| RenderedElement::new(el.html()))
        .collect())
}

#[async_trait]
impl BrowserSession for BrowserlessSession {
    #[instrument(level = "debug", skip(self))]
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.current_url = Some(url.to_string());
        self.snapshot = None;
        let current = self.current_url()?;
        let html = self.render(&current, None).await?;
        self.snapshot = Some(html);
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let url = self.current_url()?;
        if let Some(html) = &self.snapshot {
            if matches_selector(html, selector)? {
                return Ok(());
            }
        }

        let html = tokio::time::timeout(
            timeout + Duration::from_secs(15),
            self.render(&url, Some((selector, timeout))),
        )
        .await
        .map_err(|_| Error::FetchTimeout {
            url: url.clone(),
            after: timeout,
        })??;

        let found = matches_selector(&html, selector)?;
        self.snapshot = Some(html);
        if found {
            Ok(())
        } else {
            Err(Error::FetchTimeout { url, after: timeout })
        }
    }

    async fn query_selector_all(&mut self, selector: &str) -> Result<Vec<RenderedElement>> {
        let url = self.current_url()?;
        let html = self
            .snapshot
            .as_deref()
            .ok_or_else(|| Error::extraction(&url, "page has not been rendered"))?;
        select_elements(html, selector)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.current_url = None;
        self.snapshot = None;
        Ok(())
    }
}

/// Opens [`BrowserlessSession`]s sharing one connection pool.
pub struct BrowserlessFactory {
    client: reqwest::Client,
    config: BrowserlessConfig,
}

impl BrowserlessFactory {
    pub fn new(config: &BrowserlessConfig, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::config(format!("cannot build Browserless client: {e}")))?;
        info!(url = %config.url, "Browserless factory initialized");
        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl SessionFactory for BrowserlessFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(BrowserlessSession::new(self.client.clone(), &self.config)))
    }
}
