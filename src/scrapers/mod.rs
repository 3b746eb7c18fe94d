//! Fetch orchestration across the configured outlets.
//!
//! Every outlet follows the same two-phase pattern:
//!
//! 1. **Indexing**: discover article URLs from the outlet's home page
//! 2. **Fetching**: download each URL and extract title and content
//!
//! How the home page is read depends on the outlet's strategy:
//!
//! | Strategy | Module | Listing source |
//! |----------|--------|----------------|
//! | Static | [`static_html`] | Raw HTML from a plain GET |
//! | Rendered | [`rendered`] | DOM of a headless browser session from the [`BrowserPool`] |
//!
//! The [`Orchestrator`] runs outlets concurrently (bounded by
//! `fetch.concurrency`) and isolates their failures: an unknown id, an
//! unreachable home page or a render timeout is logged and yields an empty
//! list for that outlet only. A batch can be cut short through [`Shutdown`];
//! outlets that have not finished return empty lists and any browser session
//! in use is released.

pub mod browser;
pub mod extract;
pub mod http;
pub mod rendered;
pub mod static_html;

use crate::config::{AppConfig, FetchConfig};
use crate::error::{Error, Result};
use crate::models::{Article, FetchStrategy};
use crate::registry::SourceRegistry;
use browser::{BrowserPool, BrowserlessFactory};
use futures::stream::{self, StreamExt};
use http::PageFetcher;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use url::Url;

pub(crate) static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// `href` of the element if it is a link, otherwise of its first link descendant.
pub fn element_link(element: &ElementRef<'_>) -> Option<String> {
    let own = element.value();
    if own.name() == "a" {
        if let Some(href) = own.attr("href") {
            return Some(href.to_string());
        }
    }
    element
        .select(&ANCHOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// Resolve `hrefs` against `base`, keeping http(s) URLs in first-seen order.
pub fn resolve_links(base: &Url, hrefs: Vec<String>) -> Vec<String> {
    hrefs
        .into_iter()
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
        .unique()
        .collect()
}

/// Cancellation signal observed by in-flight outlet fetches.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending half of a [`Shutdown`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_trigger, shutdown) = Self::channel();
        shutdown
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the trigger fires; pends forever if it was dropped unfired.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Runs fetch batches over the outlets of a [`SourceRegistry`].
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: Arc<SourceRegistry>,
    fetcher: PageFetcher,
    pool: BrowserPool,
    concurrency: usize,
    render_timeout: Duration,
}

impl Orchestrator {
    pub fn new(registry: Arc<SourceRegistry>, fetcher: PageFetcher, pool: BrowserPool, settings: &FetchConfig) -> Self {
        Self {
            registry,
            fetcher,
            pool,
            concurrency: settings.concurrency.max(1),
            render_timeout: settings.render_timeout(),
        }
    }

    /// Plain HTTP fetcher plus a Browserless-backed browser pool.
    pub fn from_config(registry: Arc<SourceRegistry>, config: &AppConfig) -> Result<Self> {
        let fetcher = PageFetcher::new(&config.fetch.user_agent, config.fetch.http_timeout())?;
        let factory = BrowserlessFactory::new(&config.browserless, &config.fetch.user_agent)?;
        let pool = BrowserPool::new(Arc::new(factory), config.fetch.render_sessions);
        Ok(Self::new(registry, fetcher, pool, &config.fetch))
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Fetch up to `limit` articles from each outlet in `source_ids`.
    ///
    /// Every requested id is a key of the result, with an empty list when the
    /// outlet failed.
    pub async fn fetch_batch(&self, source_ids: &[String], limit: usize) -> BTreeMap<String, Vec<Article>> {
        self.fetch_batch_until(source_ids, limit, Shutdown::never()).await
    }

    /// [`fetch_batch`](Self::fetch_batch) that stops early once `shutdown` fires.
    #[instrument(level = "info", skip_all, fields(outlets = source_ids.len(), limit = limit))]
    pub async fn fetch_batch_until(
        &self,
        source_ids: &[String],
        limit: usize,
        shutdown: Shutdown,
    ) -> BTreeMap<String, Vec<Article>> {
        let t0 = Instant::now();
        let ids: Vec<String> = source_ids.iter().unique().cloned().collect();

        let fetched: Vec<(String, Vec<Article>)> = stream::iter(ids)
            .map(|id| {
                let mut shutdown = shutdown.clone();
                async move {
                    let articles = self.fetch_isolated(&id, limit, &mut shutdown).await;
                    (id, articles)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let total: usize = fetched.iter().map(|(_, articles)| articles.len()).sum();
        info!(
            total_articles = total,
            elapsed_ms = t0.elapsed().as_millis(),
            cancelled = shutdown.is_cancelled(),
            "Fetch batch finished"
        );
        fetched.into_iter().collect()
    }

    async fn fetch_isolated(&self, source_id: &str, limit: usize, shutdown: &mut Shutdown) -> Vec<Article> {
        match self.fetch_source(source_id, limit, shutdown).await {
            Ok(articles) => {
                info!(source = source_id, count = articles.len(), "Outlet fetched");
                articles
            }
            Err(Error::Cancelled) => {
                info!(source = source_id, "Outlet fetch cancelled");
                Vec::new()
            }
            Err(e @ Error::FetchTimeout { .. }) => {
                warn!(source = source_id, error = %e, "Outlet timed out");
                Vec::new()
            }
            Err(e) => {
                error!(source = source_id, error = %e, "Outlet fetch failed");
                Vec::new()
            }
        }
    }

    /// Fetch one outlet without isolation; errors are returned to the caller.
    pub async fn fetch_source(&self, source_id: &str, limit: usize, shutdown: &mut Shutdown) -> Result<Vec<Article>> {
        let config = self.registry.get(source_id)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        if shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut articles = match config.strategy() {
            FetchStrategy::Static => {
                tokio::select! {
                    fetched = static_html::fetch_outlet(&self.fetcher, config, limit) => fetched?,
                    _ = shutdown.cancelled() => return Err(Error::Cancelled),
                }
            }
            FetchStrategy::Rendered => {
                rendered::fetch_outlet(&self.pool, &self.fetcher, config, limit, self.render_timeout, shutdown).await?
            }
        };
        articles.truncate(limit);
        Ok(articles)
    }
}
