//! Rendered strategy for outlets that build their listings with JavaScript.
//!
//! A browser session from the pool loads the home page, waits (bounded) for
//! `article_selector` to appear and collects up to `limit` article links. The
//! session is released before the article pages are fetched; those go through
//! plain HTTP and the general-purpose parser in [`extract`](super::extract),
//! which also resolves publish date, authors and keywords.
//!
//! Both phases stop on [`Shutdown`]. The session is never held while article
//! pages download, so cancelling there has nothing to release.

use super::browser::{BrowserPool, BrowserSession};
use super::extract::parse_article;
use super::http::PageFetcher;
use super::{Shutdown, resolve_links};
use crate::error::{Error, Result};
use crate::models::{Article, SourceConfig};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Fetch up to `limit` articles of one rendered outlet.
#[instrument(level = "info", skip_all, fields(source = %config.id))]
pub async fn fetch_outlet(
    pool: &BrowserPool,
    fetcher: &PageFetcher,
    config: &SourceConfig,
    limit: usize,
    render_timeout: Duration,
    shutdown: &mut Shutdown,
) -> Result<Vec<Article>> {
    let urls = index_articles(pool, config, limit, render_timeout, shutdown).await?;
    tokio::select! {
        articles = fetch_articles(fetcher, config, urls) => Ok(articles),
        _ = shutdown.cancelled() => Err(Error::Cancelled),
    }
}

/// Article URLs from the rendered home page.
///
/// The lease is released on success, on error and on shutdown alike.
pub async fn index_articles(
    pool: &BrowserPool,
    config: &SourceConfig,
    limit: usize,
    render_timeout: Duration,
    shutdown: &mut Shutdown,
) -> Result<Vec<String>> {
    let mut lease = tokio::select! {
        lease = pool.acquire() => lease?,
        _ = shutdown.cancelled() => return Err(Error::Cancelled),
    };

    let outcome = tokio::select! {
        links = discover_links(lease.session(), config, limit, render_timeout) => links,
        _ = shutdown.cancelled() => Err(Error::Cancelled),
    };
    lease.release().await;

    let hrefs = outcome?;
    let urls = resolve_links(&config.base_url, hrefs);
    info!(count = urls.len(), base_url = %config.base_url, "Indexed rendered article URLs");
    debug!(?urls, "Article URLs");
    Ok(urls)
}

async fn discover_links(
    session: &mut dyn BrowserSession,
    config: &SourceConfig,
    limit: usize,
    render_timeout: Duration,
) -> Result<Vec<String>> {
    session.navigate(config.base_url.as_str()).await?;
    session
        .wait_for_selector(&config.article_selector, render_timeout)
        .await?;
    let elements = session.query_selector_all(&config.article_selector).await?;
    Ok(elements
        .iter()
        .take(limit)
        .filter_map(|element| element.link())
        .collect())
}

async fn fetch_articles(fetcher: &PageFetcher, config: &SourceConfig, urls: Vec<String>) -> Vec<Article> {
    let articles: Vec<Article> = stream::iter(urls)
        .then(|url: String| async move {
            match fetch_article(fetcher, config, &url).await {
                Ok(article) => {
                    debug!(%url, "Fetched article");
                    Some(article)
                }
                Err(e @ Error::ExtractionFailure { .. }) => {
                    warn!(error = %e, "Skipping article");
                    None
                }
                Err(e) => {
                    error!(error = %e, %url, "Article fetch failed");
                    None
                }
            }
        })
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(count = articles.len(), source = %config.id, "Fetched article contents");
    articles
}

#[instrument(level = "debug", skip_all, fields(%url))]
async fn fetch_article(fetcher: &PageFetcher, config: &SourceConfig, url: &str) -> Result<Article> {
    let html = fetcher.get_html(url).await?;
    article_from_page(&html, config, url)
}

/// Build an [`Article`] with the general-purpose parser.
pub fn article_from_page(html: &str, config: &SourceConfig, url: &str) -> Result<Article> {
    let parsed = parse_article(html);
    let title = parsed.title.ok_or_else(|| Error::extraction(url, "no title found"))?;
    let content = parsed.text.ok_or_else(|| Error::extraction(url, "no article text found"))?;

    Ok(Article {
        title,
        content,
        url: url.to_string(),
        source_id: config.id.clone(),
        fetched_at: Utc::now(),
        published_at: parsed.published_at,
        authors: Some(parsed.authors).filter(|a| !a.is_empty()),
        keywords: Some(parsed.keywords).filter(|k| !k.is_empty()),
    })
}
