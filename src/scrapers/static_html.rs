//! Static strategy for outlets whose markup is complete without scripts.
//!
//! 1. **Indexing**: GET the home page and take the first `limit` elements
//!    matching `article_selector`, resolving each link against the base URL.
//! 2. **Fetching**: GET every linked page and read title/content through the
//!    outlet's `title_selector` and `content_selector`.
//!
//! A listing element without a link, or an article page missing its title or
//! content, is skipped. Failed article fetches are logged and skipped without
//! failing the outlet.

use super::extract::page_metadata;
use super::http::PageFetcher;
use super::{element_link, resolve_links};
use crate::error::{Error, Result};
use crate::models::{Article, SourceConfig};
use crate::normalize::element_text;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use tracing::{debug, error, info, instrument, warn};

/// Fetch up to `limit` articles of one static outlet.
#[instrument(level = "info", skip_all, fields(source = %config.id))]
pub async fn fetch_outlet(fetcher: &PageFetcher, config: &SourceConfig, limit: usize) -> Result<Vec<Article>> {
    let urls = index_articles(fetcher, config, limit).await?;
    Ok(fetch_articles(fetcher, config, urls).await)
}

/// Article URLs from the outlet's home page.
#[instrument(level = "info", skip_all, fields(source = %config.id))]
pub async fn index_articles(fetcher: &PageFetcher, config: &SourceConfig, limit: usize) -> Result<Vec<String>> {
    let html = fetcher.get_html(config.base_url.as_str()).await?;
    let urls = listing_links(&html, config, limit)?;

    info!(count = urls.len(), base_url = %config.base_url, "Indexed article URLs");
    debug!(?urls, "Article URLs");
    Ok(urls)
}

/// Links of the first `limit` listing elements, resolved and de-duplicated.
pub fn listing_links(html: &str, config: &SourceConfig, limit: usize) -> Result<Vec<String>> {
    let selector = parse_selector(&config.article_selector)?;
    let document = Html::parse_document(html);
    let hrefs: Vec<String> = document
        .select(&selector)
        .take(limit)
        .filter_map(|element| element_link(&element))
        .collect();
    Ok(resolve_links(&config.base_url, hrefs))
}

async fn fetch_articles(fetcher: &PageFetcher, config: &SourceConfig, urls: Vec<String>) -> Vec<Article> {
    let articles: Vec<Article> = stream::iter(urls)
        .then(|url: String| async move {
            match fetch_article(fetcher, config, &url).await {
                Ok(Some(article)) => {
                    debug!(%url, "Fetched article");
                    Some(article)
                }
                Ok(None) => {
                    warn!(%url, "Article page lacks title or content; skipping");
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
async fn fetch_article(fetcher: &PageFetcher, config: &SourceConfig, url: &str) -> Result<Option<Article>> {
    let html = fetcher.get_html(url).await?;
    extract_article(&html, config, url)
}

/// Build an [`Article`] from a page using the outlet's selectors.
///
/// `Ok(None)` when the title or content target is missing or empty.
pub fn extract_article(html: &str, config: &SourceConfig, url: &str) -> Result<Option<Article>> {
    let title_selector = parse_selector(&config.title_selector)?;
    let content_selector = parse_selector(&config.content_selector)?;

    let (title, content) = {
        let document = Html::parse_document(html);
        let title = document.select(&title_selector).next().map(|el| element_text(&el));
        let content = document.select(&content_selector).next().map(|el| element_text(&el));
        (title, content)
    };

    let (Some(title), Some(content)) = (title, content) else {
        return Ok(None);
    };
    if title.is_empty() || content.is_empty() {
        return Ok(None);
    }

    let metadata = page_metadata(html);
    debug!(bytes = content.len(), "Parsed article");
    Ok(Some(Article {
        title,
        content,
        url: url.to_string(),
        source_id: config.id.clone(),
        fetched_at: Utc::now(),
        published_at: metadata.published_at,
        authors: Some(metadata.authors).filter(|a| !a.is_empty()),
        keywords: Some(metadata.keywords).filter(|k| !k.is_empty()),
    }))
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::config(format!("invalid selector '{selector}': {e}")))
}
