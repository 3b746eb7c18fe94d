use async_trait::async_trait;
use httpmock::prelude::*;
use mediekompas::config::FetchConfig;
use mediekompas::scrapers::browser::{BrowserPool, BrowserSession, RenderedElement, SessionFactory};
use mediekompas::scrapers::http::PageFetcher;
use mediekompas::{Error, Orchestrator, Result, Shutdown, SourceConfig, SourceRegistry};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use url::Url;

const LISTING: &str = r#"
<html><body>
  <article><a href="/nyheder/1">Første</a></article>
  <article><a href="/nyheder/2">Anden</a></article>
  <article><a href="/nyheder/3">Tredje</a></article>
</body></html>"#;

fn article_page(title: &str, body: &str) -> String {
    format!(r#"<html><body><h1>{title}</h1><div class="body"><p>{body}</p></div></body></html>"#)
}

fn static_source(id: &str, base_url: &str) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        base_url: Url::parse(base_url).unwrap(),
        article_selector: "article a".to_string(),
        title_selector: "h1".to_string(),
        content_selector: ".body".to_string(),
        requires_rendering: false,
    }
}

fn rendered_source(id: &str, base_url: &str) -> SourceConfig {
    SourceConfig {
        requires_rendering: true,
        article_selector: "article".to_string(),
        ..static_source(id, base_url)
    }
}

/// Mount the listing and three article pages; the second page has no body.
async fn mount_outlet(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).header("content-type", "text/html").body(LISTING);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/nyheder/1");
            then.status(200)
                .body(article_page("Skattelettelser vedtaget", "Folketinget vedtog i dag en reform."));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/nyheder/2");
            then.status(200).body("<html><body><h1>Kun overskrift</h1></body></html>");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/nyheder/3");
            then.status(200)
                .body(article_page("Ny velfærdsaftale", "Kommunerne får flere midler."));
        })
        .await;
}

#[derive(Default)]
struct SessionCounts {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

enum Behaviour {
    /// Listing renders with the given hrefs.
    Links(Vec<String>),
    /// The selector never appears.
    TimesOut,
    /// Waiting never finishes on its own.
    Hangs,
}

struct StubSession {
    behaviour: Arc<Behaviour>,
    counts: Arc<SessionCounts>,
}

#[async_trait]
impl BrowserSession for StubSession {
    async fn navigate(&mut self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn wait_for_selector(&mut self, _selector: &str, timeout: Duration) -> Result<()> {
        match self.behaviour.as_ref() {
            Behaviour::Links(_) => Ok(()),
            Behaviour::TimesOut => Err(Error::FetchTimeout {
                url: "stub".to_string(),
                after: timeout,
            }),
            Behaviour::Hangs => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn query_selector_all(&mut self, _selector: &str) -> Result<Vec<RenderedElement>> {
        match self.behaviour.as_ref() {
            Behaviour::Links(hrefs) => Ok(hrefs
                .iter()
                .map(|href| RenderedElement::new(format!(r#"<article><a href="{href}">x</a></article>"#)))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.counts.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct StubFactory {
    behaviour: Arc<Behaviour>,
    counts: Arc<SessionCounts>,
}

#[async_trait]
impl SessionFactory for StubFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>> {
        self.counts.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            behaviour: Arc::clone(&self.behaviour),
            counts: Arc::clone(&self.counts),
        }))
    }
}

fn orchestrator(sources: Vec<SourceConfig>, behaviour: Behaviour) -> (Orchestrator, Arc<SessionCounts>) {
    orchestrator_with(sources, behaviour, 3)
}

fn orchestrator_with(
    sources: Vec<SourceConfig>,
    behaviour: Behaviour,
    concurrency: usize,
) -> (Orchestrator, Arc<SessionCounts>) {
    let registry = Arc::new(SourceRegistry::from_sources(sources).unwrap());
    let fetcher = PageFetcher::new("mediekompas-test", Duration::from_secs(5)).unwrap();
    let counts = Arc::new(SessionCounts::default());
    let factory = StubFactory {
        behaviour: Arc::new(behaviour),
        counts: Arc::clone(&counts),
    };
    let pool = BrowserPool::new(Arc::new(factory), 1);
    let settings = FetchConfig {
        concurrency,
        render_timeout_secs: 1,
        ..FetchConfig::default()
    };
    (Orchestrator::new(registry, fetcher, pool, &settings), counts)
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_static_outlet_skips_page_without_content() {
    let server = MockServer::start_async().await;
    mount_outlet(&server).await;

    let (orchestrator, _) = orchestrator(vec![static_source("x", &server.base_url())], Behaviour::TimesOut);
    let batch = orchestrator.fetch_batch(&ids(&["x"]), 10).await;

    let articles = &batch["x"];
    assert_eq!(articles.len(), 2);
    let mut titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["Ny velfærdsaftale", "Skattelettelser vedtaget"]);
    for article in articles {
        assert_eq!(article.source_id, "x");
        assert!(!article.content.is_empty());
        assert!(article.url.starts_with(&server.base_url()));
    }
}

#[tokio::test]
async fn test_limit_is_respected() {
    let server = MockServer::start_async().await;
    mount_outlet(&server).await;

    let (orchestrator, _) = orchestrator(vec![static_source("x", &server.base_url())], Behaviour::TimesOut);
    let batch = orchestrator.fetch_batch(&ids(&["x"]), 1).await;

    assert_eq!(batch["x"].len(), 1);
    assert_eq!(batch["x"][0].url, server.url("/nyheder/1"));
}

#[tokio::test]
async fn test_failures_are_isolated_per_outlet() {
    let server = MockServer::start_async().await;
    mount_outlet(&server).await;

    let sources = vec![
        static_source("x", &server.base_url()),
        static_source("nede", "http://127.0.0.1:1/"),
    ];
    let (orchestrator, _) = orchestrator(sources, Behaviour::TimesOut);
    let batch = orchestrator.fetch_batch(&ids(&["x", "ukendt", "nede"]), 10).await;

    assert_eq!(batch.len(), 3);
    assert_eq!(batch["x"].len(), 2);
    assert!(batch["ukendt"].is_empty());
    assert!(batch["nede"].is_empty());
}

#[tokio::test]
async fn test_listing_error_status_yields_empty_outlet() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(503);
        })
        .await;

    let (orchestrator, _) = orchestrator(vec![static_source("x", &server.base_url())], Behaviour::TimesOut);
    let mut shutdown = Shutdown::never();
    let err = orchestrator.fetch_source("x", 10, &mut shutdown).await.unwrap_err();
    assert!(matches!(err, Error::FetchFailure { .. }));

    let batch = orchestrator.fetch_batch(&ids(&["x"]), 10).await;
    assert!(batch["x"].is_empty());
}

#[tokio::test]
async fn test_rendered_outlet_releases_session() {
    let server = MockServer::start_async().await;
    mount_outlet(&server).await;

    let hrefs = vec!["/nyheder/1".to_string(), "/nyheder/3".to_string(), "/nyheder/1".to_string()];
    let (orchestrator, counts) = orchestrator(vec![rendered_source("r", &server.base_url())], Behaviour::Links(hrefs));
    let batch = orchestrator.fetch_batch(&ids(&["r"]), 10).await;

    assert_eq!(batch["r"].len(), 2);
    assert_eq!(counts.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rendered_timeout_is_isolated_and_released() {
    let server = MockServer::start_async().await;
    mount_outlet(&server).await;

    let sources = vec![
        rendered_source("r", &server.base_url()),
        static_source("x", &server.base_url()),
    ];
    let (orchestrator, counts) = orchestrator(sources, Behaviour::TimesOut);
    let batch = orchestrator.fetch_batch(&ids(&["r", "x"]), 10).await;

    assert!(batch["r"].is_empty());
    assert_eq!(batch["x"].len(), 2);
    assert_eq!(counts.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_rendered_wait() {
    let server = MockServer::start_async().await;
    mount_outlet(&server).await;

    let (orchestrator, counts) = orchestrator(vec![rendered_source("r", &server.base_url())], Behaviour::Hangs);
    let (trigger, shutdown) = Shutdown::channel();

    let requested = ids(&["r"]);
    let fetch = orchestrator.fetch_batch_until(&requested, 10, shutdown);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
    };
    let (batch, _) = tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(fetch, cancel) })
        .await
        .expect("cancelled batch must finish");

    assert!(batch["r"].is_empty());
    assert_eq!(counts.closed.load(Ordering::SeqCst), counts.opened.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_shutdown_cancels_slow_article_pages() {
    let server = MockServer::start_async().await;
    for n in 1..=3 {
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/langsom/{n}"));
                then.status(200)
                    .delay(Duration::from_secs(3))
                    .body(article_page("Sen artikel", "Indholdet kommer for sent."));
            })
            .await;
    }

    let hrefs = (1..=3).map(|n| format!("/langsom/{n}")).collect();
    let (orchestrator, counts) = orchestrator(vec![rendered_source("r", &server.base_url())], Behaviour::Links(hrefs));
    let (trigger, shutdown) = Shutdown::channel();

    let requested = ids(&["r"]);
    let t0 = Instant::now();
    let fetch = orchestrator.fetch_batch_until(&requested, 10, shutdown);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.trigger();
    };
    let (batch, _) = tokio::join!(fetch, cancel);

    assert!(t0.elapsed() < Duration::from_millis(1500));
    assert!(batch["r"].is_empty());
    assert_eq!(counts.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counts.closed.load(Ordering::SeqCst), 1);
}

/// Mount a listing that answers after `delay` and links to nothing.
async fn mount_slow_listing(server: &MockServer, delay: Duration) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).delay(delay).body("<html><body></body></html>");
        })
        .await;
}

async fn timed_batch(concurrency: usize) -> Duration {
    let first = MockServer::start_async().await;
    let second = MockServer::start_async().await;
    mount_slow_listing(&first, Duration::from_millis(400)).await;
    mount_slow_listing(&second, Duration::from_millis(400)).await;

    let sources = vec![
        static_source("a", &first.base_url()),
        static_source("b", &second.base_url()),
    ];
    let (orchestrator, _) = orchestrator_with(sources, Behaviour::TimesOut, concurrency);
    let t0 = Instant::now();
    let batch = orchestrator.fetch_batch(&ids(&["a", "b"]), 10).await;
    assert_eq!(batch.len(), 2);
    t0.elapsed()
}

#[tokio::test]
async fn test_concurrency_one_runs_outlets_in_sequence() {
    assert!(timed_batch(1).await >= Duration::from_millis(800));
}

#[tokio::test]
async fn test_concurrency_two_overlaps_outlets() {
    assert!(timed_batch(2).await < Duration::from_millis(750));
}

#[tokio::test]
async fn test_shutdown_before_start_returns_empty_lists() {
    let server = MockServer::start_async().await;
    mount_outlet(&server).await;

    let (orchestrator, _) = orchestrator(vec![static_source("x", &server.base_url())], Behaviour::TimesOut);
    let (trigger, shutdown) = Shutdown::channel();
    trigger.trigger();

    let batch = orchestrator.fetch_batch_until(&ids(&["x"]), 10, shutdown).await;
    assert!(batch["x"].is_empty());
}
