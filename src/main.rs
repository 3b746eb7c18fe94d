//! # Mediekompas
//!
//! Fetches articles from Danish news outlets, exports them as JSON, scores
//! every article for political bias and reports per-outlet statistics.
//!
//! ## Usage
//!
//! ```sh
//! mediekompas --export-path ./out/articles.json --report-path ./out/report.json
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Fetching**: Index and fetch every requested outlet (bounded concurrency)
//! 2. **Export**: Write the fetched articles to a JSON record
//! 3. **Scoring**: Blend lexicon and classifier scores per article (parallel, 12 at a time)
//! 4. **Aggregation**: Fold scores into per-outlet statistics and write the report

use clap::Parser;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use mediekompas::outputs::{export_articles, write_report};
use mediekompas::utils::{ensure_writable_dir, truncate_for_log};
use mediekompas::{
    AggregatedStats, AnalysisResult, AppConfig, Article, BiasAnalyzer, Error as ScoringError, Orchestrator,
    ScoringModels, Shutdown, aggregate, aggregate_by_source,
};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::Cli;

const PARALLEL_BATCH_SIZE: usize = 12;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("mediekompas starting up");

    let args = Cli::parse();
    debug!(?args.export_path, ?args.report_path, ?args.sources, "Parsed CLI arguments");

    let mut config = AppConfig::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let registry = Arc::new(config.registry()?);
    let source_ids = if args.sources.is_empty() {
        registry.ids()
    } else {
        args.sources.clone()
    };
    info!(outlets = ?source_ids, limit = config.fetch.limit, "Outlets requested");

    // Early check: ensure the export destination is writable
    let export_dir = parent_dir(&args.export_path);
    if let Err(e) = ensure_writable_dir(&export_dir).await {
        error!(
            path = %export_dir.display(),
            error = %e,
            "Export directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    // ---- Fetch ----
    let (trigger, shutdown) = Shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling in-flight fetches");
            trigger.trigger();
        }
    });

    let orchestrator = Orchestrator::from_config(Arc::clone(&registry), &config)?;
    let batch = orchestrator
        .fetch_batch_until(&source_ids, config.fetch.limit, shutdown)
        .await;
    for (source, articles) in &batch {
        info!(%source, count = articles.len(), "Fetched outlet");
    }
    let articles: Vec<Article> = batch.into_values().flatten().collect();
    info!(count = articles.len(), "Total articles to analyze");

    // ---- Export ----
    if let Err(e) = export_articles(&articles, &args.export_path).await {
        error!(error = %e, "Failed to write article export");
        return Err(e.into());
    }

    // ---- Scoring ----
    let models = ScoringModels::initialize(&config.inference).await;
    if let Some(e) = models.classifier().err() {
        if !args.rule_only {
            error!(error = %e, "Scoring models unavailable; rerun with --rule-only to score with the lexicon alone");
            models.shutdown().await;
            return Err(e.into());
        }
        warn!(error = %e, "Scoring models unavailable; using rule-based scores only");
    }

    let analyzer = BiasAnalyzer::new(models, &config.analysis);
    let results = analyze_all(&analyzer, &articles, args.rule_only).await;
    info!(
        total = articles.len(),
        scored = results.len(),
        failed = articles.len() - results.len(),
        "Completed article scoring"
    );

    // ---- Aggregation ----
    let stats = outlet_stats(&results, &source_ids);
    for s in &stats {
        info!(
            source = %s.source_id,
            sample_size = s.sample_size,
            mean_bias = ?s.mean_bias,
            median_bias = ?s.median_bias,
            std_dev_bias = ?s.std_dev_bias,
            "Outlet statistics"
        );
    }
    if let Some(report_path) = &args.report_path {
        if let Err(e) = write_report(&stats, report_path).await {
            error!(error = %e, "Failed to write aggregate report");
        }
    }

    analyzer.into_models().shutdown().await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// CLI flags take precedence over the configuration file.
fn apply_overrides(config: &mut AppConfig, args: &Cli) {
    if let Some(limit) = args.limit {
        config.fetch.limit = limit;
    }
    if let Some(concurrency) = args.concurrency {
        config.fetch.concurrency = concurrency;
    }
    if let Some(token) = &args.browserless_token {
        config.browserless.token = Some(token.clone());
    }
    if let Some(token) = &args.inference_token {
        config.inference.token = Some(token.clone());
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Score every article, 12 at a time. Articles whose scoring fails are
/// skipped; with `rule_only` they fall back to the lexicon score instead.
async fn analyze_all(analyzer: &BiasAnalyzer, articles: &[Article], rule_only: bool) -> Vec<AnalysisResult> {
    let models_ready = analyzer.models().is_available();

    stream::iter(articles.iter())
        .map(|article| async move {
            if !models_ready {
                return Some(analyzer.analyze_rule_only(article));
            }
            match analyzer.analyze(article).await {
                Ok(result) => Some(result),
                Err(e @ ScoringError::ModelUnavailable(_)) if rule_only => {
                    warn!(url = %article.url, error = %e, "Model call failed; using rule-based score");
                    Some(analyzer.analyze_rule_only(article))
                }
                Err(e) => {
                    error!(
                        url = %article.url,
                        source = %article.source_id,
                        error = %e,
                        content_preview = %truncate_for_log(&article.content, 120),
                        "Scoring failed; skipping article"
                    );
                    None
                }
            }
        })
        .buffer_unordered(PARALLEL_BATCH_SIZE)
        .filter_map(std::future::ready)
        .collect()
        .await
}

/// Stats for every requested outlet, including those that yielded nothing.
fn outlet_stats(results: &[AnalysisResult], source_ids: &[String]) -> Vec<AggregatedStats> {
    let mut stats = aggregate_by_source(results);
    for id in source_ids.iter().unique() {
        if !stats.iter().any(|s| &s.source_id == id) {
            stats.push(aggregate(&[], id));
        }
    }
    stats.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    stats
}
