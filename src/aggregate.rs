//! Per-outlet statistics over a finished batch of analysis results.
//!
//! Aggregates are recomputed from the full result list every time; nothing is
//! updated incrementally. Standard deviation is the population form and
//! percentiles interpolate linearly between closest ranks.

use crate::models::{AggregatedStats, AnalysisResult, Percentiles};
use itertools::Itertools;
use tracing::debug;

/// Fold the results of one outlet into [`AggregatedStats`].
///
/// An empty slice yields `sample_size == 0` and `None` for every statistic.
pub fn aggregate(results: &[AnalysisResult], source_id: &str) -> AggregatedStats {
    let biases: Vec<f64> = results.iter().map(|r| r.bias_score).collect();
    let confidences: Vec<f64> = results.iter().map(|r| r.confidence).collect();
    let model_scores: Vec<f64> = results.iter().filter_map(|r| r.model_score).collect();

    let sorted = sorted(&biases);
    let stats = AggregatedStats {
        source_id: source_id.to_string(),
        sample_size: results.len(),
        mean_bias: mean(&biases),
        median_bias: percentile(&sorted, 50.0),
        std_dev_bias: std_dev(&biases),
        mean_confidence: mean(&confidences),
        mean_model_score: mean(&model_scores),
        percentiles: Percentiles {
            p25: percentile(&sorted, 25.0),
            p50: percentile(&sorted, 50.0),
            p75: percentile(&sorted, 75.0),
        },
    };
    debug!(source = %source_id, sample_size = stats.sample_size, mean_bias = ?stats.mean_bias, "Aggregated outlet");
    stats
}

/// Group a mixed batch by outlet and aggregate each group, ordered by id.
pub fn aggregate_by_source(results: &[AnalysisResult]) -> Vec<AggregatedStats> {
    results
        .iter()
        .cloned()
        .into_group_map_by(|r| r.source_id.clone())
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(source_id, group)| aggregate(&group, &source_id))
        .collect()
}

/// Shifted by the first value so a constant series returns that value exactly.
fn mean(values: &[f64]) -> Option<f64> {
    let shift = *values.first()?;
    let offset = values.iter().map(|v| v - shift).sum::<f64>() / values.len() as f64;
    Some(shift + offset)
}

fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Linear-interpolated percentile of an ascending slice.
fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let rank = q / 100.0 * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let fraction = rank - lower as f64;
            Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn result(source_id: &str, bias_score: f64, confidence: f64, model_score: Option<f64>) -> AnalysisResult {
        AnalysisResult {
            source_id: source_id.to_string(),
            url: format!("https://{source_id}.dk/a"),
            bias_score,
            confidence,
            rule_based_score: 0.0,
            model_score,
            word_frequencies: BTreeMap::new(),
            citations: Vec::new(),
        }
    }

    #[test]
    fn test_empty_batch_is_undefined() {
        let stats = aggregate(&[], "dr");
        assert_eq!(stats.source_id, "dr");
        assert_eq!(stats.sample_size, 0);
        assert_eq!(stats.mean_bias, None);
        assert_eq!(stats.median_bias, None);
        assert_eq!(stats.std_dev_bias, None);
        assert_eq!(stats.mean_confidence, None);
        assert_eq!(stats.mean_model_score, None);
        assert_eq!(stats.percentiles, Percentiles::default());
    }

    #[test]
    fn test_identical_scores() {
        let results: Vec<_> = (0..5).map(|_| result("bt", 0.3, 0.5, Some(0.6))).collect();
        let stats = aggregate(&results, "bt");
        assert_eq!(stats.sample_size, 5);
        assert_eq!(stats.mean_bias, Some(0.3));
        assert_eq!(stats.median_bias, Some(0.3));
        assert_eq!(stats.std_dev_bias, Some(0.0));
        assert_eq!(stats.percentiles.p25, Some(0.3));
        assert_eq!(stats.percentiles.p75, Some(0.3));
    }

    #[test]
    fn test_spread_statistics() {
        let results: Vec<_> = [0.4, -0.2, 0.1, 0.3]
            .iter()
            .map(|b| result("politiken", *b, 0.2, Some(0.5)))
            .collect();
        let stats = aggregate(&results, "politiken");

        let close = |a: Option<f64>, b: f64| (a.unwrap() - b).abs() < 1e-12;
        assert!(close(stats.mean_bias, 0.15));
        assert!(close(stats.median_bias, 0.2));
        assert!(close(stats.percentiles.p25, 0.025));
        assert!(close(stats.percentiles.p50, 0.2));
        assert!(close(stats.percentiles.p75, 0.325));
        assert!(close(stats.std_dev_bias, 0.0525f64.sqrt()));
        assert!(close(stats.mean_confidence, 0.2));
    }

    #[test]
    fn test_mean_model_score_skips_rule_only_results() {
        let results = vec![
            result("dr", 0.1, 0.1, Some(0.4)),
            result("dr", 0.2, 0.1, None),
            result("dr", 0.3, 0.1, Some(0.8)),
        ];
        let stats = aggregate(&results, "dr");
        assert!((stats.mean_model_score.unwrap() - 0.6).abs() < 1e-12);

        let rule_only = vec![result("dr", 0.2, 0.1, None)];
        assert_eq!(aggregate(&rule_only, "dr").mean_model_score, None);
    }

    #[test]
    fn test_aggregate_by_source_groups() {
        let results = vec![
            result("tv2", 0.5, 0.1, Some(0.5)),
            result("dr", -0.5, 0.1, Some(0.5)),
            result("tv2", 0.1, 0.1, Some(0.5)),
        ];
        let stats = aggregate_by_source(&results);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].source_id, "dr");
        assert_eq!(stats[0].sample_size, 1);
        assert_eq!(stats[1].source_id, "tv2");
        assert_eq!(stats[1].sample_size, 2);
        assert!((stats[1].mean_bias.unwrap() - 0.3).abs() < 1e-12);
    }
}
