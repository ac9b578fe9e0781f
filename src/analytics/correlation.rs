use crate::analytics::metrics::percentage;
use crate::analytics::types::CorrelationStats;
use crate::record::NormalizedRecord;

/// Coverage of correlation ids and the distribution of linked-item scores.
///
/// Scores of zero (including missing or non-numeric ones) are not counted.
pub fn correlation_stats(records: &[NormalizedRecord], high_score_threshold: f64) -> CorrelationStats {
    let total = records.len();
    let correlated_count = records
        .iter()
        .filter(|r| r.correlation_id.is_some())
        .count();

    let scores: Vec<f64> = records
        .iter()
        .flat_map(|r| r.correlation_scores.iter().copied())
        .filter(|score| *score > 0.0)
        .collect();

    let avg_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };

    CorrelationStats {
        total,
        correlated_count,
        correlation_rate: percentage(correlated_count, total),
        avg_score,
        high_score_count: scores.iter().filter(|s| **s >= high_score_threshold).count(),
    }
}
