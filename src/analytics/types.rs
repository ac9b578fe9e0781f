use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Observed value (or `"Unknown"`) to record count, in first-seen order.
pub type FrequencyTable = IndexMap<String, u64>;

/// Calendar date to record count, ascending.
pub type DailyCounts = BTreeMap<NaiveDate, u64>;

// ── Aggregation ──

#[derive(Debug, Clone, Serialize, Default)]
pub struct AggregationTables {
    pub total: usize,
    /// Keyed by dimension name (`by_type`, `by_state`, ...).
    pub tables: IndexMap<String, FrequencyTable>,
}

impl AggregationTables {
    pub fn get(&self, name: &str) -> Option<&FrequencyTable> {
        self.tables.get(name)
    }
}

// ── Trends ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub daily_counts: DailyCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendReport {
    pub daily_creation: DailyCounts,
    pub daily_resolution: DailyCounts,
    pub creation_trend: TrendDirection,
    pub resolution_trend: TrendDirection,
    /// Per-day failure type breakdown; empty for pure work-item sets.
    pub failure_type_trends: BTreeMap<NaiveDate, FrequencyTable>,
}

// ── Metrics ──

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub total: usize,
    pub total_bugs: usize,
    pub resolved_count: usize,
    pub open_count: usize,
    pub resolution_rate: f64,
    pub avg_resolution_days: f64,
    pub critical_count: usize,
    pub recent_count: usize,
    pub recent_window_days: i64,
    /// The "now" the time-dependent fields were computed against.
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub days: i64,
}

// ── Correlations ──

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationStats {
    pub total: usize,
    pub correlated_count: usize,
    pub correlation_rate: f64,
    pub avg_score: f64,
    pub high_score_count: usize,
}

// ── Test outcomes ──

#[derive(Debug, Clone, Serialize)]
pub struct TestOutcomes {
    /// Records carrying an outcome.
    pub total_results: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    /// `passed / total_results * 100`, 2 decimals; 0 with no results.
    pub pass_rate: f64,
    pub outcomes: FrequencyTable,
}

// ── Highlights ──

#[derive(Debug, Clone, Serialize)]
pub struct HighlightItem {
    pub id: Option<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub work_item_type: String,
    pub state: String,
    pub priority: String,
    pub severity: String,
    pub assignee: String,
    pub created_at: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Highlights {
    pub critical_items: Vec<HighlightItem>,
    pub recent_items: Vec<HighlightItem>,
    pub resolved_count: usize,
    pub open_count: usize,
}

// ── Full report ──

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub aggregations: AggregationTables,
    pub trends: TrendReport,
    pub metrics: Metrics,
    pub date_range: DateRange,
    pub correlations: CorrelationStats,
    pub test_outcomes: TestOutcomes,
    pub highlights: Highlights,
}
