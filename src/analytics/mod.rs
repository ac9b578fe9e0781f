pub mod aggregate;
pub mod correlation;
pub mod highlights;
pub mod metrics;
pub mod outcome;
pub mod trend;
pub mod types;

use crate::config::AnalyticsConfig;
use crate::record::NormalizedRecord;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use types::Report;

/// Source of "now" for recency and highlight calculations.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant, for reproducible snapshots and tests.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Runs every analysis over a record set with one policy and one clock.
#[derive(Clone)]
pub struct Analyzer {
    pub config: AnalyticsConfig,
    url_base: Option<String>,
    clock: Arc<dyn Clock>,
}

impl Analyzer {
    pub fn new(config: AnalyticsConfig, url_base: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            url_base,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn aggregations(&self, records: &[NormalizedRecord]) -> types::AggregationTables {
        aggregate::aggregate(records, &aggregate::dimensions_for(records))
    }

    pub fn trends(&self, records: &[NormalizedRecord]) -> types::TrendReport {
        trend::trends(records)
    }

    pub fn metrics(&self, records: &[NormalizedRecord]) -> types::Metrics {
        metrics::metrics(records, &self.config, self.now())
    }

    pub fn date_range(&self, records: &[NormalizedRecord]) -> types::DateRange {
        metrics::date_range(records)
    }

    pub fn correlations(&self, records: &[NormalizedRecord]) -> types::CorrelationStats {
        correlation::correlation_stats(records, self.config.high_score_threshold)
    }

    pub fn test_outcomes(&self, records: &[NormalizedRecord]) -> types::TestOutcomes {
        outcome::test_outcomes(records)
    }

    pub fn highlights(&self, records: &[NormalizedRecord]) -> types::Highlights {
        highlights::highlights(records, &self.config, self.url_base.as_deref(), self.now())
    }

    /// Every analysis in one pass, sharing a single evaluation instant.
    pub fn report(&self, records: &[NormalizedRecord]) -> Report {
        let now = self.now();
        let started = std::time::Instant::now();
        let report = Report {
            aggregations: self.aggregations(records),
            trends: self.trends(records),
            metrics: metrics::metrics(records, &self.config, now),
            date_range: self.date_range(records),
            correlations: self.correlations(records),
            test_outcomes: self.test_outcomes(records),
            highlights: highlights::highlights(
                records,
                &self.config,
                self.url_base.as_deref(),
                now,
            ),
        };
        tracing::info!(
            records = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analytics report computed"
        );
        report
    }
}
