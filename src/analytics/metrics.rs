use crate::analytics::types::{DateRange, Metrics};
use crate::config::AnalyticsConfig;
use crate::record::timestamp::{days_since, floor_days};
use crate::record::NormalizedRecord;
use chrono::{DateTime, Utc};

/// Round to `places` decimal places.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Percentage of `part` in `whole`; zero for an empty whole.
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

pub fn is_bug(record: &NormalizedRecord, config: &AnalyticsConfig) -> bool {
    record
        .work_item_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case(&config.bug_type))
}

/// A bug whose priority is in the configured critical set.
pub fn is_critical(record: &NormalizedRecord, config: &AnalyticsConfig) -> bool {
    let Some(priority) = record.priority.as_deref() else {
        return false;
    };
    is_bug(record, config)
        && config
            .critical_priorities
            .iter()
            .any(|p| p.eq_ignore_ascii_case(priority.trim()))
}

/// Created within the trailing recency window ending at `now`.
pub fn is_recent(record: &NormalizedRecord, window_days: i64, now: &DateTime<Utc>) -> bool {
    record
        .created_at
        .as_ref()
        .is_some_and(|created| days_since(created, now) <= window_days)
}

/// Whole days from creation to the explicit resolution date. Not clamped: a
/// resolution stamped before creation yields a negative value. Records
/// without a resolution date have no resolution time; the last change date is
/// not a stand-in.
pub fn resolution_days(record: &NormalizedRecord) -> Option<i64> {
    let created = record.created_at.as_ref()?;
    let resolved = record.resolved_at.as_ref()?;
    Some(floor_days(created, resolved))
}

/// Summary statistics for a record set, evaluated as of `now`.
pub fn metrics(
    records: &[NormalizedRecord],
    config: &AnalyticsConfig,
    now: DateTime<Utc>,
) -> Metrics {
    let total = records.len();
    let resolved: Vec<&NormalizedRecord> = records
        .iter()
        .filter(|r| r.state_is_in(&config.resolved_states))
        .collect();

    let durations: Vec<i64> = resolved.iter().filter_map(|r| resolution_days(r)).collect();
    let avg_resolution_days = if durations.is_empty() {
        0.0
    } else {
        round_to(
            durations.iter().sum::<i64>() as f64 / durations.len() as f64,
            1,
        )
    };

    let metrics = Metrics {
        total,
        total_bugs: records.iter().filter(|r| is_bug(r, config)).count(),
        resolved_count: resolved.len(),
        open_count: total - resolved.len(),
        resolution_rate: round_to(percentage(resolved.len(), total), 2),
        avg_resolution_days,
        critical_count: records.iter().filter(|r| is_critical(r, config)).count(),
        recent_count: records
            .iter()
            .filter(|r| is_recent(r, config.recent_window_days, &now))
            .count(),
        recent_window_days: config.recent_window_days,
        evaluated_at: now,
    };

    tracing::debug!(
        total = metrics.total,
        resolved = metrics.resolved_count,
        critical = metrics.critical_count,
        "computed metrics"
    );
    metrics
}

/// First and last creation date across the set, with the whole-day span
/// between the earliest and latest timestamps.
pub fn date_range(records: &[NormalizedRecord]) -> DateRange {
    let mut dates = records.iter().filter_map(|r| r.created_at.as_ref());
    let Some(first) = dates.next() else {
        return DateRange {
            start: None,
            end: None,
            days: 0,
        };
    };

    let (min, max) = dates.fold((first, first), |(min, max), ts| {
        (if ts < min { ts } else { min }, if ts > max { ts } else { max })
    });

    DateRange {
        start: Some(min.date_naive()),
        end: Some(max.date_naive()),
        days: floor_days(min, max),
    }
}
