use crate::analytics::aggregate::Dimension;
use crate::analytics::types::{DailyCounts, FrequencyTable, Trend, TrendDirection, TrendReport};
use crate::record::NormalizedRecord;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::BTreeMap;

/// Number of distinct dates in each comparison window.
pub const WINDOW_DAYS: usize = 7;
/// Recent average must exceed the earlier one by this factor to count as rising.
pub const INCREASE_FACTOR: f64 = 1.1;
/// Recent average must fall below the earlier one by this factor to count as falling.
pub const DECREASE_FACTOR: f64 = 0.9;

/// Which timestamp of a record to bucket by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Created,
    Resolved,
    Changed,
}

impl DateField {
    fn get<'a>(&self, record: &'a NormalizedRecord) -> Option<&'a DateTime<FixedOffset>> {
        match self {
            DateField::Created => record.created_at.as_ref(),
            DateField::Resolved => record.resolved_at.as_ref(),
            DateField::Changed => record.changed_at.as_ref(),
        }
    }
}

/// Count records per calendar day of `field`. Records without a parseable
/// timestamp are left out.
pub fn daily_counts(records: &[NormalizedRecord], field: DateField) -> DailyCounts {
    let mut counts = DailyCounts::new();
    for ts in records.iter().filter_map(|r| field.get(r)) {
        *counts.entry(ts.date_naive()).or_insert(0) += 1;
    }
    counts
}

/// Compare the mean daily count of the last seven observed dates against the
/// seven before them.
pub fn trend_direction(daily: &DailyCounts) -> TrendDirection {
    if daily.len() < 2 {
        return TrendDirection::Stable;
    }

    // BTreeMap iterates in ascending date order.
    let counts: Vec<u64> = daily.values().copied().collect();
    let recent_start = counts.len().saturating_sub(WINDOW_DAYS);
    let earlier_start = recent_start.saturating_sub(WINDOW_DAYS);

    let recent = &counts[recent_start..];
    let earlier = &counts[earlier_start..recent_start];
    if earlier.is_empty() {
        return TrendDirection::Stable;
    }

    let recent_avg = mean(recent);
    let earlier_avg = mean(earlier);

    if recent_avg > earlier_avg * INCREASE_FACTOR {
        TrendDirection::Increasing
    } else if recent_avg < earlier_avg * DECREASE_FACTOR {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

fn mean(values: &[u64]) -> f64 {
    values.iter().sum::<u64>() as f64 / values.len() as f64
}

pub fn trend(records: &[NormalizedRecord], field: DateField) -> Trend {
    let daily_counts = daily_counts(records, field);
    Trend {
        direction: trend_direction(&daily_counts),
        daily_counts,
    }
}

/// Per-day frequency table of `dimension` for records dated by `field`.
pub fn daily_breakdown<'a, I>(
    records: I,
    field: DateField,
    dimension: Dimension,
) -> BTreeMap<NaiveDate, FrequencyTable>
where
    I: IntoIterator<Item = &'a NormalizedRecord>,
{
    let mut out: BTreeMap<NaiveDate, FrequencyTable> = BTreeMap::new();
    for record in records {
        let Some(ts) = field.get(record) else {
            continue;
        };
        let Some(key) = dimension.key(record) else {
            continue;
        };
        *out.entry(ts.date_naive())
            .or_default()
            .entry(key.into_owned())
            .or_insert(0) += 1;
    }
    out
}

/// Creation and resolution trends for a record set.
pub fn trends(records: &[NormalizedRecord]) -> TrendReport {
    use crate::record::RecordKind;

    let creation = trend(records, DateField::Created);
    let resolution = trend(records, DateField::Resolved);

    let failures = records
        .iter()
        .filter(|r| r.kind == RecordKind::TestFailure);
    let failure_type_trends = daily_breakdown(failures, DateField::Created, Dimension::FailureType);

    TrendReport {
        daily_creation: creation.daily_counts,
        daily_resolution: resolution.daily_counts,
        creation_trend: creation.direction,
        resolution_trend: resolution.direction,
        failure_type_trends,
    }
}
