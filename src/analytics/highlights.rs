use crate::analytics::metrics::{is_critical, is_recent};
use crate::analytics::types::{HighlightItem, Highlights};
use crate::config::AnalyticsConfig;
use crate::record::{NormalizedRecord, UNKNOWN};
use chrono::{DateTime, Utc};

pub const MAX_CRITICAL_ITEMS: usize = 10;
pub const MAX_RECENT_ITEMS: usize = 15;

fn item(record: &NormalizedRecord, url_base: Option<&str>) -> HighlightItem {
    let text = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_string());
    HighlightItem {
        id: record.id.clone(),
        title: record.title.clone().unwrap_or_default(),
        work_item_type: text(&record.work_item_type),
        state: text(&record.state),
        priority: text(&record.priority),
        severity: text(&record.severity),
        assignee: record.assignee.display().to_string(),
        created_at: record.created_at.map(|ts| ts.to_rfc3339()),
        url: match (url_base, record.id.as_deref()) {
            (Some(base), Some(id)) => Some(format!("{base}/_workitems/edit/{id}")),
            _ => None,
        },
    }
}

/// Newest-first, undated records last, truncated to `limit`.
fn newest_first(mut records: Vec<&NormalizedRecord>, limit: usize) -> Vec<&NormalizedRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records.truncate(limit);
    records
}

/// Critical bugs and recently created items for the dashboard lists, plus the
/// resolved/open lifecycle split.
pub fn highlights(
    records: &[NormalizedRecord],
    config: &AnalyticsConfig,
    url_base: Option<&str>,
    now: DateTime<Utc>,
) -> Highlights {
    let critical = newest_first(
        records.iter().filter(|r| is_critical(r, config)).collect(),
        MAX_CRITICAL_ITEMS,
    );
    let recent = newest_first(
        records
            .iter()
            .filter(|r| is_recent(r, config.recent_window_days, &now))
            .collect(),
        MAX_RECENT_ITEMS,
    );

    Highlights {
        critical_items: critical.into_iter().map(|r| item(r, url_base)).collect(),
        recent_items: recent.into_iter().map(|r| item(r, url_base)).collect(),
        resolved_count: records
            .iter()
            .filter(|r| r.state_is_in(&config.resolved_states))
            .count(),
        open_count: records
            .iter()
            .filter(|r| r.state_is_in(&config.open_states))
            .count(),
    }
}
