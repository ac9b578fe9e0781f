//! Search and filtering over a normalized record set.
//!
//! Filters are exact, case-insensitive matches per field; free text is a
//! case-insensitive substring match over the fields a front end would show for
//! the record's shape. All constraints are ANDed and the input order is kept.

use crate::record::{NormalizedRecord, RecordKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Filter value meaning "no constraint on this field".
pub const ALL: &str = "All";

const MAX_ERROR_MESSAGES: usize = 20;
const ERROR_MESSAGE_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterField {
    Id,
    Type,
    State,
    Priority,
    Severity,
    Assignee,
    Environment,
    Module,
    FailureType,
    TestId,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown filter field: {0}")]
pub struct UnknownField(pub String);

impl FromStr for FilterField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(FilterField::Id),
            "type" | "work_item_type" => Ok(FilterField::Type),
            "state" | "status" => Ok(FilterField::State),
            "priority" => Ok(FilterField::Priority),
            "severity" => Ok(FilterField::Severity),
            "assignee" | "assigned_to" => Ok(FilterField::Assignee),
            "environment" => Ok(FilterField::Environment),
            "module" => Ok(FilterField::Module),
            "failure_type" => Ok(FilterField::FailureType),
            "test_id" => Ok(FilterField::TestId),
            _ => Err(UnknownField(s.to_string())),
        }
    }
}

impl FilterField {
    fn value<'a>(&self, record: &'a NormalizedRecord) -> &'a str {
        let field = match self {
            FilterField::Id => &record.id,
            FilterField::Type => &record.work_item_type,
            FilterField::State => &record.state,
            FilterField::Priority => &record.priority,
            FilterField::Severity => &record.severity,
            FilterField::Assignee => return record.assignee.display(),
            FilterField::Environment => &record.environment,
            FilterField::Module => &record.module,
            FilterField::FailureType => &record.failure_type,
            FilterField::TestId => &record.test_id,
        };
        field.as_deref().unwrap_or_default()
    }
}

/// `true` when `value` places a constraint (not empty and not the `All` sentinel).
fn is_active(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed != ALL
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub filters: BTreeMap<FilterField, String>,
    /// Substring match on the record's error message.
    pub error_message: Option<String>,
    /// Free-text substring match over the searchable fields.
    pub text: Option<String>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: FilterField, value: impl Into<String>) -> Self {
        self.filters.insert(field, value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn error_message(mut self, needle: impl Into<String>) -> Self {
        self.error_message = Some(needle.into());
        self
    }

    /// Build a query from `(field name, value)` pairs. `query`/`q` set the
    /// free text and `error_message` the substring filter; any other name must
    /// be a known filter field.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, UnknownField>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = SearchQuery::new();
        for (key, value) in pairs {
            match key.as_ref() {
                "query" | "q" => query.text = Some(value.into()),
                "error_message" => query.error_message = Some(value.into()),
                name => {
                    let field = name.parse::<FilterField>()?;
                    query.filters.insert(field, value.into());
                }
            }
        }
        Ok(query)
    }

    pub fn is_unconstrained(&self) -> bool {
        self.filters.values().all(|v| !is_active(v))
            && !self.error_message.as_deref().is_some_and(is_active)
            && !self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        for (field, wanted) in &self.filters {
            if is_active(wanted) && !field.value(record).eq_ignore_ascii_case(wanted.trim()) {
                return false;
            }
        }

        if let Some(needle) = self.error_message.as_deref().filter(|v| is_active(v)) {
            let haystack = record.error_message.as_deref().unwrap_or_default();
            if !contains_ignore_case(haystack, needle.trim()) {
                return false;
            }
        }

        if let Some(text) = self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            if !contains_ignore_case(&searchable_text(record), text.trim()) {
                return false;
            }
        }

        true
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Space-joined text that free-text search runs against.
pub fn searchable_text(record: &NormalizedRecord) -> String {
    let parts: Vec<String> = match record.kind {
        RecordKind::WorkItem => vec![
            record.title.clone().unwrap_or_default(),
            record.description.clone().unwrap_or_default(),
            record.tags.join("; "),
            record.id.clone().unwrap_or_default(),
        ],
        RecordKind::TestFailure => [
            &record.test_id,
            &record.error_message,
            &record.expected_behavior,
            &record.actual_behavior,
            &record.correlation_id,
        ]
        .into_iter()
        .map(|v| v.clone().unwrap_or_default())
        .collect(),
    };
    parts.join(" ")
}

/// Records matching every active constraint, in input order.
pub fn search<'a>(records: &'a [NormalizedRecord], query: &SearchQuery) -> Vec<&'a NormalizedRecord> {
    if query.is_unconstrained() {
        return records.iter().collect();
    }
    let hits: Vec<&NormalizedRecord> = records.iter().filter(|r| query.matches(r)).collect();
    tracing::debug!(
        candidates = records.len(),
        hits = hits.len(),
        "search evaluated"
    );
    hits
}

/// Distinct values available for each filter dropdown.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FilterOptions {
    pub types: Vec<String>,
    pub states: Vec<String>,
    pub priorities: Vec<String>,
    pub assignees: Vec<String>,
    pub environments: Vec<String>,
    pub modules: Vec<String>,
    pub failure_types: Vec<String>,
    pub test_ids: Vec<String>,
    pub error_messages: Vec<String>,
}

pub fn filter_options(records: &[NormalizedRecord]) -> FilterOptions {
    fn distinct<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
        values
            .flatten()
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    let mut error_messages = distinct(records.iter().map(|r| {
        r.error_message.as_deref()
    }))
    .into_iter()
    .map(|msg| preview(&msg))
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect::<Vec<_>>();
    error_messages.truncate(MAX_ERROR_MESSAGES);

    FilterOptions {
        types: distinct(records.iter().map(|r| r.work_item_type.as_deref())),
        states: distinct(records.iter().map(|r| r.state.as_deref())),
        priorities: distinct(records.iter().map(|r| r.priority.as_deref())),
        assignees: distinct(records.iter().map(|r| match &r.assignee {
            crate::record::Assignee::Unassigned => None,
            a => Some(a.display()),
        })),
        environments: distinct(records.iter().map(|r| r.environment.as_deref())),
        modules: distinct(records.iter().map(|r| r.module.as_deref())),
        failure_types: distinct(records.iter().map(|r| r.failure_type.as_deref())),
        test_ids: distinct(records.iter().map(|r| r.test_id.as_deref())),
        error_messages,
    }
}

fn preview(message: &str) -> String {
    if message.chars().count() > ERROR_MESSAGE_PREVIEW_CHARS {
        let head: String = message.chars().take(ERROR_MESSAGE_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::normalize_all;
    use serde_json::json;

    fn work_items() -> Vec<NormalizedRecord> {
        normalize_all(vec![
            json!({"id": "3001", "fields": {"System.Id": "3001",
                "System.Title": "Login authentication fails with hack tag implementation",
                "System.WorkItemType": "Bug", "System.State": "Active",
                "System.Priority": "High", "System.Tags": "hack; authentication; login"}}),
            json!({"id": "3002", "fields": {"System.Id": "3002",
                "System.Title": "Data validation error in hack feature",
                "System.WorkItemType": "Bug", "System.State": "Resolved",
                "System.Priority": "Medium"}}),
            json!({"id": "3003", "fields": {"System.Id": "3003",
                "System.Title": "Implement hack tag filtering in dashboard",
                "System.WorkItemType": "Task", "System.State": "Active",
                "System.Description": "Add login-aware filters",
                "System.AssignedTo": {"displayName": "UI Team"}}}),
        ])
    }

    fn ids(hits: &[&NormalizedRecord]) -> Vec<String> {
        hits.iter().map(|r| r.id.clone().unwrap_or_default()).collect()
    }

    #[test]
    fn test_type_filter_and_text() {
        let records = work_items();
        let query = SearchQuery::new().filter(FilterField::Type, "Bug").text("login");
        assert_eq!(ids(&search(&records, &query)), vec!["3001"]);
    }

    #[test]
    fn test_text_is_case_insensitive_substring() {
        let records = work_items();
        let hits = search(&records, &SearchQuery::new().text("auth"));
        assert_eq!(ids(&hits), vec!["3001"]);

        let hits = search(&records, &SearchQuery::new().text("LOGIN"));
        assert_eq!(ids(&hits), vec!["3001", "3003"]);
    }

    #[test]
    fn test_text_matches_id_and_tags() {
        let records = work_items();
        assert_eq!(ids(&search(&records, &SearchQuery::new().text("3002"))), vec!["3002"]);
        assert_eq!(
            ids(&search(&records, &SearchQuery::new().text("authentication; login"))),
            vec!["3001"]
        );
    }

    #[test]
    fn test_all_and_empty_are_unconstrained() {
        let records = work_items();
        let query = SearchQuery::new()
            .filter(FilterField::Type, ALL)
            .filter(FilterField::State, "")
            .filter(FilterField::Priority, ALL)
            .text("   ");
        assert!(query.is_unconstrained());
        assert_eq!(ids(&search(&records, &query)), vec!["3001", "3002", "3003"]);
    }

    #[test]
    fn test_filters_are_case_insensitive_and_anded() {
        let records = work_items();
        let query = SearchQuery::new()
            .filter(FilterField::State, "active")
            .filter(FilterField::Type, "TASK");
        assert_eq!(ids(&search(&records, &query)), vec!["3003"]);

        let query = SearchQuery::new()
            .filter(FilterField::State, "active")
            .filter(FilterField::Priority, "Medium");
        assert!(search(&records, &query).is_empty());
    }

    #[test]
    fn test_filter_on_absent_field_never_matches_value() {
        let records = work_items();
        let query = SearchQuery::new().filter(FilterField::Severity, "Unknown");
        assert!(search(&records, &query).is_empty());

        let query = SearchQuery::new().filter(FilterField::Assignee, "unassigned");
        assert_eq!(ids(&search(&records, &query)), vec!["3001", "3002"]);
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let records = work_items();
        let query = SearchQuery::new().filter(FilterField::State, "Active");
        let once: Vec<NormalizedRecord> = search(&records, &query).into_iter().cloned().collect();
        let twice = search(&once, &query);
        assert_eq!(ids(&twice), ids(&search(&records, &query)));
    }

    #[test]
    fn test_test_failure_search_fields() {
        let records = normalize_all(vec![
            json!({"test_id": "test_checkout_creates_order", "environment": "QA",
                "module": "Order Management", "error_message": "Unhandled exception in request handler",
                "expected_behavior": "Order is created", "actual_behavior": "HTTP 500"}),
            json!({"test_id": "test_search_results_valid_keyword", "environment": "UAT",
                "error_message": "Mismatched schema caused invalid record",
                "correlation_id": "CORR-42", "title": "ignored for test failures"}),
        ]);

        let hits = search(&records, &SearchQuery::new().text("http 500"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].environment.as_deref(), Some("QA"));

        assert_eq!(search(&records, &SearchQuery::new().text("corr-42")).len(), 1);
        assert!(search(&records, &SearchQuery::new().text("ignored")).is_empty());

        let query = SearchQuery::new()
            .filter(FilterField::Environment, "uat")
            .error_message("SCHEMA");
        assert_eq!(search(&records, &query).len(), 1);

        let query = SearchQuery::new().error_message("schema").filter(FilterField::Environment, "QA");
        assert!(search(&records, &query).is_empty());
    }

    #[test]
    fn test_from_pairs() {
        let query = SearchQuery::from_pairs([
            ("type", "Bug"),
            ("status", "Active"),
            ("query", "login"),
            ("error_message", "All"),
        ])
        .unwrap();
        assert_eq!(query.filters[&FilterField::Type], "Bug");
        assert_eq!(query.filters[&FilterField::State], "Active");
        assert_eq!(query.text.as_deref(), Some("login"));

        let err = SearchQuery::from_pairs([("colour", "red")]).unwrap_err();
        assert_eq!(err, UnknownField("colour".to_string()));
    }

    #[test]
    fn test_filter_options() {
        let mut raw = vec![
            json!({"fields": {"System.WorkItemType": "Task", "System.State": "Active",
                "System.AssignedTo": {"displayName": "UI Team"}}}),
            json!({"fields": {"System.WorkItemType": "Bug", "System.State": "Active"}}),
            json!({"test_id": "t1", "environment": "QA", "error_message": "x".repeat(150)}),
        ];
        for i in 0..25 {
            raw.push(json!({"test_id": format!("t{i}"), "error_message": format!("error {i:02}")}));
        }
        let options = filter_options(&normalize_all(raw));
        assert_eq!(options.types, vec!["Bug", "Task"]);
        assert_eq!(options.states, vec!["Active"]);
        assert_eq!(options.assignees, vec!["UI Team"]);
        assert_eq!(options.environments, vec!["QA"]);
        assert_eq!(options.error_messages.len(), 20);
        assert_eq!(options.error_messages[0], "error 00");
        assert!(options.test_ids.contains(&"t1".to_string()));
    }

    #[test]
    fn test_preview_truncates_long_messages() {
        let long = "y".repeat(120);
        let short = preview(&long);
        assert_eq!(short.len(), 103);
        assert!(short.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
