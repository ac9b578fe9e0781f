//! Record normalization.
//!
//! Raw records arrive as JSON objects in two shapes: tracker work items, which
//! nest their data under a `fields` map keyed by reference names
//! (`System.State`, `Microsoft.VSTS.Common.Severity`, ...), and flat test
//! failure entries from JSONL exports. [`normalize`] reads either shape through
//! one set of lookup and defaulting rules so every analytics consumer sees the
//! same view.

pub mod timestamp;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

pub use timestamp::parse_timestamp;

/// Bucket label for an absent categorical field.
pub const UNKNOWN: &str = "Unknown";
/// Display string for a record with no assignee.
pub const UNASSIGNED: &str = "Unassigned";

const ID_KEYS: &[&str] = &["System.Id", "id", "test_id"];
const TYPE_KEYS: &[&str] = &["System.WorkItemType", "type", "work_item_type"];
const STATE_KEYS: &[&str] = &["System.State", "state", "status"];
const PRIORITY_KEYS: &[&str] = &["Microsoft.VSTS.Common.Priority", "System.Priority", "priority"];
const SEVERITY_KEYS: &[&str] = &["Microsoft.VSTS.Common.Severity", "severity"];
const ASSIGNEE_KEYS: &[&str] = &["System.AssignedTo", "assignee", "assigned_to"];
const CREATED_KEYS: &[&str] = &["System.CreatedDate", "created_at", "created_date", "timestamp"];
const RESOLVED_KEYS: &[&str] = &[
    "Microsoft.VSTS.Common.ResolvedDate",
    "resolved_at",
    "resolved_date",
];
const CHANGED_KEYS: &[&str] = &["System.ChangedDate", "changed_at", "changed_date"];
const TAGS_KEYS: &[&str] = &["System.Tags", "tags"];
const TITLE_KEYS: &[&str] = &["System.Title", "title"];
const DESCRIPTION_KEYS: &[&str] = &["System.Description", "description"];
const CORRELATED_KEYS: &[&str] = &["correlated_items", "correlated_defects"];

/// Keys whose presence marks a record as a test failure entry.
const TEST_FAILURE_MARKERS: &[&str] = &["test_id", "error_message", "failure_type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    WorkItem,
    TestFailure,
}

/// Who a record is assigned to.
///
/// Trackers send either a bare name or an identity reference object; both are
/// resolved to one of these variants at normalization time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignee {
    Unassigned,
    PlainName(String),
    StructuredRef { display_name: Option<String> },
}

impl Assignee {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            None => Assignee::Unassigned,
            Some(Value::Object(map)) => {
                let display_name = ["displayName", "display_name", "uniqueName"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(scalar_string));
                Assignee::StructuredRef { display_name }
            }
            Some(other) => match scalar_string(other) {
                Some(name) => Assignee::PlainName(name),
                None => Assignee::Unassigned,
            },
        }
    }

    pub fn display(&self) -> &str {
        match self {
            Assignee::PlainName(name) => name.as_str(),
            Assignee::StructuredRef {
                display_name: Some(name),
            } => name.as_str(),
            Assignee::StructuredRef { display_name: None } | Assignee::Unassigned => UNASSIGNED,
        }
    }
}

/// Uniform, defaulted view over one raw record.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    raw: Value,
    pub kind: RecordKind,
    pub id: Option<String>,
    pub work_item_type: Option<String>,
    pub state: Option<String>,
    pub priority: Option<String>,
    pub severity: Option<String>,
    pub assignee: Assignee,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub resolved_at: Option<DateTime<FixedOffset>>,
    pub changed_at: Option<DateTime<FixedOffset>>,
    pub tags: Vec<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub environment: Option<String>,
    pub module: Option<String>,
    pub failure_type: Option<String>,
    pub test_id: Option<String>,
    pub error_message: Option<String>,
    pub expected_behavior: Option<String>,
    pub actual_behavior: Option<String>,
    pub correlation_id: Option<String>,
    /// Test run result (`Passed`, `Failed`, ...) for test result records.
    pub outcome: Option<String>,
    /// `similarity_score` of each linked item, in order. Missing or
    /// non-numeric scores are recorded as `0.0`.
    pub correlation_scores: Vec<f64>,
}

impl NormalizedRecord {
    /// The record exactly as it was received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn state_is_in(&self, states: &[String]) -> bool {
        let state = self.state.as_deref().unwrap_or_default();
        states.iter().any(|s| s.eq_ignore_ascii_case(state))
    }
}

/// Normalize a single raw record. Never fails: absent or malformed fields
/// come back as `None`/defaults.
pub fn normalize(raw: Value) -> NormalizedRecord {
    let kind = if TEST_FAILURE_MARKERS
        .iter()
        .any(|key| raw.get(*key).is_some_and(|v| !v.is_null()))
    {
        RecordKind::TestFailure
    } else {
        RecordKind::WorkItem
    };

    let text = |keys: &[&str]| lookup(&raw, keys).and_then(scalar_string);
    let date = |keys: &[&str]| {
        lookup(&raw, keys)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    };

    let correlation_scores = lookup(&raw, CORRELATED_KEYS)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    item.get("similarity_score")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0)
                })
                .collect()
        })
        .unwrap_or_default();

    NormalizedRecord {
        kind,
        id: text(ID_KEYS),
        work_item_type: text(TYPE_KEYS),
        state: text(STATE_KEYS),
        priority: text(PRIORITY_KEYS),
        severity: text(SEVERITY_KEYS),
        assignee: Assignee::from_value(lookup(&raw, ASSIGNEE_KEYS)),
        created_at: date(CREATED_KEYS),
        resolved_at: date(RESOLVED_KEYS),
        changed_at: date(CHANGED_KEYS),
        tags: lookup(&raw, TAGS_KEYS).map(parse_tags).unwrap_or_default(),
        title: text(TITLE_KEYS),
        description: text(DESCRIPTION_KEYS),
        environment: text(&["environment"]),
        module: text(&["module"]),
        failure_type: text(&["failure_type"]),
        test_id: text(&["test_id"]),
        error_message: text(&["error_message"]),
        expected_behavior: text(&["expected_behavior"]),
        actual_behavior: text(&["actual_behavior"]),
        correlation_id: text(&["correlation_id"]),
        outcome: text(&["outcome"]),
        correlation_scores,
        raw,
    }
}

pub fn normalize_all(raw: Vec<Value>) -> Vec<NormalizedRecord> {
    raw.into_iter().map(normalize).collect()
}

/// Find the first non-null value for any of `keys`, preferring the nested
/// `fields` map over top-level keys.
fn lookup<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let nested = raw.get("fields").filter(|f| f.is_object());
    let in_nested = nested.and_then(|fields| {
        keys.iter()
            .find_map(|key| fields.get(*key).filter(|v| !v.is_null()))
    });
    in_nested.or_else(|| {
        keys.iter()
            .find_map(|key| raw.get(*key).filter(|v| !v.is_null()))
    })
}

/// Render a scalar JSON value as text. Empty strings and compound values are
/// treated as absent.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_tags(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        _ => Vec::new(),
    }
}
