use crate::analytics::types::{AggregationTables, FrequencyTable};
use crate::record::{NormalizedRecord, UNKNOWN};
use std::borrow::Cow;

/// A categorical axis records can be counted along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Type,
    State,
    Priority,
    Severity,
    Assignee,
    CreatedMonth,
    Environment,
    Module,
    FailureType,
    Outcome,
}

impl Dimension {
    /// Dimensions reported for tracker work items.
    pub const WORK_ITEM: &'static [Dimension] = &[
        Dimension::Type,
        Dimension::State,
        Dimension::Priority,
        Dimension::Severity,
        Dimension::Assignee,
        Dimension::CreatedMonth,
    ];

    /// Dimensions reported for test failure exports.
    pub const TEST_FAILURE: &'static [Dimension] = &[
        Dimension::Environment,
        Dimension::Module,
        Dimension::FailureType,
        Dimension::State,
    ];

    /// Output table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            Dimension::Type => "by_type",
            Dimension::State => "by_state",
            Dimension::Priority => "by_priority",
            Dimension::Severity => "by_severity",
            Dimension::Assignee => "by_assignee",
            Dimension::CreatedMonth => "by_created_month",
            Dimension::Environment => "by_environment",
            Dimension::Module => "by_module",
            Dimension::FailureType => "by_failure_type",
            Dimension::Outcome => "by_outcome",
        }
    }

    /// Bucket key for `record`, or `None` when the record does not take part
    /// in this dimension (only date-derived dimensions are partial).
    pub fn key<'a>(&self, record: &'a NormalizedRecord) -> Option<Cow<'a, str>> {
        let categorical = |value: &'a Option<String>| {
            Some(Cow::Borrowed(value.as_deref().unwrap_or(UNKNOWN)))
        };
        match self {
            Dimension::Type => categorical(&record.work_item_type),
            Dimension::State => categorical(&record.state),
            Dimension::Priority => categorical(&record.priority),
            Dimension::Severity => categorical(&record.severity),
            Dimension::Assignee => Some(Cow::Borrowed(record.assignee.display())),
            Dimension::Environment => categorical(&record.environment),
            Dimension::Module => categorical(&record.module),
            Dimension::FailureType => categorical(&record.failure_type),
            Dimension::Outcome => categorical(&record.outcome),
            Dimension::CreatedMonth => record
                .created_at
                .as_ref()
                .map(|ts| Cow::Owned(ts.format("%Y-%m").to_string())),
        }
    }
}

/// Count `records` along a single dimension.
pub fn frequency(records: &[NormalizedRecord], dimension: Dimension) -> FrequencyTable {
    let mut table = FrequencyTable::new();
    for record in records {
        if let Some(key) = dimension.key(record) {
            *table.entry(key.into_owned()).or_insert(0) += 1;
        }
    }
    table
}

/// Build one frequency table per dimension.
pub fn aggregate(records: &[NormalizedRecord], dimensions: &[Dimension]) -> AggregationTables {
    let tables = dimensions
        .iter()
        .map(|dim| (dim.table_name().to_string(), frequency(records, *dim)))
        .collect();
    AggregationTables {
        total: records.len(),
        tables,
    }
}

/// Pick the dimension set matching the shape of the record set: test failure
/// dimensions are added when any test failure is present, and an outcome table
/// when any record carries a test outcome.
pub fn dimensions_for(records: &[NormalizedRecord]) -> Vec<Dimension> {
    use crate::record::RecordKind;

    let has_work_items = records.iter().any(|r| r.kind == RecordKind::WorkItem);
    let has_failures = records.iter().any(|r| r.kind == RecordKind::TestFailure);

    let mut dims: Vec<Dimension> = Vec::new();
    if has_work_items || !has_failures {
        dims.extend_from_slice(Dimension::WORK_ITEM);
    }
    if has_failures {
        for dim in Dimension::TEST_FAILURE {
            if !dims.contains(dim) {
                dims.push(*dim);
            }
        }
        if !dims.contains(&Dimension::CreatedMonth) {
            dims.push(Dimension::CreatedMonth);
        }
    }
    if records.iter().any(|r| r.outcome.is_some()) {
        dims.push(Dimension::Outcome);
    }
    dims
}
