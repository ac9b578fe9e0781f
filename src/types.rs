use crate::analytics::types::{AggregationTables, DateRange, Highlights, Metrics};
use indexmap::IndexMap;
use serde::Serialize;

/// `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub records: usize,
    pub source: String,
    pub generation: u64,
}

/// `GET /api/summary`.
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub source: String,
    /// Records per origin, e.g. per JSONL export file.
    pub origins: IndexMap<String, usize>,
    pub generation: u64,
    pub metrics: Metrics,
    pub date_range: DateRange,
}

/// `GET /api/analysis`.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub aggregations: AggregationTables,
    pub highlights: Highlights,
}

/// `GET /api/search`. Results are the raw records as received.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub total: usize,
    pub results: Vec<serde_json::Value>,
}

/// `POST /api/refresh`.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub status: String,
    pub source: String,
    pub total_items: usize,
    pub generation: u64,
}

/// `POST /api/export`.
#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub status: String,
    pub filename: String,
    pub filepath: String,
    pub count: usize,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}
