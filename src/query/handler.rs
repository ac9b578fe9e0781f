use crate::analytics::Analyzer;
use crate::error::{AppError, AppResult};
use crate::query::cache::ReportCache;
use crate::search::{self, SearchQuery};
use crate::snapshot::SnapshotStore;
use crate::source::SourceChain;
use crate::types::*;
use axum::extract::{Query, State};
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub analyzer: Analyzer,
    pub chain: Arc<SourceChain>,
    pub cache: ReportCache,
    pub export_dir: PathBuf,
}

/// Serve a cached response for the current snapshot generation, or compute,
/// cache and return it.
macro_rules! cached_or_compute {
    ($state:expr, $endpoint:expr, $generation:expr, $params:expr, $compute:expr) => {{
        let key = ReportCache::cache_key($endpoint, $generation, $params);
        if let Some(cached) = $state.cache.get(&key) {
            let val: serde_json::Value = serde_json::from_str(&cached)
                .map_err(|e| AppError::Internal(format!("cache deserialize: {e}")))?;
            return Ok(Json(val));
        }
        let result = $compute;
        let value = serde_json::to_value(&result)
            .map_err(|e| AppError::Internal(format!("serialize: {e}")))?;
        $state.cache.insert(key, value.to_string());
        Ok(Json(value))
    }};
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.store.current();
    Json(HealthResponse {
        status: if snapshot.generation > 0 {
            "ok".into()
        } else {
            "loading".into()
        },
        records: snapshot.len(),
        source: snapshot.source.clone(),
        generation: snapshot.generation,
    })
}

/// GET /api/summary - metrics and the covered date range.
pub async fn summary(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state.store.current();
    cached_or_compute!(state, "summary", snapshot.generation, "", {
        SummaryResponse {
            source: snapshot.source.clone(),
            origins: snapshot.origins.clone(),
            generation: snapshot.generation,
            metrics: state.analyzer.metrics(&snapshot.records),
            date_range: state.analyzer.date_range(&snapshot.records),
        }
    })
}

/// GET /api/analysis - frequency tables plus critical and recent items.
pub async fn analysis(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state.store.current();
    cached_or_compute!(state, "analysis", snapshot.generation, "", {
        AnalysisResponse {
            aggregations: state.analyzer.aggregations(&snapshot.records),
            highlights: state.analyzer.highlights(&snapshot.records),
        }
    })
}

/// GET /api/trends
pub async fn trends(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state.store.current();
    cached_or_compute!(state, "trends", snapshot.generation, "", {
        state.analyzer.trends(&snapshot.records)
    })
}

/// GET /api/correlations
pub async fn correlations(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state.store.current();
    cached_or_compute!(state, "correlations", snapshot.generation, "", {
        state.analyzer.correlations(&snapshot.records)
    })
}

/// GET /api/outcomes - pass/fail distribution of test results.
pub async fn outcomes(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state.store.current();
    cached_or_compute!(state, "outcomes", snapshot.generation, "", {
        state.analyzer.test_outcomes(&snapshot.records)
    })
}

/// GET /api/filters - distinct values for each filter control.
pub async fn filters(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state.store.current();
    cached_or_compute!(state, "filters", snapshot.generation, "", {
        search::filter_options(&snapshot.records)
    })
}

/// GET /api/report - every analysis in one document.
pub async fn report(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state.store.current();
    cached_or_compute!(state, "report", snapshot.generation, "", {
        state.analyzer.report(&snapshot.records)
    })
}

/// GET /api/search?query=..&type=..&state=.. - matching raw records.
///
/// Any parameter other than `query`/`q` and `error_message` must name a
/// filter field.
pub async fn search_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<serde_json::Value>> {
    let query = SearchQuery::from_pairs(params)?;
    let snapshot = state.store.current();
    let params_key = format!("{query:?}");
    cached_or_compute!(state, "search", snapshot.generation, &params_key, {
        let hits = search::search(&snapshot.records, &query);
        SearchResponse {
            total: hits.len(),
            results: hits.into_iter().map(|r| r.raw().clone()).collect(),
        }
    })
}

/// POST /api/export?query=..&environment=.. - write the matching raw records
/// to a timestamped JSON file in the export directory.
pub async fn export_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<ExportResponse>> {
    let query = SearchQuery::from_pairs(params)?;
    let snapshot = state.store.current();
    let hits: Vec<&serde_json::Value> = search::search(&snapshot.records, &query)
        .into_iter()
        .map(|r| r.raw())
        .collect();
    let count = hits.len();
    let body = serde_json::to_vec_pretty(&hits)
        .map_err(|e| AppError::Internal(format!("serialize export: {e}")))?;

    let generated_at = state.analyzer.now();
    let filename = format!("export_{}.json", generated_at.format("%Y%m%d_%H%M%S"));
    let path = state.export_dir.join(&filename);
    tokio::fs::create_dir_all(&state.export_dir)
        .await
        .map_err(|e| AppError::Internal(format!("create export dir: {e}")))?;
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| AppError::Internal(format!("write export: {e}")))?;

    tracing::info!(path = %path.display(), records = count, "export written");
    Ok(Json(ExportResponse {
        status: "success".into(),
        filename,
        filepath: path.display().to_string(),
        count,
        generated_at,
    }))
}

/// POST /api/refresh - reload through the source chain.
pub async fn refresh(State(state): State<Arc<AppState>>) -> AppResult<Json<RefreshResponse>> {
    let snapshot = state.store.refresh(&state.chain).await?;
    state.cache.clear();
    Ok(Json(RefreshResponse {
        status: "success".into(),
        source: snapshot.source.clone(),
        total_items: snapshot.len(),
        generation: snapshot.generation,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    // Read-only JSON API consumed by a separately hosted front end.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/api/summary", get(summary))
        .route("/api/analysis", get(analysis))
        .route("/api/trends", get(trends))
        .route("/api/correlations", get(correlations))
        .route("/api/outcomes", get(outcomes))
        .route("/api/search", get(search_records))
        .route("/api/filters", get(filters))
        .route("/api/report", get(report))
        .route("/api/export", post(export_records))
        .route("/api/refresh", post(refresh))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::FixedClock;
    use crate::config::AnalyticsConfig;
    use crate::source::LoadedRecords;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let now = Utc.with_ymd_and_hms(2025, 9, 20, 0, 0, 0).unwrap();
        Arc::new(AppState {
            store: Arc::new(SnapshotStore::new()),
            analyzer: Analyzer::new(AnalyticsConfig::default(), None, Arc::new(FixedClock(now))),
            chain: Arc::new(SourceChain::new(Vec::new())),
            cache: ReportCache::new(60),
            export_dir: std::env::temp_dir().join("defectboard-handler-tests"),
        })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_unknown_search_field_is_bad_request() {
        let (status, body) = get_json(router(state()), "/api/search?colour=red").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("colour"));
    }

    #[tokio::test]
    async fn test_export_rejects_unknown_field() {
        let resp = router(state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/export?colour=red")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_outcomes_route() {
        let state = state();
        state.store.replace(LoadedRecords::single(
            "cache",
            vec![
                json!({"id": 1, "outcome": "Passed"}),
                json!({"id": 2, "outcome": "Failed"}),
            ],
        ));
        let (status, body) = get_json(router(state), "/api/outcomes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_results"], 2);
        assert_eq!(body["pass_rate"], 50.0);
        assert_eq!(body["outcomes"]["Failed"], 1);
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_generation() {
        let state = state();
        state
            .store
            .replace(LoadedRecords::single("cache", vec![json!({"state": "Resolved"})]));
        let (_, first) = get_json(router(state.clone()), "/api/summary").await;
        assert_eq!(first["metrics"]["total"], 1);

        state.store.replace(LoadedRecords::single(
            "cache",
            vec![json!({"state": "Active"}), json!({"state": "New"})],
        ));
        let (_, second) = get_json(router(state), "/api/summary").await;
        assert_eq!(second["metrics"]["total"], 2);
        assert_eq!(second["generation"], 2);
    }
}
