use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use defectboard::config::SourceConfig;
use defectboard::source::{self, AdoSource, RecordSource, SourceError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;

const PAT: &str = "secret";
// base64(":secret")
const EXPECTED_AUTH: &str = "Basic OnNlY3JldA==";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == EXPECTED_AUTH)
}

/// Mock tracker: the WIQL query matches ids 1..=`matches`; detail batches whose
/// first id is above 200 fail with a 500.
async fn spawn_tracker(matches: u64) -> SocketAddr {
    spawn_tracker_with(matches, 200).await
}

/// As [`spawn_tracker`], failing detail batches whose first id is above
/// `healthy_up_to`.
async fn spawn_tracker_with(matches: u64, healthy_up_to: u64) -> SocketAddr {
    let wiql = move |Path((org, project)): Path<(String, String)>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        assert_eq!(org, "contoso");
        assert_eq!(project, "Shop Web");
        let query = body["query"].as_str().unwrap_or_default().to_string();
        assert!(query.contains("CONTAINS 'hack'"));
        let items: Vec<Value> = (1..=matches).map(|id| json!({ "id": id })).collect();
        Ok(Json(json!({ "workItems": items })))
    };

    let workitems = move |headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        assert_eq!(params.get("$expand").map(String::as_str), Some("all"));
        assert_eq!(params.get("api-version").map(String::as_str), Some("7.0"));
        let ids: Vec<u64> = params["ids"]
            .split(',')
            .map(|id| id.parse().unwrap())
            .collect();
        assert!(ids.len() <= 200);
        if ids[0] > healthy_up_to {
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        let value: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "fields": {
                        "System.Id": id,
                        "System.WorkItemType": "Bug",
                        "System.State": "Active",
                        "System.Tags": "hack"
                    }
                })
            })
            .collect();
        Ok(Json(json!({ "count": value.len(), "value": value })))
    };

    let app = Router::new()
        .route("/{org}/{project}/_apis/wit/wiql", post(wiql))
        .route("/{org}/{project}/_apis/wit/workitems", get(workitems));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    addr
}

fn remote_config(addr: SocketAddr, cache_path: std::path::PathBuf) -> SourceConfig {
    SourceConfig {
        base_url: format!("http://{addr}"),
        organization: "contoso".to_string(),
        project: "Shop Web".to_string(),
        pat: PAT.to_string(),
        cache_path,
        timeout_secs: 5,
        ..SourceConfig::default()
    }
}

#[tokio::test]
async fn test_remote_fetch_in_batches() {
    let addr = spawn_tracker(150).await;
    let dir = tempfile::tempdir().unwrap();
    let source = AdoSource::new(&remote_config(addr, dir.path().join("cache.json"))).unwrap();

    let records = source.fetch().await.unwrap();
    assert_eq!(records.len(), 150);
    assert_eq!(records[0]["fields"]["System.WorkItemType"], "Bug");
}

#[tokio::test]
async fn test_failed_batch_is_skipped() {
    let addr = spawn_tracker(250).await;
    let dir = tempfile::tempdir().unwrap();
    let source = AdoSource::new(&remote_config(addr, dir.path().join("cache.json"))).unwrap();

    // The second batch (ids 201..=250) fails and is dropped.
    let records = source.fetch().await.unwrap();
    assert_eq!(records.len(), 200);
}

#[tokio::test]
async fn test_every_batch_failing_is_unavailable() {
    let addr = spawn_tracker_with(3, 0).await;
    let dir = tempfile::tempdir().unwrap();
    let source = AdoSource::new(&remote_config(addr, dir.path().join("cache.json"))).unwrap();

    let err = source.fetch().await.unwrap_err();
    assert!(matches!(err, SourceError::Unavailable(_)));
}

#[tokio::test]
async fn test_failed_details_keep_existing_cache() {
    let addr = spawn_tracker_with(3, 0).await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("defects_data.json");
    std::fs::write(
        &cache_path,
        json!({"records": [{"id": 1}, {"id": 2}, {"id": 3}]}).to_string(),
    )
    .unwrap();

    let loaded = source::build_chain(&remote_config(addr, cache_path.clone()))
        .unwrap()
        .load()
        .await;
    assert_eq!(loaded.source, "cache");
    assert_eq!(loaded.records.len(), 3);

    let on_disk: Value = serde_json::from_slice(&std::fs::read(&cache_path).unwrap()).unwrap();
    assert_eq!(on_disk["records"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_wrong_pat_is_status_error() {
    let addr = spawn_tracker(3).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = remote_config(addr, dir.path().join("cache.json"));
    config.pat = "wrong".to_string();

    let err = AdoSource::new(&config).unwrap().fetch().await.unwrap_err();
    assert!(matches!(err, SourceError::Status(401)));
}

#[tokio::test]
async fn test_remote_load_is_cached_for_offline_start() {
    let addr = spawn_tracker(3).await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("data/defects_data.json");
    let config = remote_config(addr, cache_path.clone());

    let loaded = source::build_chain(&config).unwrap().load().await;
    assert_eq!(loaded.source, "remote");
    assert_eq!(loaded.records.len(), 3);

    let written: Value = serde_json::from_slice(&std::fs::read(&cache_path).unwrap()).unwrap();
    assert_eq!(written["metadata"]["total_analyzed"], 3);
    assert_eq!(written["metadata"]["project"], "Shop Web");

    // With the tracker unreachable the chain falls through to the cache.
    let offline = SourceConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        ..config
    };
    let loaded = source::build_chain(&offline).unwrap().load().await;
    assert_eq!(loaded.source, "cache");
    assert_eq!(loaded.records.len(), 3);
}

#[tokio::test]
async fn test_chain_falls_through_to_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let jsonl = dir.path().join("TestData.jsonl");
    std::fs::write(
        &jsonl,
        "{\"test_id\": \"t1\", \"environment\": \"QA\"}\n{\"test_id\": \"t2\"}\n",
    )
    .unwrap();

    let config = SourceConfig {
        cache_path: dir.path().join("missing.json"),
        jsonl_paths: vec![dir.path().join("TrainingData.jsonl"), jsonl],
        ..SourceConfig::default()
    };
    // No PAT: remote is skipped, cache is missing, jsonl answers.
    let loaded = source::build_chain(&config).unwrap().load().await;
    assert_eq!(loaded.source, "jsonl");
    assert_eq!(loaded.records.len(), 2);
}

#[tokio::test]
async fn test_chain_with_nothing_available_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = SourceConfig {
        cache_path: dir.path().join("missing.json"),
        jsonl_paths: vec![dir.path().join("missing.jsonl")],
        ..SourceConfig::default()
    };
    let loaded = source::build_chain(&config).unwrap().load().await;
    assert_eq!(loaded.source, "none");
    assert!(loaded.records.is_empty());
}
