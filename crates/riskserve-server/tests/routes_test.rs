//! HTTP route tests against an in-process router

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use riskserve_server::{create_router, AppState, ServerConfig};
use serde_json::{json, Value};
use std::path::Path;
use tower::ServiceExt;

const DURABILITY: &str = r#"{
    "model": {
        "kind": "forest_classifier",
        "classes": [0, 1, 2],
        "trees": [{"nodes": [
            {"feature": 0, "threshold": 0.5, "left": 1, "right": 2},
            {"value": [1.0, 0.0, 0.0]},
            {"value": [0.0, 0.0, 1.0]}
        ]}]
    },
    "feature_names": ["vibration"]
}"#;

const LANDING_GEAR: &str = r#"{
    "model": {
        "kind": "logistic_regression",
        "classes": [0, 1],
        "coef": [[1.0, 0.0, 0.0]],
        "intercept": [-5.0]
    },
    "feature_extractor": {
        "type": "sliding_window_aggregate",
        "window_size": 3,
        "sensor_columns": ["s2"]
    }
}"#;

async fn app_with(config_body_limit: Option<usize>) -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("durability.json"), DURABILITY).unwrap();
    std::fs::write(dir.path().join("landing_gear.json"), LANDING_GEAR).unwrap();
    std::fs::write(dir.path().join("broken.json"), "{").unwrap();

    let mut config = ServerConfig {
        model_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    if let Some(limit) = config_body_limit {
        config.max_body_bytes = limit;
    }
    let state = AppState::new(config, None);
    state.load_models().await.unwrap();
    (dir, create_router(state))
}

async fn app() -> (tempfile::TempDir, Router) {
    app_with(None).await
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn send_csv(app: &Router, uri: &str, csv: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "text/csv; charset=utf-8")
        .body(Body::from(csv.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn write(dir: &Path, file: &str, contents: &str) {
    std::fs::write(dir.join(file), contents).unwrap();
}

#[tokio::test]
async fn test_health_and_models() {
    let (_dir, app) = app().await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["ready"], true);

    let (status, body) = send(&app, "GET", "/models", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"models": ["durability", "landing_gear"]}));

    let (_, body) = send(&app, "GET", "/models/details", None).await;
    let details = body["models"].as_array().unwrap();
    assert_eq!(details.len(), 3);
    assert_eq!(details[0]["name"], "broken");
    assert_eq!(details[0]["load_state"], "FAILED");
    assert_eq!(details[1]["format"], "DECISION_MODEL");
}

#[tokio::test]
async fn test_predict_columnar_table() {
    let (_dir, app) = app().await;
    let table = json!({
        "columns": ["vibration", "temp"],
        "rows": [[0.1, 70.0], [0.2, 71.0], [0.3, 69.5]]
    });

    let (status, body) = send(&app, "POST", "/predict/durability", Some(table)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "durability");
    assert_eq!(body["rows"], 3);
    assert_eq!(body["risk_level"], "LOW");
    assert_eq!(body["prediction"][0]["label"], "HEALTHY");
    assert_eq!(body["summary"], "Generated 3 predictions using 'durability'.");
}

#[tokio::test]
async fn test_predict_record_table_single_class() {
    let (_dir, app) = app().await;
    let records: Vec<Value> = [1.0, 9.0, 9.0, 9.0]
        .iter()
        .map(|s2| json!({"engine": "E1", "s2": s2}))
        .collect();

    let (status, body) = send(&app, "POST", "/predict/landing_gear", Some(json!(records))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 4);
    assert_eq!(body["prediction"].as_array().unwrap().len(), 1);
    assert_eq!(body["prediction"][0]["code"], 1);
    assert_eq!(body["prediction"][0]["label"], "MAINTENANCE");
    assert!(body["summary"]
        .as_str()
        .unwrap()
        .ends_with("Predicted class: MAINTENANCE."));
}

#[tokio::test]
async fn test_error_statuses() {
    let (_dir, app) = app().await;
    let table = json!({"columns": ["vibration"], "rows": [[0.1]]});

    let (status, body) = send(&app, "POST", "/predict/nope", Some(table)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "unknown_model");
    assert!(body["error"]["message"].as_str().unwrap().contains("durability"));

    let short = json!({"columns": ["s2"], "rows": [[1.0], [2.0]]});
    let (status, body) = send(&app, "POST", "/predict/landing_gear", Some(short)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "insufficient_data");

    let missing = json!({"columns": ["temp"], "rows": [[1.0]]});
    let (status, body) = send(&app, "POST", "/predict/durability", Some(missing)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "schema_mismatch");

    let ragged = json!({"columns": ["a", "b"], "rows": [[1.0]]});
    let (status, body) = send(&app, "POST", "/predict/durability", Some(ragged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_table");

    let (status, _) = send(&app, "GET", "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_body_limit() {
    let (_dir, app) = app_with(Some(64)).await;
    let rows: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64]).collect();
    let table = json!({"columns": ["vibration"], "rows": rows});
    let (status, _) = send(&app, "POST", "/predict/durability", Some(table)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_reload_endpoint() {
    let (dir, app) = app().await;

    let (status, body) = send(&app, "POST", "/models/durability/reload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"model": "durability", "reloaded": true}));

    write(dir.path(), "durability.json", "corrupt");
    let (_, body) = send(&app, "POST", "/models/durability/reload", None).await;
    assert_eq!(body["reloaded"], false);

    // previous handle still serves
    let table = json!({"columns": ["vibration"], "rows": [[0.9]]});
    let (status, body) = send(&app, "POST", "/predict/durability", Some(table)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["risk_level"], "HIGH");

    let (status, _) = send(&app, "POST", "/models/ghost/reload", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_predict_csv_upload() {
    let (_dir, app) = app().await;

    let csv = "vibration,temp\n0.1,70\n0.9,71\n0.2,\n";
    let (status, body) = send_csv(&app, "/predict/durability", csv).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], 3);
    let labels: Vec<&str> = body["prediction"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["HEALTHY", "REPLACE", "HEALTHY"]);

    let csv = "engine,s2\nE1,1\nE1,9\nE1,9\nE1,9\n";
    let (status, body) = send_csv(&app, "/predict/landing_gear", csv).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"][0]["label"], "MAINTENANCE");
}

#[tokio::test]
async fn test_predict_invalid_csv() {
    let (_dir, app) = app().await;

    let (status, body) = send_csv(&app, "/predict/durability", "vibration,temp\n0.1\n").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_table");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Invalid CSV content"));

    let (status, _) = send_csv(&app, "/predict/durability", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // CSV body without the CSV content type is read as JSON
    let request = Request::builder()
        .method("POST")
        .uri("/predict/durability")
        .header("content-type", "application/json")
        .body(Body::from("vibration\n0.1\n"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
