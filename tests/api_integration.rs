//! API integration tests.
//!
//! Covers the HTTP surface end to end against a live listener. The networked
//! backend is pointed at a closed port so every storage operation exercises
//! the fallback path into a temporary SQLite file.

use genepredict::config::DatabaseConfig;
use genepredict::server::{AppState, create_router};
use genepredict::storage::{Database, PredictionStore};
use genepredict::Model;
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

// =============================================================================
// Test Helpers
// =============================================================================

fn test_model() -> Model {
    serde_json::from_value(json!({
        "weights": [1.0, 1.0, 1.0, 1.0, 1.0],
        "intercept": 0.0,
    }))
    .unwrap()
}

/// Create test app state backed by a tempdir SQLite fallback.
fn create_test_state() -> (AppState, TempDir) {
    let dir = TempDir::new().expect("Failed to create tempdir");
    let config = DatabaseConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        connect_timeout: Duration::from_millis(250),
        sqlite_path: dir
            .path()
            .join("integration.db")
            .to_string_lossy()
            .into_owned(),
        ..DatabaseConfig::default()
    };

    let state = AppState {
        store: PredictionStore::new(Database::new(config)),
        model: Some(test_model()),
    };
    (state, dir)
}

/// Start test server and return base URL.
async fn start_test_server() -> (String, TempDir) {
    let (state, dir) = create_test_state();
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{}", addr), dir)
}

// =============================================================================
// Health Probe Tests
// =============================================================================

#[tokio::test]
async fn test_health_reports_fallback_backend() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Failed to send health request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse health response");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "sqlite");
    assert_eq!(body["model_loaded"], true);
}

#[tokio::test]
async fn test_db_probe_reports_version() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/test-db", base_url))
        .send()
        .await
        .expect("Failed to send test-db request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse test-db response");
    assert_eq!(body["status"], "success");
    assert_eq!(body["database_type"], "sqlite");
    assert!(
        body["version"].as_str().unwrap().starts_with("SQLite"),
        "version: {}",
        body["version"]
    );
}

// =============================================================================
// Prediction Flow Tests
// =============================================================================

#[tokio::test]
async fn test_predict_then_logs_and_stats() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    // Positive prediction with rounding-sensitive input
    let resp = client
        .post(format!("{}/predict", base_url))
        .json(&json!({
            "gene1": 1.11111, "gene2": 2.0, "gene3": 3.0, "gene4": 4.0, "gene5": 5.0
        }))
        .send()
        .await
        .expect("Failed to send predict request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["prediction"], "Positive");
    assert_eq!(body["prediction_numeric"], 1);
    assert_eq!(body["logged"], true);

    // Negative prediction
    let resp = client
        .post(format!("{}/predict", base_url))
        .json(&json!({
            "gene1": -1.0, "gene2": -2.0, "gene3": -3.0, "gene4": -4.0, "gene5": -5.0,
            "true_label": "Negative"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["prediction"], "Negative");
    assert_eq!(body["prediction_numeric"], 0);

    // Logs reflect both, newest first, genes rounded to 4 decimals
    let resp = client
        .get(format!("{}/api/logs?limit=10", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["count"], 2);
    let data = body["data"].as_array().unwrap();
    let positive = data
        .iter()
        .find(|r| r["prediction_label"] == "Positive")
        .expect("positive record present");
    assert_eq!(positive["gene1"], 1.1111);
    assert_eq!(positive["true_label"], Value::Null);
    let negative = data
        .iter()
        .find(|r| r["prediction_label"] == "Negative")
        .expect("negative record present");
    assert_eq!(negative["true_label"], "Negative");

    // Stats add up
    let resp = client
        .get(format!("{}/api/stats", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["positive"], 1);
    assert_eq!(body["data"]["negative"], 1);
    assert_eq!(body["data"]["recent_24h"], 2);
}

#[tokio::test]
async fn test_predict_form_roundtrip() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/predict", base_url))
        .form(&[
            ("gene1", "0.5"),
            ("gene2", "0.5"),
            ("gene3", "0.5"),
            ("gene4", "0.5"),
            ("gene5", "0.5"),
            ("true_label", "Positive"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Positive"), "body: {body}");
}

#[tokio::test]
async fn test_predict_rejects_bad_input_per_field() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/predict", base_url))
        .json(&json!({
            "gene1": 1.0, "gene2": "oops", "gene3": 3.0, "gene4": 4.0, "gene5": 5.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid or missing value for Gene 2");
}

// =============================================================================
// Dashboard Tests
// =============================================================================

#[tokio::test]
async fn test_dashboard_and_history_render() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/predict", base_url))
        .json(&json!({
            "gene1": 1.0, "gene2": 1.0, "gene3": 1.0, "gene4": 1.0, "gene5": 1.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client.get(format!("{}/dashboard", base_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Total predictions"), "body: {body}");

    let resp = client.get(format!("{}/history", base_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Prediction History"), "body: {body}");
}

#[tokio::test]
async fn test_logs_limit_is_capped() {
    let (base_url, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    // Request far more than the cap; server must not error
    let resp = client
        .get(format!("{}/api/logs?limit=100000", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["count"], 0);
}
