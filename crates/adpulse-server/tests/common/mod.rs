#![allow(dead_code)]

use adpulse_common::types::{Campaign, Sensitivity};
use adpulse_server::app;
use adpulse_server::config::{InsightsConfig, ServerConfig};
use adpulse_server::seed;
use adpulse_server::state::AppState;
use adpulse_storage::engine::SqliteRecordStore;
use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const CAMPAIGN_ID: &str = "c-1";

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

/// Server over a fresh database with campaign `c-1` ($1000/day) and its
/// default monitors. Insight generation is disabled.
pub fn build_test_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let store = Arc::new(SqliteRecordStore::new(temp_dir.path())?);

    let config = ServerConfig {
        data_dir: temp_dir.path().to_string_lossy().to_string(),
        insights: InsightsConfig {
            provider: "none".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let state = AppState::with_store(config, store)?;
    let campaign = Campaign {
        id: CAMPAIGN_ID.to_string(),
        name: "Summer Sale".to_string(),
        daily_budget: 1000.0,
        sensitivity: Sensitivity::Balanced,
    };
    seed::enable_monitoring(&state.store, &campaign, &[])?;

    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

/// One aggregate sample per value, a minute apart, all with the same
/// expected value.
pub fn samples(metric_id: &str, values: &[f64], expected: f64) -> Value {
    let base = Utc
        .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp");
    let items: Vec<Value> = values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            json!({
                "campaign_id": CAMPAIGN_ID,
                "metric_id": metric_id,
                "timestamp": (base + Duration::minutes(i as i64)).to_rfc3339(),
                "value": value,
                "expected": expected,
            })
        })
        .collect();
    Value::Array(items)
}

pub async fn monitor_id_for(app: &axum::Router, metric_id: &str) -> String {
    let (status, body, _) = request_json(
        app,
        "GET",
        &format!("/v1/campaigns/{CAMPAIGN_ID}/monitors"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]
        .as_array()
        .expect("monitor list")
        .iter()
        .find(|m| m["metric"]["id"] == metric_id)
        .and_then(|m| m["id"].as_str())
        .expect("monitor for metric")
        .to_string()
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let req_body = body.map(|b| b.to_string()).unwrap_or_default();
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(req_body))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}
