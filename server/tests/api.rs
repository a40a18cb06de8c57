use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use flightsurety_oracle::app_state::AppState;
use flightsurety_oracle::routes;
use flightsurety_oracle::services::OracleStats;

async fn get(stats: Arc<OracleStats>, uri: &str) -> (StatusCode, Value) {
    let app = routes::app(AppState::new(stats), "http://localhost:8000");
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn api_returns_the_dapp_message() {
    let (status, body) = get(Arc::new(OracleStats::default()), "/api").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "An API for use with your Dapp!" }));
}

#[tokio::test]
async fn api_does_not_depend_on_the_node() {
    let stats = Arc::new(OracleStats::default());
    stats.record_transport_error();

    let (status, body) = get(stats, "/api").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "An API for use with your Dapp!");
}

#[tokio::test]
async fn health_reports_oracle_counters() {
    let stats = Arc::new(OracleStats::default());
    stats.set_connected(true);
    stats.record_event(true);
    stats.record_event(false);

    let (status, body) = get(stats, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["events_received"], 2);
    assert_eq!(body["events_matched"], 1);
    assert_eq!(body["last_acknowledged"], Value::Null);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let (status, _) = get(Arc::new(OracleStats::default()), "/api/flights").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
