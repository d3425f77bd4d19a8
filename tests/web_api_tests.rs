//! Integration tests for the web API.
//!
//! These tests drive the router with mock hardware and check both the HTTP
//! status and the pins that moved.

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use prl_launcher::hal::{MockClock, MockGpio};
use prl_launcher::services::{build_router, AppState, SharedLauncher, WebServerConfig};
use prl_launcher::{Config, Launcher, Level};

fn create_test_app() -> (axum::Router, AppState<MockGpio, MockClock>, Arc<MockGpio>) {
    let gpio = Arc::new(MockGpio::new());
    let launcher = Launcher::new(
        &Config::default(),
        Arc::clone(&gpio),
        Arc::new(MockClock::new()),
    )
    .unwrap();
    gpio.clear_writes();
    let state = Arc::new(SharedLauncher::new(launcher, "PRL2016"));
    let router = build_router(Arc::clone(&state), &WebServerConfig::default());
    (router, state, gpio)
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header("Content-Type", "application/json");
    }
    let request = request
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_index_returns_name() {
    let (app, _, _) = create_test_app();

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"PRL2016");
}

// ============================================================================
// Launch Routes
// ============================================================================

#[tokio::test]
async fn test_fire_requires_arming() {
    let (app, _, gpio) = create_test_app();

    let (status, json) = send(&app, "POST", "/launch/fire", Some(r#"{"tubeIds": [1]}"#)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "System is not armed!");
    assert!(gpio.writes().is_empty());
}

#[tokio::test]
async fn test_fire_without_body() {
    let (app, _, _) = create_test_app();
    send(&app, "POST", "/launch/arm", None).await;

    let (status, json) = send(&app, "POST", "/launch/fire", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No JSON received.");
}

#[tokio::test]
async fn test_fire_malformed_json() {
    let (app, _, _) = create_test_app();

    let (status, json) = send(&app, "POST", "/launch/fire", Some(r#"{"tubes": 3}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid JSON"));
}

#[tokio::test]
async fn test_fire_unknown_tube() {
    let (app, _, gpio) = create_test_app();
    send(&app, "POST", "/launch/arm", None).await;

    let (status, _) = send(&app, "POST", "/launch/fire", Some(r#"{"tubeIds": [1, 42]}"#)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(gpio.writes().is_empty());
}

#[tokio::test]
async fn test_fire_empty_list() {
    let (app, _, _) = create_test_app();
    send(&app, "POST", "/launch/arm", None).await;

    let (status, _) = send(&app, "POST", "/launch/fire", Some(r#"{"tubeIds": []}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fire_and_status() {
    let (app, _, gpio) = create_test_app();
    send(&app, "POST", "/launch/load", Some(r#"{"tubeIds": [3, 4]}"#)).await;
    send(&app, "POST", "/launch/arm", None).await;

    let (status, json) = send(&app, "POST", "/launch/fire", Some(r#"{"tubeIds": [3, 5, 9]}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["tubes"], serde_json::json!([3, 5, 9]));
    assert_eq!(gpio.writes().len(), 6);

    let (_, json) = send(&app, "GET", "/launch/status", None).await;
    let tubes = json["data"]["tubes"].as_array().unwrap();
    assert_eq!(json["data"]["armed"], true);
    assert_eq!(tubes.len(), 14);
    assert_eq!(tubes[2]["loaded"], false);
    assert_eq!(tubes[3]["loaded"], true);
}

#[tokio::test]
async fn test_fire_all() {
    let (app, state, gpio) = create_test_app();
    state.arm();

    let (status, json) = send(&app, "POST", "/launch/fire/all", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["tubes"].as_array().unwrap().len(), 14);
    assert_eq!(gpio.writes().len(), 28);
}

#[tokio::test]
async fn test_disarm_blocks_fire_all() {
    let (app, state, _) = create_test_app();
    state.arm();
    send(&app, "POST", "/launch/disarm", None).await;

    let (status, _) = send(&app, "POST", "/launch/fire/all", None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_relay_test_route() {
    let (app, _, gpio) = create_test_app();

    let (status, _) = send(&app, "GET", "/test", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(gpio.writes().len(), 36);
}

// ============================================================================
// Motion Routes
// ============================================================================

#[tokio::test]
async fn test_move_start_and_state() {
    let (app, _, gpio) = create_test_app();

    let (status, _) = send(&app, "POST", "/move/start", Some(r#"{"up": true, "cw": true}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(&app, "GET", "/move/state", None).await;
    assert_eq!(
        json["data"],
        serde_json::json!({"up": true, "down": false, "cw": true, "ccw": false})
    );
    assert_eq!(gpio.level(25), Level::High);
    assert_eq!(gpio.level(24), Level::High);
}

#[tokio::test]
async fn test_move_conflict() {
    let (app, _, gpio) = create_test_app();

    let (status, _) = send(&app, "POST", "/move/start", Some(r#"{"cw": true, "ccw": true}"#)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(gpio.writes().is_empty());
}

#[tokio::test]
async fn test_move_stop_and_estop() {
    let (app, state, gpio) = create_test_app();
    send(&app, "POST", "/move/start", Some(r#"{"down": true, "ccw": true}"#)).await;

    let (status, _) = send(&app, "POST", "/move/stop", Some(r#"{"down": true}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!state.launcher().query_motion_state().down);

    let (status, _) = send(&app, "POST", "/move/estop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!state.launcher().query_motion_state().any());
    assert_eq!(gpio.level(10), Level::Low);
}

#[tokio::test]
async fn test_encoders_route() {
    let (app, _, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/move/encoders", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], serde_json::json!({"vertical": 0, "horizontal": 0}));
}

#[tokio::test]
async fn test_audit_route() {
    let (app, _, _) = create_test_app();
    send(&app, "POST", "/move/start", Some(r#"{"up": true}"#)).await;

    let (_, json) = send(&app, "GET", "/audit", None).await;
    let trail = json["data"].as_array().unwrap();
    let last = trail.last().unwrap();

    assert_eq!(last["pin"], "move_output_up");
    assert_eq!(last["physical_id"], 25);
}

#[tokio::test]
async fn test_not_found() {
    let (app, _, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/nonexistent", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}
