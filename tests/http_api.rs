//! Router-level tests driven through `tower::ServiceExt::oneshot`.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::StreamExt;
use tower::ServiceExt;

use pantheon_sse::api;
use pantheon_sse::app_state::AppState;
use pantheon_sse::config::{PubSubConfig, ServerConfig};

fn app_with(pubsub: PubSubConfig) -> (Router, AppState) {
    let config = ServerConfig {
        pubsub,
        ..ServerConfig::default()
    };
    let state = AppState::new(&config);
    (api::build_router().with_state(state.clone()), state)
}

fn app() -> (Router, AppState) {
    app_with(PubSubConfig::default())
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    let Ok(request) = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
    else {
        panic!("request build failed");
    };
    request
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    let Ok(request) = Request::builder().method(method).uri(uri).body(Body::empty()) else {
        panic!("request build failed");
    };
    request
}

async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
    let Ok(response) = app.clone().oneshot(request).await else {
        panic!("router failed");
    };
    response
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("body read failed");
    };
    let Ok(value) = serde_json::from_slice(&bytes) else {
        panic!("body is not JSON");
    };
    value
}

#[tokio::test]
async fn health_reports_healthy() {
    let (app, _) = app();
    let response = send(&app, empty_request("GET", "/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn publish_assigns_increasing_sequence_ids() {
    let (app, _) = app();
    for expected in 1..=2 {
        let response = send(
            &app,
            json_request("POST", "/api/v1/topics/orders/events", serde_json::json!({"n": expected})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = read_json(response).await;
        assert_eq!(body["topic"], "orders");
        assert_eq!(body["sequence_id"], expected);
        assert_eq!(body["delivered"], 0);
    }
}

#[tokio::test]
async fn publish_rejects_invalid_topic() {
    let (app, _) = app();
    let response = send(
        &app,
        json_request("POST", "/api/v1/topics/bad%20topic/events", serde_json::json!(1)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], 1001);
}

#[tokio::test]
async fn publish_rejects_oversized_payload() {
    let (app, state) = app_with(PubSubConfig {
        max_payload_bytes: 256,
        ..PubSubConfig::default()
    });
    let response = send(
        &app,
        json_request(
            "POST",
            "/api/v1/topics/orders/events",
            serde_json::json!("x".repeat(1024)),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(read_json(response).await["error"]["code"], 1004);
    assert_eq!(state.broadcaster.latest_sequence("orders"), 0);
}

#[tokio::test]
async fn scan_event_lands_on_scan_topic() {
    let (app, state) = app();
    let response = send(
        &app,
        json_request(
            "POST",
            "/api/v1/scan-events",
            serde_json::json!({
                "event_type": "started",
                "platform_name": "steam",
                "total_games": 40
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(read_json(response).await["topic"], "library.local-scan");
    assert_eq!(state.broadcaster.latest_sequence("library.local-scan"), 1);
}

#[tokio::test]
async fn stream_without_topics_is_rejected() {
    let (app, _) = app();
    let response = send(&app, empty_request("GET", "/api/v1/events")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"]["code"], 1003);
}

#[tokio::test]
async fn unknown_channel_is_not_found() {
    let (app, _) = app();
    let uri = format!("/api/v1/channels/{}", uuid::Uuid::new_v4());
    let response = send(&app, empty_request("DELETE", &uri)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["error"]["code"], 2001);
}

#[tokio::test]
async fn stream_delivers_published_events() {
    let (app, _) = app();
    let response = send(&app, empty_request("GET", "/api/v1/events?topics=orders")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    let Some(channel_id) = response
        .headers()
        .get("x-channel-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        panic!("missing x-channel-id header");
    };

    let mut body = response.into_body().into_data_stream();
    let hello = next_chunk(&mut body).await;
    assert!(hello.contains("retry:3000"), "unexpected first chunk {hello:?}");

    let published = send(
        &app,
        json_request("POST", "/api/v1/topics/orders/events", serde_json::json!({"id": 7})),
    )
    .await;
    assert_eq!(read_json(published).await["delivered"], 1);

    let event = next_chunk(&mut body).await;
    assert!(event.contains("event: event"), "unexpected chunk {event:?}");
    assert!(event.contains("id: orders:1"), "unexpected chunk {event:?}");

    let details = send(&app, empty_request("GET", &format!("/api/v1/channels/{channel_id}"))).await;
    assert_eq!(details.status(), StatusCode::OK);
    assert_eq!(read_json(details).await["topics"][0], "orders");
}

#[tokio::test]
async fn channel_topics_can_change_at_runtime() {
    let (app, state) = app();
    let response = send(&app, empty_request("GET", "/api/v1/events?topics=orders")).await;
    let Some(channel_id) = response
        .headers()
        .get("x-channel-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        panic!("missing x-channel-id header");
    };

    let attach = format!("/api/v1/channels/{channel_id}/topics/invoices");
    let attached = send(&app, empty_request("POST", &attach)).await;
    assert_eq!(attached.status(), StatusCode::OK);
    assert_eq!(read_json(attached).await["changed"], true);
    assert_eq!(state.connections.registry().fanout_targets("invoices").len(), 1);

    let detach = format!("/api/v1/channels/{channel_id}/topics/orders");
    let detached = send(&app, empty_request("DELETE", &detach)).await;
    assert_eq!(read_json(detached).await["changed"], true);
    assert!(state.connections.registry().fanout_targets("orders").is_empty());

    let closed = send(&app, empty_request("DELETE", &format!("/api/v1/channels/{channel_id}"))).await;
    assert_eq!(closed.status(), StatusCode::NO_CONTENT);
    drop(response);
}

#[tokio::test]
async fn stats_reflect_activity() {
    let (app, _) = app();
    let _stream = send(&app, empty_request("GET", "/api/v1/events?topics=orders")).await;
    let _ = send(
        &app,
        json_request("POST", "/api/v1/topics/orders/events", serde_json::json!(1)),
    )
    .await;

    let stats = read_json(send(&app, empty_request("GET", "/api/v1/stats")).await).await;
    assert_eq!(stats["open_channels"], 1);
    assert_eq!(stats["published"], 1);
    assert_eq!(stats["backpressure_policy"], "drop_oldest");
    assert_eq!(stats["topics"][0]["topic"], "orders");
    assert_eq!(stats["topics"][0]["latest_sequence_id"], 1);
    assert_eq!(stats["topics"][0]["subscribers"], 1);
}

#[tokio::test]
async fn topic_limit_evicts_idle_topics_then_refuses() {
    let (app, _) = app_with(PubSubConfig {
        max_topics: 2,
        ..PubSubConfig::default()
    });
    for name in ["a", "b", "c"] {
        let uri = format!("/api/v1/topics/{name}/events");
        let response = send(&app, json_request("POST", &uri, serde_json::json!(1))).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
    let stats = read_json(send(&app, empty_request("GET", "/api/v1/stats")).await).await;
    assert_eq!(stats["topics_evicted"], 1);
    assert_eq!(stats["topics"].as_array().map(Vec::len), Some(2));

    let _stream = send(&app, empty_request("GET", "/api/v1/events?topics=b,c")).await;
    let refused = send(
        &app,
        json_request("POST", "/api/v1/topics/d/events", serde_json::json!(1)),
    )
    .await;
    assert_eq!(refused.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(refused).await;
    assert_eq!(body["error"]["code"], 3002);
    assert_eq!(body["error"]["details"], "limit_topics=2");
}

async fn next_chunk<S>(body: &mut S) -> String
where
    S: futures_util::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
{
    let Ok(Some(Ok(chunk))) = tokio::time::timeout(Duration::from_secs(2), body.next()).await
    else {
        panic!("no chunk within two seconds");
    };
    String::from_utf8_lossy(&chunk).into_owned()
}
