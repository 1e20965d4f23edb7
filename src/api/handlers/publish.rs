//! Publish handlers: arbitrary topics and library scan events.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::PublishResponse;
use crate::app_state::AppState;
use crate::domain::LocalScanEvent;
use crate::error::{ErrorResponse, PubSubError};

/// `POST /topics/{topic}/events`: Publish a JSON event.
///
/// # Errors
///
/// Returns [`PubSubError`] for an invalid topic, an oversized payload, or
/// once the service is shutting down.
#[utoipa::path(
    post,
    path = "/api/v1/topics/{topic}/events",
    tag = "Publish",
    summary = "Publish an event",
    description = "Assigns the next sequence id on the topic and queues the JSON body on every stream subscribed to it. Succeeds with zero subscribers; subscriber-side failures are never reported here.",
    params(
        ("topic" = String, Path, description = "Topic name"),
    ),
    request_body = serde_json::Value,
    responses(
        (status = 202, description = "Event accepted", body = PublishResponse),
        (status = 400, description = "Invalid topic or payload", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 503, description = "Service is shutting down or topic limit reached", body = ErrorResponse),
    )
)]
pub async fn publish_event(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, PubSubError> {
    let receipt = state.broadcaster.publish(&topic, payload)?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse::from(receipt))))
}

/// `POST /scan-events`: Publish a library scan progress event.
///
/// # Errors
///
/// Returns [`PubSubError`] for an oversized event or once the service is
/// shutting down.
#[utoipa::path(
    post,
    path = "/api/v1/scan-events",
    tag = "Publish",
    summary = "Publish a library scan event",
    description = "Publishes a typed scan lifecycle event on the `library.local-scan` topic.",
    request_body = LocalScanEvent,
    responses(
        (status = 202, description = "Event accepted", body = PublishResponse),
        (status = 413, description = "Event too large", body = ErrorResponse),
        (status = 503, description = "Service is shutting down or topic limit reached", body = ErrorResponse),
    )
)]
pub async fn publish_scan_event(
    State(state): State<AppState>,
    Json(event): Json<LocalScanEvent>,
) -> Result<impl IntoResponse, PubSubError> {
    let receipt = state.scan_notifier.notify(&event)?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse::from(receipt))))
}

/// Publish routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/topics/{topic}/events", post(publish_event))
        .route("/scan-events", post(publish_scan_event))
}
