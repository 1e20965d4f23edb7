//! System endpoints: health check and pub/sub stats.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::dto::{StatsResponse, TopicStatsDto};
use crate::app_state::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp. Reports `shutting_down` with 503 once shutdown has begun.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is shutting down", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (status, label) = if state.broadcaster.is_accepting() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting_down")
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /stats`: Pub/sub counters and per-topic sequence ids.
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "System",
    summary = "Pub/sub stats",
    description = "Returns open channel counts, publish counters, and the latest sequence id and subscriber count of every known topic.",
    responses(
        (status = 200, description = "Current stats", body = StatsResponse),
    )
)]
pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.connections.registry();
    let subscribers: HashMap<String, usize> = registry
        .occupancy()
        .into_iter()
        .map(|o| (o.topic.to_string(), o.subscribers))
        .collect();
    let counters = state.broadcaster.stats();

    let topics = state
        .broadcaster
        .topic_sequences()
        .into_iter()
        .map(|sequence| {
            let topic = sequence.topic.to_string();
            TopicStatsDto {
                subscribers: subscribers.get(&topic).copied().unwrap_or_default(),
                latest_sequence_id: sequence.latest,
                topic,
            }
        })
        .collect();

    Json(StatsResponse {
        live_connections: state.connections.live_connections(),
        open_channels: registry.channel_count(),
        active_topics: registry.topic_count(),
        published: counters.published,
        dropped: counters.dropped,
        slow_consumers_closed: counters.slow_consumers_closed,
        topics_evicted: counters.topics_evicted,
        backpressure_policy: state.broadcaster.policy().to_string(),
        topics,
    })
}

/// Routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}

/// Stats routes, mounted under /api/v1.
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/stats", get(stats_handler))
}
