//! Channel administration: inspect, close, and change topics of a live
//! stream. The stream response's `x-channel-id` header names the channel.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::api::dto::{ChannelResponse, TopicChangeResponse};
use crate::app_state::AppState;
use crate::domain::ChannelId;
use crate::error::{ErrorResponse, PubSubError};

/// `GET /channels/{id}`: Inspect an open channel.
///
/// # Errors
///
/// Returns [`PubSubError::ChannelNotFound`] if no open channel has `id`.
#[utoipa::path(
    get,
    path = "/api/v1/channels/{id}",
    tag = "Channels",
    summary = "Get channel details",
    params(
        ("id" = uuid::Uuid, Path, description = "Channel UUID"),
    ),
    responses(
        (status = 200, description = "Channel details", body = ChannelResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse),
    )
)]
pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, PubSubError> {
    let channel = state.connections.channel(ChannelId::from_uuid(id))?;
    Ok(Json(ChannelResponse::from(channel.as_ref())))
}

/// `DELETE /channels/{id}`: Close a stream after flushing what it holds.
///
/// # Errors
///
/// Returns [`PubSubError::ChannelNotFound`] if no open channel has `id`.
#[utoipa::path(
    delete,
    path = "/api/v1/channels/{id}",
    tag = "Channels",
    summary = "Close a channel",
    params(
        ("id" = uuid::Uuid, Path, description = "Channel UUID"),
    ),
    responses(
        (status = 204, description = "Channel closing"),
        (status = 404, description = "Channel not found", body = ErrorResponse),
    )
)]
pub async fn close_channel(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, PubSubError> {
    state.connections.close(ChannelId::from_uuid(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /channels/{id}/topics/{topic}`: Attach a topic to a live stream.
///
/// Only events published after this call are delivered for the new topic.
///
/// # Errors
///
/// Returns [`PubSubError`] if the channel is unknown, the topic invalid,
/// or the per-stream topic limit reached.
#[utoipa::path(
    post,
    path = "/api/v1/channels/{id}/topics/{topic}",
    tag = "Channels",
    summary = "Subscribe a channel to a topic",
    params(
        ("id" = uuid::Uuid, Path, description = "Channel UUID"),
        ("topic" = String, Path, description = "Topic name"),
    ),
    responses(
        (status = 200, description = "Topic attached", body = TopicChangeResponse),
        (status = 400, description = "Invalid topic or too many topics", body = ErrorResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse),
        (status = 503, description = "Topic limit reached", body = ErrorResponse),
    )
)]
pub async fn subscribe_topic(
    State(state): State<AppState>,
    Path((id, topic)): Path<(uuid::Uuid, String)>,
) -> Result<impl IntoResponse, PubSubError> {
    let outcome = state
        .connections
        .subscribe_topic(ChannelId::from_uuid(id), &topic)?;
    Ok(Json(TopicChangeResponse::attached(id, &topic, &outcome)))
}

/// `DELETE /channels/{id}/topics/{topic}`: Detach a topic from a live
/// stream.
///
/// # Errors
///
/// Returns [`PubSubError::ChannelNotFound`] if no open channel has `id`.
#[utoipa::path(
    delete,
    path = "/api/v1/channels/{id}/topics/{topic}",
    tag = "Channels",
    summary = "Unsubscribe a channel from a topic",
    params(
        ("id" = uuid::Uuid, Path, description = "Channel UUID"),
        ("topic" = String, Path, description = "Topic name"),
    ),
    responses(
        (status = 200, description = "Topic detached (or was not attached)", body = TopicChangeResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse),
    )
)]
pub async fn unsubscribe_topic(
    State(state): State<AppState>,
    Path((id, topic)): Path<(uuid::Uuid, String)>,
) -> Result<impl IntoResponse, PubSubError> {
    let changed = state
        .connections
        .unsubscribe_topic(ChannelId::from_uuid(id), &topic)?;
    Ok(Json(TopicChangeResponse {
        channel_id: id,
        topic,
        changed,
    }))
}

/// Channel routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/channels/{id}", get(get_channel).delete(close_channel))
        .route(
            "/channels/{id}/topics/{topic}",
            delete(unsubscribe_topic).post(subscribe_topic),
        )
}
