//! Axum SSE stream handler.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::response::sse::Sse;
use futures_util::StreamExt;
use futures_util::stream;
use tokio_stream::wrappers::ReceiverStream;

use super::messages::{self, SseMessage};
use super::subscription::{StreamQuery, SubscriptionRequest};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, PubSubError};

/// Response header carrying the id of the stream's channel.
pub const CHANNEL_ID_HEADER: &str = "x-channel-id";

/// `GET /api/v1/events`: Open a Server-Sent Events stream.
///
/// # Errors
///
/// Returns [`PubSubError`] if the request is invalid, the service is
/// shutting down, or no topic log is free.
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "Streams",
    summary = "Open an event stream",
    description = "Subscribes to the given topics and streams `event`, `heartbeat` and `gap` frames. Supplying `last_seen` (or a `Last-Event-ID` header) replays retained events after that point, or sends a gap notice if they are no longer retained. The header names one topic and wins over an older `last_seen` for it; other topics of a multi-topic stream resume only from explicit `last_seen` entries.",
    params(StreamQuery),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 400, description = "Invalid topics or replay points", body = ErrorResponse),
        (status = 503, description = "Service is shutting down or topic limit reached", body = ErrorResponse),
    )
)]
pub async fn sse_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, PubSubError> {
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok());
    let request = SubscriptionRequest::parse(
        &query,
        last_event_id,
        state.connections.config().max_topics_per_stream,
    )?;
    let opened = state.connections.open(&request)?;

    let hello = messages::hello(state.sse_retry);
    let frames = ReceiverStream::new(opened.frames)
        .map(|frame| Ok::<_, Infallible>(SseMessage::from(&frame).into_event()));
    let body = stream::once(async move { Ok::<_, Infallible>(hello) }).chain(frames);

    Ok((
        [(CHANNEL_ID_HEADER, opened.channel_id.to_string())],
        Sse::new(body),
    ))
}
