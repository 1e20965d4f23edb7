//! REST endpoint handlers organized by resource.

pub mod channel;
pub mod publish;
pub mod system;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;
use crate::sse::handler::sse_handler;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(sse_handler))
        .merge(publish::routes())
        .merge(channel::routes())
        .merge(system::api_routes())
}
