//! OpenAPI document for the HTTP surface.

use utoipa::OpenApi;

use super::handlers::{channel, publish, system};
use crate::sse::handler as stream;

/// Aggregated OpenAPI document, served by Swagger UI when the
/// `swagger-ui` feature is enabled.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "pantheon-sse",
        description = "In-process topic pub/sub delivered over Server-Sent Events"
    ),
    paths(
        stream::sse_handler,
        publish::publish_event,
        publish::publish_scan_event,
        channel::get_channel,
        channel::close_channel,
        channel::subscribe_topic,
        channel::unsubscribe_topic,
        system::health_handler,
        system::stats_handler,
    ),
    tags(
        (name = "Streams", description = "Long-lived event streams"),
        (name = "Publish", description = "Event publication"),
        (name = "Channels", description = "Live stream administration"),
        (name = "System", description = "Health and stats"),
    )
)]
pub struct ApiDoc;
