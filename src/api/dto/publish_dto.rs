//! Publish DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::PublishReceipt;

/// Response body for `POST /topics/{topic}/events` and `POST /scan-events`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublishResponse {
    /// Topic the event was published to.
    pub topic: String,
    /// Sequence id assigned to the event.
    pub sequence_id: u64,
    /// Streams the event was queued on.
    pub delivered: usize,
    /// Streams that evicted an older event to make room.
    pub dropped: usize,
}

impl From<PublishReceipt> for PublishResponse {
    fn from(receipt: PublishReceipt) -> Self {
        Self {
            topic: receipt.topic.to_string(),
            sequence_id: receipt.sequence_id,
            delivered: receipt.delivered,
            dropped: receipt.dropped,
        }
    }
}
