//! Channel administration DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{AttachOutcome, ChannelStatus, SubscriberChannel};

/// Response body for `GET /channels/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChannelResponse {
    /// Channel identifier.
    pub channel_id: uuid::Uuid,
    /// `open`, `draining` or `closed`.
    pub status: String,
    /// Subscribed topics, sorted.
    pub topics: Vec<String>,
    /// Frames waiting to be written.
    pub pending: usize,
    /// Buffer capacity in events.
    pub capacity: usize,
    /// Events evicted by the drop-oldest policy.
    pub dropped: u64,
    /// Seconds since the stream was opened.
    pub age_secs: u64,
}

impl From<&SubscriberChannel> for ChannelResponse {
    fn from(channel: &SubscriberChannel) -> Self {
        let status = match channel.status() {
            ChannelStatus::Open => "open",
            ChannelStatus::Draining => "draining",
            ChannelStatus::Closed => "closed",
        };
        Self {
            channel_id: channel.id().into(),
            status: status.to_string(),
            topics: channel.topics().iter().map(ToString::to_string).collect(),
            pending: channel.pending(),
            capacity: channel.capacity(),
            dropped: channel.dropped(),
            age_secs: channel.created_at().elapsed().as_secs(),
        }
    }
}

/// Response body for topic attach and detach.
#[derive(Debug, Serialize, ToSchema)]
pub struct TopicChangeResponse {
    /// Channel identifier.
    pub channel_id: uuid::Uuid,
    /// Topic attached or detached.
    pub topic: String,
    /// `true` if the subscription set changed.
    pub changed: bool,
}

impl TopicChangeResponse {
    /// Builds the response for an attach.
    #[must_use]
    pub fn attached(channel_id: uuid::Uuid, topic: &str, outcome: &AttachOutcome) -> Self {
        Self {
            channel_id,
            topic: topic.to_string(),
            changed: !matches!(outcome, AttachOutcome::Closed),
        }
    }
}
