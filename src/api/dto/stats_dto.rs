//! Stats DTOs.

use serde::Serialize;
use utoipa::ToSchema;

/// Per-topic stats.
#[derive(Debug, Serialize, ToSchema)]
pub struct TopicStatsDto {
    /// Topic name.
    pub topic: String,
    /// Latest assigned sequence id.
    pub latest_sequence_id: u64,
    /// Open streams subscribed to it.
    pub subscribers: usize,
}

/// Response body for `GET /stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Streams with a running delivery task.
    pub live_connections: usize,
    /// Open channels in the registry.
    pub open_channels: usize,
    /// Topics with at least one subscriber.
    pub active_topics: usize,
    /// Events accepted since startup.
    pub published: u64,
    /// Events evicted from full buffers since startup.
    pub dropped: u64,
    /// Streams closed as slow consumers since startup.
    pub slow_consumers_closed: u64,
    /// Idle topic logs evicted since startup.
    pub topics_evicted: u64,
    /// `drop_oldest` or `close_slow`.
    pub backpressure_policy: String,
    /// Every topic with a retained log.
    pub topics: Vec<TopicStatsDto>,
}
