//! SSE wire encoding of outbound frames.

use std::time::Duration;

use axum::response::sse::Event;
use serde::Serialize;

use crate::domain::{EventEnvelope, Frame};

/// `event:` field of event frames.
pub const EVENT_KIND: &str = "event";

/// `event:` field of heartbeat frames.
pub const HEARTBEAT_KIND: &str = "heartbeat";

/// `event:` field of gap notices.
pub const GAP_KIND: &str = "gap";

/// One SSE message before it is handed to Axum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// `event:` field.
    pub event: &'static str,
    /// `id:` field; only event frames carry one.
    pub id: Option<String>,
    /// `data:` field, a single line of JSON.
    pub data: String,
}

impl SseMessage {
    /// Encodes a frame.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Self {
        match frame {
            Frame::Event(envelope) => Self {
                event: EVENT_KIND,
                id: Some(event_id(envelope)),
                data: envelope.encoded().to_string(),
            },
            Frame::Heartbeat => Self {
                event: HEARTBEAT_KIND,
                id: None,
                data: "{}".to_string(),
            },
            Frame::Gap(notice) => Self {
                event: GAP_KIND,
                id: None,
                data: json_or_empty(notice, GAP_KIND),
            },
        }
    }

    /// Converts into an Axum SSE event.
    #[must_use]
    pub fn into_event(self) -> Event {
        let event = Event::default().event(self.event).data(self.data);
        match self.id {
            Some(id) => event.id(id),
            None => event,
        }
    }
}

impl From<&Frame> for SseMessage {
    fn from(frame: &Frame) -> Self {
        Self::from_frame(frame)
    }
}

/// `<topic>:<sequence_id>`, the SSE id of an event frame.
///
/// Browsers send it back as `Last-Event-ID` on reconnect.
#[must_use]
pub fn event_id(envelope: &EventEnvelope) -> String {
    format!("{}:{}", envelope.topic(), envelope.sequence_id())
}

/// Encodes `value` as JSON, logging and sending `{}` if that fails.
fn json_or_empty<T: Serialize>(value: &T, kind: &'static str) -> String {
    match serde_json::to_string(value) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(error = %e, kind, "failed to encode frame data");
            "{}".to_string()
        }
    }
}

/// First message of every stream: a comment carrying the reconnect hint.
#[must_use]
pub fn hello(retry: Duration) -> Event {
    Event::default().retry(retry).comment("connected")
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::domain::{GapNotice, Topic};

    fn topic() -> Topic {
        let Ok(topic) = Topic::parse("orders") else {
            panic!("valid topic rejected");
        };
        topic
    }

    #[test]
    fn event_frame_carries_id_and_envelope() {
        let Ok(envelope) =
            EventEnvelope::new(topic(), 7, serde_json::json!({"total": 3}), Utc::now())
        else {
            panic!("envelope construction failed");
        };
        let message = SseMessage::from(&Frame::Event(Arc::new(envelope)));
        assert_eq!(message.event, "event");
        assert_eq!(message.id.as_deref(), Some("orders:7"));

        let Ok(data) = serde_json::from_str::<serde_json::Value>(&message.data) else {
            panic!("data is not JSON");
        };
        assert_eq!(data.pointer("/sequence_id").and_then(|v| v.as_u64()), Some(7));
        assert_eq!(data.pointer("/payload/total").and_then(|v| v.as_u64()), Some(3));
        assert!(data.get("created_at").is_some());
    }

    #[test]
    fn heartbeat_has_no_id() {
        let message = SseMessage::from(&Frame::Heartbeat);
        assert_eq!(message.event, "heartbeat");
        assert!(message.id.is_none());
        assert_eq!(message.data, "{}");
    }

    #[test]
    fn gap_serializes_notice() {
        let message = SseMessage::from(&Frame::Gap(GapNotice {
            topic: topic(),
            requested_after: 2,
            oldest_available: Some(8),
            latest: 10,
        }));
        assert_eq!(message.event, "gap");
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&message.data) else {
            panic!("data is not JSON");
        };
        assert_eq!(data.pointer("/topic").and_then(|v| v.as_str()), Some("orders"));
        assert_eq!(data.pointer("/oldest_available").and_then(|v| v.as_u64()), Some(8));
    }

    #[test]
    fn unencodable_data_falls_back_to_empty_object() {
        // JSON object keys must be strings.
        let mut bad = std::collections::HashMap::new();
        bad.insert((1_u8, 2_u8), 3_u8);
        assert_eq!(json_or_empty(&bad, GAP_KIND), "{}");
        assert_eq!(json_or_empty(&serde_json::json!({"a": 1}), GAP_KIND), r#"{"a":1}"#);
    }
}
