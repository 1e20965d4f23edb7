//! Immutable published events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Topic;
use crate::error::PubSubError;

/// One published event.
///
/// Built once per publish call and shared through `Arc` by every channel it
/// is fanned out to and by the topic's replay log. The JSON wire encoding
/// is computed at construction, so fan-out to many channels never
/// re-serializes the payload.
#[derive(Debug, Serialize)]
pub struct EventEnvelope {
    topic: Topic,
    sequence_id: u64,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    encoded: String,
}

impl EventEnvelope {
    /// Builds an envelope and its wire encoding.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::InvalidPayload`] if the envelope cannot be
    /// serialized.
    pub fn new(
        topic: Topic,
        sequence_id: u64,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<Self, PubSubError> {
        let mut envelope = Self {
            topic,
            sequence_id,
            payload,
            created_at,
            encoded: String::new(),
        };
        envelope.encoded = serde_json::to_string(&envelope)
            .map_err(|e| PubSubError::InvalidPayload(e.to_string()))?;
        Ok(envelope)
    }

    /// Topic the envelope was published to.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Topic-scoped, strictly increasing sequence id.
    #[must_use]
    pub const fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Opaque payload supplied by the publisher.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Publish timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// JSON encoding of `{topic, sequence_id, payload, created_at}`.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Size of the wire encoding in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn topic(name: &str) -> Topic {
        let Ok(topic) = Topic::parse(name) else {
            panic!("valid topic rejected");
        };
        topic
    }

    #[test]
    fn encoding_carries_all_fields() {
        let Ok(envelope) = EventEnvelope::new(
            topic("orders"),
            7,
            serde_json::json!({"id": 42}),
            Utc::now(),
        ) else {
            panic!("envelope construction failed");
        };
        let Ok(decoded) = serde_json::from_str::<serde_json::Value>(envelope.encoded()) else {
            panic!("encoding is not JSON");
        };
        assert_eq!(decoded.pointer("/topic").and_then(|v| v.as_str()), Some("orders"));
        assert_eq!(decoded.pointer("/sequence_id").and_then(|v| v.as_u64()), Some(7));
        assert_eq!(decoded.pointer("/payload/id").and_then(|v| v.as_u64()), Some(42));
        assert!(decoded.get("created_at").is_some());
        assert!(decoded.get("encoded").is_none());
    }

    #[test]
    fn encoded_len_matches_encoding() {
        let Ok(envelope) =
            EventEnvelope::new(topic("orders"), 1, serde_json::json!("A"), Utc::now())
        else {
            panic!("envelope construction failed");
        };
        assert_eq!(envelope.encoded_len(), envelope.encoded().len());
    }
}
