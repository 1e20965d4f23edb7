//! Frames queued in a subscriber channel and written to the client.

use std::sync::Arc;

use serde::Serialize;

use super::{EventEnvelope, Topic};

/// Tells the client that the replay point it asked for is no longer
/// retained, so it must resynchronize instead of assuming it missed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapNotice {
    /// Topic the gap applies to.
    pub topic: Topic,
    /// The `last_seen` id the client supplied.
    pub requested_after: u64,
    /// Oldest sequence id still retained, if any.
    pub oldest_available: Option<u64>,
    /// Latest sequence id assigned on the topic (0 if none).
    pub latest: u64,
}

/// One unit of outbound traffic.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A published event.
    Event(Arc<EventEnvelope>),
    /// Keepalive with no payload.
    Heartbeat,
    /// Replay history was not available.
    Gap(GapNotice),
}

impl Frame {
    /// Frame kind as used for the SSE `event:` field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::Heartbeat => "heartbeat",
            Self::Gap(_) => "gap",
        }
    }

    /// Only event frames count toward channel capacity; control frames
    /// are bounded by construction (one heartbeat at a time, one gap
    /// notice per attached topic).
    #[must_use]
    pub const fn counts_toward_capacity(&self) -> bool {
        matches!(self, Self::Event(_))
    }

    /// Returns the envelope if this is an event frame.
    #[must_use]
    pub fn envelope(&self) -> Option<&Arc<EventEnvelope>> {
        match self {
            Self::Event(envelope) => Some(envelope),
            Self::Heartbeat | Self::Gap(_) => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn control_frames_are_free() {
        assert!(!Frame::Heartbeat.counts_toward_capacity());
        assert_eq!(Frame::Heartbeat.kind(), "heartbeat");
    }

    #[test]
    fn gap_notice_serializes_optional_oldest() {
        let Ok(topic) = Topic::parse("orders") else {
            panic!("valid topic rejected");
        };
        let gap = GapNotice {
            topic,
            requested_after: 3,
            oldest_available: None,
            latest: 9,
        };
        let json = serde_json::to_string(&gap).unwrap_or_default();
        assert!(json.contains("\"oldest_available\":null"));
        assert!(json.contains("\"requested_after\":3"));
        assert!(!Frame::Gap(gap).counts_toward_capacity());
    }
}
