//! Per-topic sequencing and bounded replay retention.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{EventEnvelope, GapNotice, Topic};
use crate::error::PubSubError;

/// What a reconnecting client gets for one topic.
#[derive(Debug, Clone)]
pub enum ReplayPlan {
    /// Retained envelopes after the replay point, oldest first. May be empty.
    Backlog(Vec<Arc<EventEnvelope>>),
    /// The replay point is not covered by retained history.
    Gap(GapNotice),
}

/// Sequence counter and retained history of one topic.
///
/// Sequence ids start at 1, so a client that has seen nothing may ask for
/// everything after 0. Callers hold the log's lock across "append, then
/// fan out" so delivery order always matches sequence order.
#[derive(Debug)]
pub struct TopicLog {
    topic: Topic,
    next_sequence: u64,
    retained: VecDeque<Arc<EventEnvelope>>,
    retention: usize,
}

impl TopicLog {
    /// Creates an empty log keeping at most `retention` envelopes.
    #[must_use]
    pub fn new(topic: Topic, retention: usize) -> Self {
        Self {
            topic,
            next_sequence: 1,
            retained: VecDeque::with_capacity(retention.min(1024)),
            retention,
        }
    }

    /// The topic this log sequences.
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Latest assigned sequence id, or 0 if nothing was published yet.
    #[must_use]
    pub const fn latest(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    /// Oldest retained sequence id, if any.
    #[must_use]
    pub fn oldest_retained(&self) -> Option<u64> {
        self.retained.front().map(|e| e.sequence_id())
    }

    /// Number of retained envelopes.
    #[must_use]
    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    /// Assigns the next sequence id and retains the resulting envelope.
    ///
    /// The counter only advances once the envelope is valid, so a rejected
    /// payload leaves no hole in the sequence.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::InvalidPayload`] if the envelope cannot be
    /// encoded, or [`PubSubError::PayloadTooLarge`] if its encoding exceeds
    /// `max_encoded_len`.
    pub fn append(
        &mut self,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
        max_encoded_len: usize,
    ) -> Result<Arc<EventEnvelope>, PubSubError> {
        let envelope =
            EventEnvelope::new(self.topic.clone(), self.next_sequence, payload, created_at)?;
        if envelope.encoded_len() > max_encoded_len {
            return Err(PubSubError::PayloadTooLarge {
                size: envelope.encoded_len(),
                limit: max_encoded_len,
            });
        }
        self.next_sequence = self
            .next_sequence
            .checked_add(1)
            .ok_or_else(|| PubSubError::Internal(format!("sequence overflow on {}", self.topic)))?;

        let envelope = Arc::new(envelope);
        if self.retention > 0 {
            self.retained.push_back(Arc::clone(&envelope));
            let overflow = self.retained.len().saturating_sub(self.retention);
            if overflow > 0 {
                self.retained.drain(..overflow);
            }
        }
        Ok(envelope)
    }

    /// Plans catch-up for a client whose last seen id is `last_seen`.
    #[must_use]
    pub fn replay_after(&self, last_seen: u64) -> ReplayPlan {
        let latest = self.latest();
        let oldest = self.oldest_retained();
        let gap = || {
            ReplayPlan::Gap(GapNotice {
                topic: self.topic.clone(),
                requested_after: last_seen,
                oldest_available: oldest,
                latest,
            })
        };

        if last_seen > latest {
            // Client is ahead of us, e.g. it saw ids from before a restart or an eviction.
            return gap();
        }
        if last_seen == latest {
            return ReplayPlan::Backlog(Vec::new());
        }
        match oldest {
            Some(first) if first <= last_seen.saturating_add(1) => ReplayPlan::Backlog(
                self.retained
                    .iter()
                    .filter(|e| e.sequence_id() > last_seen)
                    .cloned()
                    .collect(),
            ),
            _ => gap(),
        }
    }
}
