//! Publish entry point and fan-out.
//!
//! [`Broadcaster`] assigns topic-scoped sequence ids, retains envelopes for
//! replay, and pushes each envelope into every channel subscribed to its
//! topic. Delivery is a bounded in-memory push per channel: a slow
//! subscriber is handled by the configured [`BackpressurePolicy`] and never
//! stalls the publisher or other subscribers.
//!
//! At most `max_topics` topic logs are kept. Creating one more evicts the
//! least recently used log that has no subscribers; its sequence restarts
//! at 1 if the topic is used again, and a client resuming it with an older
//! cursor is ahead of the server and gets a gap notice.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::replay::{ReplayPlan, TopicLog};
use super::{
    BackpressurePolicy, BacklogOutcome, CloseReason, GapNotice, PushOutcome, SubscriberChannel,
    Topic, TopicRegistry,
};
use crate::config::PubSubConfig;
use crate::error::PubSubError;

/// Outcome of one successful publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    /// Topic published to.
    pub topic: Topic,
    /// Sequence id assigned to the event.
    pub sequence_id: u64,
    /// Channels the event was queued on.
    pub delivered: usize,
    /// Channels that evicted an older event to make room.
    pub dropped: usize,
    /// Channels closed as slow consumers instead.
    pub closed: usize,
}

/// How a channel was attached to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Subscribed for live traffic only.
    Live,
    /// Subscribed after queueing this many retained envelopes.
    Replayed(usize),
    /// Subscribed after queueing a gap notice instead of a replay.
    Gap(GapNotice),
    /// The channel was no longer open; nothing changed.
    Closed,
}

/// Process-wide publish counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BroadcastStats {
    /// Events accepted by `publish`.
    pub published: u64,
    /// Events evicted from full channel buffers.
    pub dropped: u64,
    /// Channels closed by the close-slow policy.
    pub slow_consumers_closed: u64,
    /// Idle topic logs evicted to stay within `max_topics`.
    pub topics_evicted: u64,
}

/// Latest sequence id of a topic.
#[derive(Debug, Clone, Serialize)]
pub struct TopicSequence {
    /// Topic name.
    pub topic: Topic,
    /// Latest assigned id (0 if none).
    pub latest: u64,
}

#[derive(Debug)]
struct TopicSlot {
    log: Arc<Mutex<TopicLog>>,
    last_used: AtomicU64,
}

#[derive(Debug)]
struct BroadcasterInner {
    registry: Arc<TopicRegistry>,
    logs: RwLock<HashMap<Topic, TopicSlot>>,
    policy: BackpressurePolicy,
    retention: usize,
    max_payload_bytes: usize,
    max_topics: usize,
    clock: AtomicU64,
    accepting: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
    slow_consumers_closed: AtomicU64,
    topics_evicted: AtomicU64,
}

/// Fans published events out to subscriber channels.
///
/// Cheap to clone; every clone shares the same registry and topic logs.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Broadcaster {
    /// Creates a broadcaster routing through `registry`.
    #[must_use]
    pub fn new(registry: Arc<TopicRegistry>, config: &PubSubConfig) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                registry,
                logs: RwLock::new(HashMap::new()),
                policy: config.backpressure,
                retention: config.replay_retention,
                max_payload_bytes: config.max_payload_bytes,
                max_topics: config.max_topics,
                clock: AtomicU64::new(0),
                accepting: AtomicBool::new(true),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                slow_consumers_closed: AtomicU64::new(0),
                topics_evicted: AtomicU64::new(0),
            }),
        }
    }

    /// The registry used for routing.
    #[must_use]
    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.inner.registry
    }

    /// The configured backpressure policy.
    #[must_use]
    pub fn policy(&self) -> BackpressurePolicy {
        self.inner.policy
    }

    /// Publishes `payload` on `topic`.
    ///
    /// Assigns the next sequence id even when nobody is subscribed, so late
    /// joiners can reason about gaps. Returns once the event sits in every
    /// target buffer; subscriber-side failures are never reported here.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::InvalidTopic`], [`PubSubError::InvalidPayload`]
    /// or [`PubSubError::PayloadTooLarge`] for a rejected event,
    /// [`PubSubError::TopicLimitReached`] for a new topic when every retained
    /// topic is in use, and [`PubSubError::ShuttingDown`] once shutdown has
    /// begun. A rejected event consumes no sequence id and reaches no
    /// channel.
    pub fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<PublishReceipt, PubSubError> {
        if !self.is_accepting() {
            return Err(PubSubError::ShuttingDown);
        }
        let topic = Topic::parse(topic)?;
        let log = self.topic_log(&topic)?;
        let mut log = log.lock();
        let envelope = log.append(payload, Utc::now(), self.inner.max_payload_bytes)?;

        let mut receipt = PublishReceipt {
            topic,
            sequence_id: envelope.sequence_id(),
            delivered: 0,
            dropped: 0,
            closed: 0,
        };
        for channel in self.inner.registry.fanout_targets(receipt.topic.as_str()) {
            match channel.push_event(Arc::clone(&envelope), self.inner.policy) {
                PushOutcome::Queued => receipt.delivered += 1,
                PushOutcome::DroppedOldest => {
                    receipt.delivered += 1;
                    receipt.dropped += 1;
                    tracing::debug!(channel_id = %channel.id(), topic = %receipt.topic, "dropped oldest buffered event");
                }
                PushOutcome::Overflow => {
                    if self
                        .inner
                        .registry
                        .remove_channel_everywhere(&channel, CloseReason::SlowConsumer)
                    {
                        receipt.closed += 1;
                        tracing::warn!(channel_id = %channel.id(), topic = %receipt.topic, "closed slow consumer");
                    }
                }
                PushOutcome::Rejected => {}
            }
        }
        drop(log);

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        self.inner
            .dropped
            .fetch_add(receipt.dropped as u64, Ordering::Relaxed);
        self.inner
            .slow_consumers_closed
            .fetch_add(receipt.closed as u64, Ordering::Relaxed);
        tracing::trace!(topic = %receipt.topic, sequence_id = receipt.sequence_id, delivered = receipt.delivered, "published");
        Ok(receipt)
    }

    /// Serializes `value` and publishes it on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::InvalidPayload`] if `value` cannot be turned
    /// into JSON, plus everything [`Broadcaster::publish`] returns.
    pub fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        value: &T,
    ) -> Result<PublishReceipt, PubSubError> {
        let payload =
            serde_json::to_value(value).map_err(|e| PubSubError::InvalidPayload(e.to_string()))?;
        self.publish(topic, payload)
    }

    /// Subscribes `channel` to `topic`, replaying retained history first.
    ///
    /// Holds the topic's log lock throughout, so no live event can slip in
    /// between the replayed backlog and the subscription. With
    /// `last_seen = None` the channel receives live traffic only.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::TopicLimitReached`] if `topic` has no log yet
    /// and none can be evicted to make room. The channel is left unchanged.
    pub fn attach(
        &self,
        channel: &Arc<SubscriberChannel>,
        topic: &Topic,
        last_seen: Option<u64>,
    ) -> Result<AttachOutcome, PubSubError> {
        let log = self.topic_log(topic)?;
        let log = log.lock();
        if !self.inner.registry.subscribe(channel, topic) {
            return Ok(AttachOutcome::Closed);
        }
        let Some(last_seen) = last_seen else {
            return Ok(AttachOutcome::Live);
        };

        let notice = match log.replay_after(last_seen) {
            ReplayPlan::Backlog(backlog) if backlog.is_empty() => {
                return Ok(AttachOutcome::Replayed(0));
            }
            ReplayPlan::Backlog(backlog) => match channel.push_backlog(&backlog) {
                BacklogOutcome::Queued(n) => return Ok(AttachOutcome::Replayed(n)),
                BacklogOutcome::Rejected => return Ok(AttachOutcome::Closed),
                BacklogOutcome::NoRoom => GapNotice {
                    topic: topic.clone(),
                    requested_after: last_seen,
                    oldest_available: log.oldest_retained(),
                    latest: log.latest(),
                },
            },
            ReplayPlan::Gap(notice) => notice,
        };
        if !channel.push_gap(notice.clone()) {
            return Ok(AttachOutcome::Closed);
        }
        tracing::debug!(channel_id = %channel.id(), %topic, last_seen, "replay point not retained");
        Ok(AttachOutcome::Gap(notice))
    }

    /// Unsubscribes `channel` from `topic`. Idempotent.
    pub fn detach(&self, channel: &SubscriberChannel, topic: &str) -> bool {
        self.inner.registry.unsubscribe(channel, topic)
    }

    /// Latest sequence id assigned on `topic` (0 if none).
    #[must_use]
    pub fn latest_sequence(&self, topic: &str) -> u64 {
        self.inner
            .logs
            .read()
            .get(topic)
            .map_or(0, |slot| slot.log.lock().latest())
    }

    /// Latest sequence id of every topic with a retained log.
    #[must_use]
    pub fn topic_sequences(&self) -> Vec<TopicSequence> {
        let logs: Vec<(Topic, Arc<Mutex<TopicLog>>)> = self
            .inner
            .logs
            .read()
            .iter()
            .map(|(topic, slot)| (topic.clone(), Arc::clone(&slot.log)))
            .collect();
        let mut sequences: Vec<TopicSequence> = logs
            .into_iter()
            .map(|(topic, log)| TopicSequence {
                topic,
                latest: log.lock().latest(),
            })
            .collect();
        sequences.sort_by(|a, b| a.topic.cmp(&b.topic));
        sequences
    }

    /// Publish counters.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            slow_consumers_closed: self.inner.slow_consumers_closed.load(Ordering::Relaxed),
            topics_evicted: self.inner.topics_evicted.load(Ordering::Relaxed),
        }
    }

    /// Refuses every later publish with [`PubSubError::ShuttingDown`].
    pub fn stop_accepting(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
    }

    /// Returns `false` once shutdown has begun.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    fn topic_log(&self, topic: &Topic) -> Result<Arc<Mutex<TopicLog>>, PubSubError> {
        let tick = self.inner.clock.fetch_add(1, Ordering::Relaxed);
        if let Some(slot) = self.inner.logs.read().get(topic) {
            slot.last_used.store(tick, Ordering::Relaxed);
            return Ok(Arc::clone(&slot.log));
        }

        let mut logs = self.inner.logs.write();
        if let Some(slot) = logs.get(topic) {
            slot.last_used.store(tick, Ordering::Relaxed);
            return Ok(Arc::clone(&slot.log));
        }
        if logs.len() >= self.inner.max_topics {
            let Some(idle) = self.least_recently_used_idle(&logs) else {
                tracing::warn!(%topic, limit = self.inner.max_topics, "topic limit reached");
                return Err(PubSubError::TopicLimitReached {
                    limit: self.inner.max_topics,
                });
            };
            logs.remove(&idle);
            self.inner.topics_evicted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(evicted = %idle, %topic, "evicted idle topic log");
        }

        let log = Arc::new(Mutex::new(TopicLog::new(topic.clone(), self.inner.retention)));
        logs.insert(
            topic.clone(),
            TopicSlot {
                log: Arc::clone(&log),
                last_used: AtomicU64::new(tick),
            },
        );
        Ok(log)
    }

    /// Idle means no subscriber and no caller holding the log. The map's
    /// write lock is held, so nobody can pick up a new handle meanwhile.
    fn least_recently_used_idle(&self, logs: &HashMap<Topic, TopicSlot>) -> Option<Topic> {
        logs.iter()
            .filter(|(topic, slot)| {
                Arc::strong_count(&slot.log) == 1
                    && !self.inner.registry.has_subscribers(topic.as_str())
            })
            .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
            .map(|(topic, _)| topic.clone())
    }
}
