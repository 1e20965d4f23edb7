//! Topic → subscriber routing table.
//!
//! [`TopicRegistry`] maps topic names to the channels currently subscribed
//! to them and indexes every open channel by id. All mutation goes through
//! one [`parking_lot::RwLock`]; readers copy the matching channels out, so
//! a fan-out in progress is never affected by later changes.
//!
//! # Invariant
//!
//! A channel appears under a topic if and only if it is `Open` and has that
//! topic in its own topic set. Both sides are only changed here, under the
//! write lock, and closing a channel happens in the same critical section
//! that removes it from every topic.
//!
//! # Lock order
//!
//! topic log → registry → channel. The registry lock is never held while
//! acquiring a topic log lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::{ChannelId, CloseReason, SubscriberChannel, Topic};

#[derive(Debug, Default)]
struct RegistryState {
    topics: HashMap<Topic, HashMap<ChannelId, Arc<SubscriberChannel>>>,
    channels: HashMap<ChannelId, Arc<SubscriberChannel>>,
}

/// Number of subscribers on one topic.
#[derive(Debug, Clone, Serialize)]
pub struct TopicOccupancy {
    /// Topic name.
    pub topic: Topic,
    /// Open channels subscribed to it.
    pub subscribers: usize,
}

/// Process-wide routing table for open channels.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    state: RwLock<RegistryState>,
}

impl TopicRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes an open channel that has no topics yet.
    ///
    /// Returns `false` if the channel is not open.
    pub fn insert_channel(&self, channel: &Arc<SubscriberChannel>) -> bool {
        let mut state = self.state.write();
        if !channel.is_open() {
            return false;
        }
        state
            .channels
            .entry(channel.id())
            .or_insert_with(|| Arc::clone(channel));
        true
    }

    /// Adds `channel` to `topic`. Idempotent.
    ///
    /// A topic with no prior subscribers is created on the fly. Returns
    /// `false` (and changes nothing) if the channel is no longer open.
    pub fn subscribe(&self, channel: &Arc<SubscriberChannel>, topic: &Topic) -> bool {
        let mut state = self.state.write();
        if !channel.is_open() {
            return false;
        }
        state
            .channels
            .entry(channel.id())
            .or_insert_with(|| Arc::clone(channel));
        state
            .topics
            .entry(topic.clone())
            .or_default()
            .entry(channel.id())
            .or_insert_with(|| Arc::clone(channel));
        channel.add_topic(topic.clone());
        true
    }

    /// Removes `channel` from `topic`. Idempotent.
    ///
    /// Empty topic entries are reclaimed immediately. Returns `true` if the
    /// channel was subscribed.
    pub fn unsubscribe(&self, channel: &SubscriberChannel, topic: &str) -> bool {
        let mut state = self.state.write();
        let mut removed = false;
        if let Some(subscribers) = state.topics.get_mut(topic) {
            removed = subscribers.remove(&channel.id()).is_some();
            if subscribers.is_empty() {
                state.topics.remove(topic);
            }
        }
        channel.remove_topic(topic);
        removed
    }

    /// Snapshot of the channels subscribed to `topic` right now.
    #[must_use]
    pub fn fanout_targets(&self, topic: &str) -> Vec<Arc<SubscriberChannel>> {
        let state = self.state.read();
        state
            .topics
            .get(topic)
            .map(|subscribers| subscribers.values().map(Arc::clone).collect())
            .unwrap_or_default()
    }

    /// Whether any open channel is subscribed to `topic`.
    #[must_use]
    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.state.read().topics.contains_key(topic)
    }

    /// The single teardown entry point for a channel.
    ///
    /// Removes the channel from every topic and from the channel index and
    /// moves it out of `Open`, all under the write lock. Returns `true` if
    /// this call performed the closure; later calls are no-ops returning
    /// `false`, so concurrent teardown triggers never race.
    pub fn remove_channel_everywhere(
        &self,
        channel: &SubscriberChannel,
        reason: CloseReason,
    ) -> bool {
        let mut state = self.state.write();
        state.channels.remove(&channel.id());
        for topic in channel.topics() {
            if let Some(subscribers) = state.topics.get_mut(topic.as_str()) {
                subscribers.remove(&channel.id());
                if subscribers.is_empty() {
                    state.topics.remove(topic.as_str());
                }
            }
        }
        channel.begin_close(reason)
    }

    /// Looks up an open channel by id.
    #[must_use]
    pub fn get(&self, id: ChannelId) -> Option<Arc<SubscriberChannel>> {
        self.state.read().channels.get(&id).map(Arc::clone)
    }

    /// Snapshot of every indexed channel.
    #[must_use]
    pub fn channels(&self) -> Vec<Arc<SubscriberChannel>> {
        self.state.read().channels.values().map(Arc::clone).collect()
    }

    /// Number of indexed channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.state.read().channels.len()
    }

    /// Number of topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.state.read().topics.len()
    }

    /// Subscriber counts per topic, sorted by topic name.
    #[must_use]
    pub fn occupancy(&self) -> Vec<TopicOccupancy> {
        let state = self.state.read();
        let mut occupancy: Vec<TopicOccupancy> = state
            .topics
            .iter()
            .map(|(topic, subscribers)| TopicOccupancy {
                topic: topic.clone(),
                subscribers: subscribers.len(),
            })
            .collect();
        occupancy.sort_by(|a, b| a.topic.cmp(&b.topic));
        occupancy
    }
}
