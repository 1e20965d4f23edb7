//! Per-client delivery buffer.
//!
//! A [`SubscriberChannel`] sits between the publish side and one
//! long-lived outbound stream. Publishers push into it without blocking;
//! the owning connection's delivery loop is the only reader. Both sides
//! serialize on the channel's own mutex, so independent channels never
//! contend with each other.
//!
//! Status only moves forward: `Open → Draining → Closed` or
//! `Open → Closed`. Leaving `Open` is reserved to
//! [`super::TopicRegistry::remove_channel_everywhere`], which removes the
//! channel from every routing entry under the same critical section.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{ChannelId, EventEnvelope, Frame, GapNotice, Topic};

/// Rule applied when a channel buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Evict the oldest buffered event and keep the new one.
    #[default]
    DropOldest,
    /// Refuse the event and close the slow channel.
    CloseSlow,
}

impl BackpressurePolicy {
    /// Configuration spelling of the policy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DropOldest => "drop_oldest",
            Self::CloseSlow => "close_slow",
        }
    }
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown policy name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backpressure policy {0:?} (expected drop_oldest or close_slow)")]
pub struct UnknownPolicy(pub String);

impl FromStr for BackpressurePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "drop_oldest" => Ok(Self::DropOldest),
            "close_slow" => Ok(Self::CloseSlow),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// Lifecycle status of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Routable; accepts pushes.
    Open,
    /// Unroutable; no new pushes, remaining frames may still be flushed.
    Draining,
    /// Terminal; buffer released.
    Closed,
}

/// Why a channel left the `Open` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The client went away.
    ClientGone,
    /// No successful write within the dead-connection timeout.
    DeadConnection,
    /// Handing a frame to the outbound stream took too long.
    WriteTimeout,
    /// Buffer overflowed under the close-slow policy.
    SlowConsumer,
    /// Explicit unsubscribe of the whole stream.
    Unsubscribed,
    /// The server is shutting down.
    ServerShutdown,
    /// The stream reached its maximum lifetime.
    Expired,
}

impl CloseReason {
    /// Whether buffered frames are still delivered before closing.
    ///
    /// Reasons that imply nobody is reading discard the buffer at once.
    #[must_use]
    pub const fn flushes(&self) -> bool {
        matches!(
            self,
            Self::Unsubscribed | Self::ServerShutdown | Self::Expired
        )
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClientGone => "client_gone",
            Self::DeadConnection => "dead_connection",
            Self::WriteTimeout => "write_timeout",
            Self::SlowConsumer => "slow_consumer",
            Self::Unsubscribed => "unsubscribed",
            Self::ServerShutdown => "server_shutdown",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of pushing one event into a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended.
    Queued,
    /// Appended after evicting the oldest buffered event.
    DroppedOldest,
    /// Buffer full under the close-slow policy; nothing appended.
    Overflow,
    /// Channel no longer open; nothing appended.
    Rejected,
}

/// Result of enqueuing a replay backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklogOutcome {
    /// All envelopes appended.
    Queued(usize),
    /// Not enough free capacity; nothing appended.
    NoRoom,
    /// Channel no longer open; nothing appended.
    Rejected,
}

#[derive(Debug)]
struct ChannelState {
    status: ChannelStatus,
    topics: HashSet<Topic>,
    buffer: VecDeque<Frame>,
    // Event frames currently buffered.
    queued_events: usize,
    dropped: u64,
    close_reason: Option<CloseReason>,
}

/// One live client's subscription state plus bounded delivery buffer.
#[derive(Debug)]
pub struct SubscriberChannel {
    id: ChannelId,
    capacity: usize,
    state: Mutex<ChannelState>,
    wakeup: Notify,
    created_at: Instant,
    last_activity: Mutex<Instant>,
}

impl SubscriberChannel {
    /// Creates an open channel with no topics.
    ///
    /// A zero `capacity` is raised to 1.
    #[must_use]
    pub fn new(id: ChannelId, capacity: usize) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            id,
            capacity: capacity.max(1),
            state: Mutex::new(ChannelState {
                status: ChannelStatus::Open,
                topics: HashSet::new(),
                buffer: VecDeque::new(),
                queued_events: 0,
                dropped: 0,
                close_reason: None,
            }),
            wakeup: Notify::new(),
            created_at: now,
            last_activity: Mutex::new(now),
        })
    }

    /// Channel identifier.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Maximum number of buffered events.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        self.state.lock().status
    }

    /// Returns `true` while the channel is routable.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status() == ChannelStatus::Open
    }

    /// Reason recorded when the channel left `Open`.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.state.lock().close_reason
    }

    /// Subscribed topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.state.lock().topics.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Returns `true` if the channel is subscribed to `topic`.
    #[must_use]
    pub fn has_topic(&self, topic: &str) -> bool {
        self.state.lock().topics.contains(topic)
    }

    /// Number of frames waiting to be drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Events evicted by the drop-oldest policy so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Pushes one event, applying `policy` if the buffer is full.
    ///
    /// Never blocks beyond the channel's own short critical section.
    pub fn push_event(
        &self,
        envelope: Arc<EventEnvelope>,
        policy: BackpressurePolicy,
    ) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.status != ChannelStatus::Open {
                return PushOutcome::Rejected;
            }
            let mut outcome = PushOutcome::Queued;
            if state.queued_events >= self.capacity {
                match policy {
                    BackpressurePolicy::CloseSlow => return PushOutcome::Overflow,
                    BackpressurePolicy::DropOldest => {
                        if let Some(pos) = state.buffer.iter().position(Frame::counts_toward_capacity)
                        {
                            let _evicted = state.buffer.remove(pos);
                            state.queued_events = state.queued_events.saturating_sub(1);
                            state.dropped = state.dropped.saturating_add(1);
                        }
                        outcome = PushOutcome::DroppedOldest;
                    }
                }
            }
            state.buffer.push_back(Frame::Event(envelope));
            state.queued_events = state.queued_events.saturating_add(1);
            outcome
        };
        self.wakeup.notify_one();
        outcome
    }

    /// Appends a whole replay backlog atomically, or nothing.
    pub fn push_backlog(&self, envelopes: &[Arc<EventEnvelope>]) -> BacklogOutcome {
        {
            let mut state = self.state.lock();
            if state.status != ChannelStatus::Open {
                return BacklogOutcome::Rejected;
            }
            let free = self.capacity.saturating_sub(state.queued_events);
            if envelopes.len() > free {
                return BacklogOutcome::NoRoom;
            }
            for envelope in envelopes {
                state.buffer.push_back(Frame::Event(Arc::clone(envelope)));
            }
            state.queued_events = state.queued_events.saturating_add(envelopes.len());
        }
        self.wakeup.notify_one();
        BacklogOutcome::Queued(envelopes.len())
    }

    /// Appends a gap notice. Returns `false` if the channel is not open.
    pub fn push_gap(&self, notice: GapNotice) -> bool {
        {
            let mut state = self.state.lock();
            if state.status != ChannelStatus::Open {
                return false;
            }
            state.buffer.push_back(Frame::Gap(notice));
        }
        self.wakeup.notify_one();
        true
    }

    /// Queues a heartbeat if the channel is open and idle.
    ///
    /// Returns `false` when the channel is not open or already has frames
    /// waiting, since pending traffic keeps the connection warm on its own.
    pub fn push_heartbeat(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.status != ChannelStatus::Open || !state.buffer.is_empty() {
                return false;
            }
            state.buffer.push_back(Frame::Heartbeat);
        }
        self.wakeup.notify_one();
        true
    }

    /// Removes every buffered frame in arrival order.
    ///
    /// Only the owning delivery loop may call this.
    pub fn drain(&self) -> Vec<Frame> {
        let mut state = self.state.lock();
        state.queued_events = 0;
        state.buffer.drain(..).collect()
    }

    /// Waits until something was pushed or the status changed.
    pub async fn notified(&self) {
        self.wakeup.notified().await;
    }

    /// Records a successful write to the client.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time of the last successful write (or creation).
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Time since the last successful write, measured at `now`.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    /// When the channel was created.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Completes a drain: `Draining → Closed`.
    ///
    /// No-op in any other status, so an open channel can only be closed
    /// through the registry.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        if state.status == ChannelStatus::Draining {
            state.status = ChannelStatus::Closed;
            state.buffer.clear();
            state.queued_events = 0;
        }
    }

    pub(crate) fn add_topic(&self, topic: Topic) {
        self.state.lock().topics.insert(topic);
    }

    pub(crate) fn remove_topic(&self, topic: &str) -> bool {
        self.state.lock().topics.remove(topic)
    }

    /// Leaves `Open`. Returns `false` if the channel had already left it.
    pub(crate) fn begin_close(&self, reason: CloseReason) -> bool {
        {
            let mut state = self.state.lock();
            if state.status != ChannelStatus::Open {
                return false;
            }
            state.close_reason = Some(reason);
            if reason.flushes() {
                state.status = ChannelStatus::Draining;
            } else {
                state.status = ChannelStatus::Closed;
                state.buffer.clear();
                state.queued_events = 0;
            }
        }
        self.wakeup.notify_one();
        true
    }
}
