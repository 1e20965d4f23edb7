//! Connection lifecycle: `Connecting → Streaming → Closing → Closed`.
//!
//! [`ConnectionManager::open`] binds a stream request to a fresh
//! [`SubscriberChannel`] and spawns one delivery task per connection. The
//! task moves frames from the channel buffer to the HTTP response stream,
//! waiting only for new frames, client disconnect, or stream expiry. Every
//! teardown goes through [`TopicRegistry::remove_channel_everywhere`], so
//! concurrent triggers (disconnect racing shutdown, say) resolve to one
//! closure and no errors.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use super::subscription::SubscriptionRequest;
use crate::config::PubSubConfig;
use crate::domain::{
    AttachOutcome, Broadcaster, ChannelId, ChannelStatus, CloseReason, Frame, SubscriberChannel,
    Topic, TopicRegistry,
};
use crate::error::PubSubError;

/// Frames handed to the response stream but not yet written by the server.
const OUTBOUND_QUEUE: usize = 8;

/// Per-connection state, used for logging transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Channel created, topics being attached.
    Connecting,
    /// Delivery loop running.
    Streaming,
    /// Teardown triggered; remaining frames flushed or discarded.
    Closing,
    /// Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

/// A freshly opened stream.
#[derive(Debug)]
pub struct OpenStream {
    /// Id of the backing channel.
    pub channel_id: ChannelId,
    /// How each requested topic was attached.
    pub attached: Vec<(Topic, AttachOutcome)>,
    /// Frames in delivery order. Ends when the channel closes.
    pub frames: mpsc::Receiver<Frame>,
}

/// Result of [`ConnectionManager::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Channels closed by the shutdown itself.
    pub closed: usize,
    /// Delivery tasks still running when the wait ended.
    pub remaining: usize,
    /// `true` if the grace period ran out first.
    pub timed_out: bool,
}

/// Decrements the live-connection count when a delivery task ends.
#[derive(Debug)]
struct LiveGuard(Arc<watch::Sender<usize>>);

impl LiveGuard {
    fn new(live: &Arc<watch::Sender<usize>>) -> Self {
        live.send_modify(|n| *n = n.saturating_add(1));
        Self(Arc::clone(live))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Opens, tracks, and tears down streaming connections.
#[derive(Debug)]
pub struct ConnectionManager {
    broadcaster: Broadcaster,
    config: PubSubConfig,
    live: Arc<watch::Sender<usize>>,
    accepting: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl ConnectionManager {
    /// Creates a manager delivering events from `broadcaster`.
    #[must_use]
    pub fn new(broadcaster: Broadcaster, config: PubSubConfig) -> Self {
        let (live, _) = watch::channel(0);
        let (shutdown, _) = watch::channel(false);
        Self {
            broadcaster,
            config,
            live: Arc::new(live),
            accepting: AtomicBool::new(true),
            shutdown,
        }
    }

    /// The broadcaster streams are attached to.
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Shared routing table.
    #[must_use]
    pub fn registry(&self) -> &Arc<TopicRegistry> {
        self.broadcaster.registry()
    }

    /// Core configuration in effect.
    #[must_use]
    pub fn config(&self) -> &PubSubConfig {
        &self.config
    }

    /// Number of delivery tasks still running.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        *self.live.borrow()
    }

    /// Resolves to `true` once shutdown begins.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Opens a stream for `request`.
    ///
    /// Replayed envelopes (or gap notices) are queued ahead of live traffic
    /// for each topic before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::ShuttingDown`] once shutdown has begun, and
    /// [`PubSubError::TopicLimitReached`] if a requested topic cannot get a
    /// log. Nothing stays registered on error.
    pub fn open(&self, request: &SubscriptionRequest) -> Result<OpenStream, PubSubError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(PubSubError::ShuttingDown);
        }
        let channel = SubscriberChannel::new(ChannelId::new(), self.config.channel_capacity);
        let registry = Arc::clone(self.registry());
        log_state(channel.id(), ConnectionState::Connecting);

        // Counted before the channel becomes visible to shutdown.
        let live = LiveGuard::new(&self.live);
        if !registry.insert_channel(&channel) {
            return Err(PubSubError::Internal(format!(
                "channel {} closed before registration",
                channel.id()
            )));
        }
        // Shutdown may have snapshotted the registry just before the insert.
        if !self.accepting.load(Ordering::SeqCst) {
            registry.remove_channel_everywhere(&channel, CloseReason::ServerShutdown);
            channel.finish();
            return Err(PubSubError::ShuttingDown);
        }

        let attached = request
            .topics()
            .iter()
            .map(|topic| {
                self.broadcaster
                    .attach(&channel, topic, request.last_seen(topic.as_str()))
                    .map(|outcome| (topic.clone(), outcome))
            })
            .collect::<Result<Vec<_>, _>>();
        let attached = match attached {
            Ok(attached) => attached,
            Err(e) => {
                registry.remove_channel_everywhere(&channel, CloseReason::ClientGone);
                tracing::warn!(channel_id = %channel.id(), error = %e, "stream refused");
                return Err(e);
            }
        };

        let (tx, frames) = mpsc::channel(OUTBOUND_QUEUE);
        let delivery = Delivery {
            channel: Arc::clone(&channel),
            registry,
            tx,
            write_timeout: self.config.write_timeout,
            stream_timeout: self.config.stream_timeout,
            _live: live,
        };
        tokio::spawn(delivery.run());

        tracing::info!(channel_id = %channel.id(), topics = request.topics().len(), "stream opened");
        Ok(OpenStream {
            channel_id: channel.id(),
            attached,
            frames,
        })
    }

    /// Open channel by id.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::ChannelNotFound`] if no open channel has `id`.
    pub fn channel(&self, id: ChannelId) -> Result<Arc<SubscriberChannel>, PubSubError> {
        self.registry()
            .get(id)
            .ok_or_else(|| PubSubError::ChannelNotFound(id.into()))
    }

    /// Attaches an open channel to one more topic, live traffic only.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::ChannelNotFound`], [`PubSubError::InvalidTopic`],
    /// [`PubSubError::InvalidRequest`] if the per-stream topic limit would be
    /// exceeded, or [`PubSubError::TopicLimitReached`] if no topic log is
    /// free.
    pub fn subscribe_topic(&self, id: ChannelId, topic: &str) -> Result<AttachOutcome, PubSubError> {
        let topic = Topic::parse(topic)?;
        let channel = self.channel(id)?;
        if !channel.has_topic(topic.as_str())
            && channel.topics().len() >= self.config.max_topics_per_stream
        {
            return Err(PubSubError::InvalidRequest(format!(
                "channel already has {} topics",
                self.config.max_topics_per_stream
            )));
        }
        let outcome = self.broadcaster.attach(&channel, &topic, None)?;
        if outcome == AttachOutcome::Closed {
            return Err(PubSubError::ChannelNotFound(id.into()));
        }
        tracing::debug!(channel_id = %id, %topic, "topic attached");
        Ok(outcome)
    }

    /// Detaches an open channel from a topic. Returns `false` if it was
    /// not subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::ChannelNotFound`] if no open channel has `id`.
    pub fn unsubscribe_topic(&self, id: ChannelId, topic: &str) -> Result<bool, PubSubError> {
        let channel = self.channel(id)?;
        let removed = self.broadcaster.detach(&channel, topic);
        tracing::debug!(channel_id = %id, topic, removed, "topic detached");
        Ok(removed)
    }

    /// Closes a channel on request, flushing what it already buffered.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::ChannelNotFound`] if no open channel has `id`.
    pub fn close(&self, id: ChannelId) -> Result<(), PubSubError> {
        let channel = self.channel(id)?;
        if self
            .registry()
            .remove_channel_everywhere(&channel, CloseReason::Unsubscribed)
        {
            log_state(id, ConnectionState::Closing);
        }
        Ok(())
    }

    /// Stops accepting streams and publishes, closes every channel, and
    /// waits up to `grace` for delivery tasks to flush and exit.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.accepting.store(false, Ordering::SeqCst);
        self.broadcaster.stop_accepting();
        self.shutdown.send_replace(true);

        let registry = self.registry();
        let closed = registry
            .channels()
            .iter()
            .filter(|channel| registry.remove_channel_everywhere(channel, CloseReason::ServerShutdown))
            .count();

        let mut live = self.live.subscribe();
        let timed_out = !matches!(timeout(grace, live.wait_for(|n| *n == 0)).await, Ok(Ok(_)));
        let report = ShutdownReport {
            closed,
            remaining: self.live_connections(),
            timed_out,
        };
        if report.timed_out {
            tracing::warn!(remaining = report.remaining, "shutdown grace period elapsed");
        } else {
            tracing::info!(closed = report.closed, "all streams closed");
        }
        report
    }
}

fn log_state(channel_id: ChannelId, state: ConnectionState) {
    tracing::debug!(%channel_id, %state, "connection state");
}

/// The delivery task of one connection.
#[derive(Debug)]
struct Delivery {
    channel: Arc<SubscriberChannel>,
    registry: Arc<TopicRegistry>,
    tx: mpsc::Sender<Frame>,
    write_timeout: Duration,
    stream_timeout: Option<Duration>,
    _live: LiveGuard,
}

impl Delivery {
    async fn run(self) {
        let id = self.channel.id();
        log_state(id, ConnectionState::Streaming);

        let limit = self.stream_timeout;
        let expiry = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);
        let mut expired = false;

        loop {
            if let Err(reason) = self.flush().await {
                self.close(reason);
                break;
            }
            match self.channel.status() {
                ChannelStatus::Open => {}
                ChannelStatus::Draining => {
                    // Pushes accepted between the flush and the close.
                    if let Err(reason) = self.flush().await {
                        tracing::debug!(channel_id = %id, %reason, "final flush cut short");
                    }
                    break;
                }
                ChannelStatus::Closed => break,
            }

            tokio::select! {
                () = self.channel.notified() => {}
                () = self.tx.closed() => {
                    self.close(CloseReason::ClientGone);
                    break;
                }
                () = &mut expiry, if !expired => {
                    expired = true;
                    self.close(CloseReason::Expired);
                }
            }
        }

        self.channel.finish();
        let reason = self
            .channel
            .close_reason()
            .map_or("unknown", |reason| reason.as_str());
        log_state(id, ConnectionState::Closed);
        tracing::info!(channel_id = %id, reason, dropped = self.channel.dropped(), "stream closed");
    }

    /// Writes every buffered frame, each bounded by the write timeout.
    async fn flush(&self) -> Result<(), CloseReason> {
        for frame in self.channel.drain() {
            if self.channel.status() == ChannelStatus::Closed {
                // Closed with discard while a write was pending.
                return Ok(());
            }
            match timeout(self.write_timeout, self.tx.send(frame)).await {
                Ok(Ok(())) => self.channel.touch(),
                Ok(Err(_)) => return Err(CloseReason::ClientGone),
                Err(_) => return Err(CloseReason::WriteTimeout),
            }
        }
        Ok(())
    }

    fn close(&self, reason: CloseReason) {
        if self.registry.remove_channel_everywhere(&self.channel, reason) {
            log_state(self.channel.id(), ConnectionState::Closing);
            if matches!(reason, CloseReason::WriteTimeout) {
                tracing::warn!(channel_id = %self.channel.id(), %reason, "closing stalled stream");
            }
        }
    }
}
