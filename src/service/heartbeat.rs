//! Heartbeat/keepalive driver.
//!
//! Runs on a fixed interval, independent of publish traffic. Channels with
//! no successful write for longer than the dead-connection timeout are
//! closed; every other open channel gets a heartbeat frame so proxies keep
//! the connection alive. Heartbeats carry no sequence id.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::PubSubConfig;
use crate::domain::{CloseReason, TopicRegistry};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Channels that were sent a heartbeat.
    pub pinged: usize,
    /// Idle channels that already had frames pending.
    pub busy: usize,
    /// Channels closed as dead.
    pub reaped: usize,
}

/// Periodically pings open channels and reaps dead ones.
#[derive(Debug, Clone)]
pub struct HeartbeatDriver {
    registry: Arc<TopicRegistry>,
    interval: Duration,
    dead_after: Duration,
}

impl HeartbeatDriver {
    /// Creates a driver over `registry` using the configured interval and
    /// dead-connection timeout.
    #[must_use]
    pub fn new(registry: Arc<TopicRegistry>, config: &PubSubConfig) -> Self {
        Self {
            registry,
            interval: config.heartbeat_interval,
            dead_after: config.dead_connection_timeout,
        }
    }

    /// Visits every open channel once, as of `now`.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        for channel in self.registry.channels() {
            let idle = channel.idle_for(now);
            if idle > self.dead_after {
                if self
                    .registry
                    .remove_channel_everywhere(&channel, CloseReason::DeadConnection)
                {
                    report.reaped += 1;
                    tracing::info!(channel_id = %channel.id(), idle_ms = idle.as_millis() as u64, "reaped dead connection");
                }
            } else if channel.push_heartbeat() {
                report.pinged += 1;
            } else {
                report.busy += 1;
            }
        }
        report
    }

    /// Sweeps every interval until `shutdown` turns `true` or its sender
    /// is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        tracing::debug!(interval_ms = self.interval.as_millis() as u64, "heartbeat driver started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep(Instant::now());
                    tracing::trace!(pinged = report.pinged, busy = report.busy, reaped = report.reaped, "heartbeat sweep");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("heartbeat driver stopped");
    }

    /// Spawns [`HeartbeatDriver::run`] on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
