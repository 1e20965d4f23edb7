//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::domain::{Broadcaster, TopicRegistry};
use crate::service::{HeartbeatDriver, ScanNotifier};
use crate::sse::ConnectionManager;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Publish entry point.
    pub broadcaster: Broadcaster,
    /// Stream lifecycle and shutdown hook.
    pub connections: Arc<ConnectionManager>,
    /// Producer for library scan events.
    pub scan_notifier: ScanNotifier,
    /// Reconnect hint sent at the start of every stream.
    pub sse_retry: Duration,
}

impl AppState {
    /// Wires the registry, broadcaster, and connection manager together.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let registry = Arc::new(TopicRegistry::new());
        let broadcaster = Broadcaster::new(registry, &config.pubsub);
        let connections = Arc::new(ConnectionManager::new(
            broadcaster.clone(),
            config.pubsub.clone(),
        ));
        Self {
            scan_notifier: ScanNotifier::new(broadcaster.clone()),
            broadcaster,
            connections,
            sse_retry: config.sse_retry,
        }
    }

    /// Heartbeat driver over this state's registry.
    #[must_use]
    pub fn heartbeat(&self) -> HeartbeatDriver {
        HeartbeatDriver::new(
            Arc::clone(self.connections.registry()),
            self.connections.config(),
        )
    }
}
