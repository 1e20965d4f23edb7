//! Publishes local library scan progress to SSE subscribers.

use crate::domain::{Broadcaster, LOCAL_SCAN_TOPIC, LocalScanEvent, PublishReceipt, ScannedGame};
use crate::error::PubSubError;

/// Producer for [`LocalScanEvent`]s on [`LOCAL_SCAN_TOPIC`].
///
/// Scans report through this type instead of touching the broadcaster
/// directly, so every progress event lands on one well-known topic.
#[derive(Debug, Clone)]
pub struct ScanNotifier {
    broadcaster: Broadcaster,
}

impl ScanNotifier {
    /// Creates a notifier publishing through `broadcaster`.
    #[must_use]
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }

    /// Publishes `event`.
    ///
    /// # Errors
    ///
    /// Returns whatever [`Broadcaster::publish_json`] returns; in practice
    /// [`PubSubError::ShuttingDown`], [`PubSubError::PayloadTooLarge`] or
    /// [`PubSubError::TopicLimitReached`].
    pub fn notify(&self, event: &LocalScanEvent) -> Result<PublishReceipt, PubSubError> {
        let receipt = self.broadcaster.publish_json(LOCAL_SCAN_TOPIC, event)?;
        tracing::debug!(
            platform = event.platform_name(),
            kind = event.kind(),
            sequence_id = receipt.sequence_id,
            delivered = receipt.delivered,
            "scan event published"
        );
        Ok(receipt)
    }

    /// A platform scan began.
    ///
    /// # Errors
    ///
    /// See [`ScanNotifier::notify`].
    pub fn started(
        &self,
        platform_name: &str,
        total_games: u64,
    ) -> Result<PublishReceipt, PubSubError> {
        self.notify(&LocalScanEvent::Started {
            platform_name: platform_name.to_string(),
            total_games,
        })
    }

    /// A batch of games was found.
    ///
    /// # Errors
    ///
    /// See [`ScanNotifier::notify`].
    pub fn batch(
        &self,
        platform_name: &str,
        games_found: u64,
        games: Vec<ScannedGame>,
    ) -> Result<PublishReceipt, PubSubError> {
        self.notify(&LocalScanEvent::Batch {
            platform_name: platform_name.to_string(),
            games_found,
            games,
        })
    }

    /// The scan finished. Success means no path failed.
    ///
    /// # Errors
    ///
    /// See [`ScanNotifier::notify`].
    pub fn completed(
        &self,
        platform_name: &str,
        final_count: u64,
        failed_paths: Vec<String>,
    ) -> Result<PublishReceipt, PubSubError> {
        self.notify(&LocalScanEvent::Completed {
            platform_name: platform_name.to_string(),
            final_count,
            success: failed_paths.is_empty(),
            failed_paths_count: failed_paths.len() as u64,
            failed_paths,
        })
    }

    /// The scan aborted.
    ///
    /// # Errors
    ///
    /// See [`ScanNotifier::notify`].
    pub fn failed(
        &self,
        platform_name: &str,
        message: &str,
    ) -> Result<PublishReceipt, PubSubError> {
        self.notify(&LocalScanEvent::Failed {
            platform_name: platform_name.to_string(),
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::PubSubConfig;
    use crate::domain::{AttachOutcome, ChannelId, Frame, SubscriberChannel, Topic, TopicRegistry};

    fn setup() -> (ScanNotifier, Arc<SubscriberChannel>) {
        let broadcaster =
            Broadcaster::new(Arc::new(TopicRegistry::new()), &PubSubConfig::default());
        let Ok(topic) = Topic::parse(LOCAL_SCAN_TOPIC) else {
            panic!("scan topic rejected");
        };
        let channel = SubscriberChannel::new(ChannelId::new(), 16);
        assert!(matches!(
            broadcaster.attach(&channel, &topic, None),
            Ok(AttachOutcome::Live)
        ));
        (ScanNotifier::new(broadcaster), channel)
    }

    fn event_types(channel: &SubscriberChannel) -> Vec<String> {
        channel
            .drain()
            .iter()
            .filter_map(Frame::envelope)
            .filter_map(|e| e.payload().get("event_type")?.as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn scan_lifecycle_is_published_in_order() {
        let (notifier, channel) = setup();
        assert!(notifier.started("steam", 2).is_ok());
        assert!(notifier.batch("steam", 0, Vec::new()).is_ok());
        assert!(notifier.completed("steam", 0, Vec::new()).is_ok());
        assert_eq!(event_types(&channel), vec!["started", "batch", "completed"]);
    }

    #[test]
    fn completed_with_failures_is_not_success() {
        let (notifier, channel) = setup();
        assert!(notifier
            .completed("gog", 4, vec!["/games/locked".to_string()])
            .is_ok());
        let frames = channel.drain();
        let Some(envelope) = frames.first().and_then(Frame::envelope) else {
            panic!("expected an event frame");
        };
        assert_eq!(envelope.payload().get("success").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(
            envelope.payload().get("failed_paths_count").and_then(|v| v.as_u64()),
            Some(1)
        );
    }

    #[test]
    fn failure_is_published() {
        let (notifier, channel) = setup();
        let Ok(receipt) = notifier.failed("epic", "library folder missing") else {
            panic!("publish failed");
        };
        assert_eq!(receipt.delivered, 1);
        assert_eq!(event_types(&channel), vec!["failed"]);
    }
}
