//! Service layer: background drivers and domain-event producers.
//!
//! [`HeartbeatDriver`] keeps open streams alive and reaps dead ones;
//! [`ScanNotifier`] turns library scan progress into published events.

pub mod heartbeat;
pub mod scan_notifier;

pub use heartbeat::{HeartbeatDriver, SweepReport};
pub use scan_notifier::ScanNotifier;
