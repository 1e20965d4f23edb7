//! # pantheon-sse
//!
//! In-process topic pub/sub delivered to browsers over Server-Sent Events.
//!
//! Producers publish JSON payloads on named topics; every stream subscribed
//! to a topic receives the event through its own bounded buffer. Events
//! carry topic-scoped sequence ids, so a reconnecting client can ask for
//! everything after the last id it saw and either gets the retained
//! backlog or an explicit gap notice.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, SSE)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── SSE Handler + ConnectionManager (sse/)
//!     │
//!     ├── HeartbeatDriver, ScanNotifier (service/)
//!     │
//!     ├── Broadcaster (domain/)
//!     ├── TopicLog per topic (domain/)
//!     └── TopicRegistry → SubscriberChannel (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod sse;
