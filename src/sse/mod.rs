//! Server-Sent Events layer: stream requests, connection lifecycle, and
//! wire encoding.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;

pub use connection::{ConnectionManager, ConnectionState, OpenStream, ShutdownReport};
pub use subscription::{StreamQuery, SubscriptionRequest};
