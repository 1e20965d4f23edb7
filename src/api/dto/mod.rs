//! Data Transfer Objects for REST request/response serialization.
//!
//! Topics travel as plain strings and channel ids as UUIDs; the domain
//! newtypes stay behind the handlers.

pub mod channel_dto;
pub mod publish_dto;
pub mod stats_dto;

pub use channel_dto::*;
pub use publish_dto::*;
pub use stats_dto::*;
