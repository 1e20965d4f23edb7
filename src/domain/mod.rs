//! Domain layer: envelopes, channels, routing, and fan-out.
//!
//! Everything here is synchronous apart from waiting on a channel's
//! wakeup. Short critical sections use `parking_lot` locks, and no lock is
//! ever held across an `.await`.

pub mod broadcaster;
pub mod channel;
pub mod channel_id;
pub mod envelope;
pub mod frame;
pub mod registry;
pub mod replay;
pub mod scan_event;
pub mod topic;

pub use broadcaster::{AttachOutcome, BroadcastStats, Broadcaster, PublishReceipt, TopicSequence};
pub use channel::{
    BacklogOutcome, BackpressurePolicy, ChannelStatus, CloseReason, PushOutcome,
    SubscriberChannel, UnknownPolicy,
};
pub use channel_id::ChannelId;
pub use envelope::EventEnvelope;
pub use frame::{Frame, GapNotice};
pub use registry::{TopicOccupancy, TopicRegistry};
pub use replay::{ReplayPlan, TopicLog};
pub use scan_event::{LOCAL_SCAN_TOPIC, LocalScanEvent, ScannedGame};
pub use topic::Topic;
