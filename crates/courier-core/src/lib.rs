//! # courier-core
//!
//! Foundation types for the Courier in-app message pipeline:
//!
//! - [`message`]: wire-format messages, broadcast frequency rules, tracking state
//! - [`errors`]: the streaming error taxonomy with retryability classification
//! - [`retry`]: retry decisions and default backoff constants
//! - [`kv`]: the key/value persistence interface consumed by the pipeline
//! - [`events`]: the `EventRepresentable` trait and concrete domain events
//! - [`clock`]: injectable time source
//! - [`logging`]: tracing subscriber setup

#![deny(unsafe_code)]

pub mod clock;
pub mod errors;
pub mod events;
pub mod kv;
pub mod logging;
pub mod message;
pub mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::SseError;
pub use events::{
    EventRepresentable, MessageMetric, MetricKind, ProfileIdentified, StreamingDisabled,
};
pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use message::{BroadcastFrequency, Message, MessageTracking, MessagesTrackingData};
pub use retry::RetryDecision;
