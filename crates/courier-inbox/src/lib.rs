//! # courier-inbox
//!
//! The local half of the message pipeline, fed by batches from the stream
//! (or the polling fallback):
//!
//! - [`queue`]: replace-on-fetch [`MessageQueue`] with inline and page-rule
//!   queries
//! - [`eligibility`]: the [`EligibilityEngine`] gating anonymous messages on
//!   TTL, dismissal, delay windows, and frequency caps
//! - [`read_state`]: opened/read maps for non-anonymous categories
//!
//! All persisted state flows through the host-provided
//! [`courier_core::KeyValueStore`].

#![deny(unsafe_code)]

pub mod eligibility;
pub mod queue;
pub mod read_state;

pub use eligibility::{DEFAULT_ANONYMOUS_TTL_MS, EligibilityEngine};
pub use queue::MessageQueue;
pub use read_state::{ReadCategory, ReadStateStore};
