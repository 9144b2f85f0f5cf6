//! # courier-bus
//!
//! Typed pub/sub for cross-module domain events, with at-least-once delivery
//! for events posted before any consumer exists:
//!
//! - [`bus`]: the [`EventBus`] — typed registry, bounded replay ring,
//!   durable overflow
//! - [`storage`]: the [`EventStorage`] trait with file and in-memory backends
//!
//! Event types live in `courier-core` ([`courier_core::EventRepresentable`]);
//! this crate only routes and persists them.

#![deny(unsafe_code)]

pub mod bus;
pub mod storage;

pub use bus::{DEFAULT_CACHE_CAPACITY, EventBus};
pub use storage::{EventStorage, FileEventStorage, MemoryEventStorage, StorageError, StoredEvent};
