//! # Typed event bus
//!
//! Routes domain events by their type-derived key to registered observers,
//! with at-least-once delivery for events posted before any observer exists:
//!
//! - every post lands in a bounded per-type ring buffer (oldest evicted
//!   first) and is replayed to observers registering later
//! - a post that finds zero observers is additionally persisted to durable
//!   storage, surviving process restarts until an observer consumes it
//! - replay on subscribe runs durable events first (original post order),
//!   then the ring, deduplicated by storage id
//!
//! Posting snapshots the observer set under the lock and dispatches outside
//! it, so `remove_observer` never races an in-flight post.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use courier_core::EventRepresentable;

use crate::storage::{EventStorage, StoredEvent};

/// Ring-buffer capacity per event type.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

type ErasedObserver = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;

struct CachedEvent {
    storage_id: String,
    event: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Registry {
    observers: HashMap<&'static str, Vec<ErasedObserver>>,
    cache: HashMap<&'static str, VecDeque<CachedEvent>>,
}

/// The bus. Cheap to share behind an `Arc`.
pub struct EventBus {
    registry: Mutex<Registry>,
    storage: Arc<dyn EventStorage>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus over the given durable storage.
    #[must_use]
    pub fn new(storage: Arc<dyn EventStorage>) -> Self {
        Self::with_capacity(storage, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a bus with a custom per-type ring capacity.
    #[must_use]
    pub fn with_capacity(storage: Arc<dyn EventStorage>, capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            storage,
            capacity,
        }
    }

    /// Post an event to all observers of its type.
    ///
    /// Returns whether at least one observer existed. With zero observers
    /// the event is persisted for later replay; storage failures are logged
    /// and never propagate to the caller.
    pub fn post<E>(&self, event: E) -> bool
    where
        E: EventRepresentable + Serialize,
    {
        let key = E::key();
        let storage_id = event.storage_id().to_string();
        let payload = serde_json::to_value(&event);
        let event: Arc<E> = Arc::new(event);

        let observers = {
            let mut registry = self.registry.lock();
            let ring = registry.cache.entry(key).or_default();
            while ring.len() >= self.capacity {
                if ring.pop_front().is_none() {
                    break;
                }
            }
            ring.push_back(CachedEvent {
                storage_id: storage_id.clone(),
                event: Arc::clone(&event) as Arc<dyn Any + Send + Sync>,
            });
            registry.observers.get(key).cloned().unwrap_or_default()
        };

        if observers.is_empty() {
            debug!(key, storage_id, "no observers, persisting event for replay");
            match payload {
                Ok(payload) => {
                    if let Err(err) = self.storage.store(
                        key,
                        &StoredEvent {
                            storage_id,
                            payload,
                        },
                    ) {
                        warn!(key, error = %err, "failed to persist undelivered event");
                    }
                }
                Err(err) => warn!(key, error = %err, "failed to serialize event for storage"),
            }
            return false;
        }

        // Dispatch outside the lock, in registration order
        for observer in &observers {
            observer(event.as_ref());
        }
        true
    }

    /// Register an observer for an event type and immediately replay pending
    /// events of that type: durable storage first (removing each delivered
    /// event), then the in-memory ring, deduplicated by storage id.
    pub fn add_observer<E, F>(&self, action: F)
    where
        E: EventRepresentable + DeserializeOwned,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let key = E::key();
        let action = Arc::new(action);

        let erased: ErasedObserver = {
            let action = Arc::clone(&action);
            Arc::new(move |any: &(dyn Any + Send + Sync)| {
                if let Some(event) = any.downcast_ref::<E>() {
                    action(event);
                }
            })
        };

        // Register and snapshot the ring under one lock acquisition
        let cached: Vec<(String, Arc<dyn Any + Send + Sync>)> = {
            let mut registry = self.registry.lock();
            registry.observers.entry(key).or_default().push(erased);
            registry
                .cache
                .get(key)
                .map(|ring| {
                    ring.iter()
                        .map(|c| (c.storage_id.clone(), Arc::clone(&c.event)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut replayed: HashSet<String> = HashSet::new();
        match self.storage.load_all(key) {
            Ok(stored) => {
                for entry in stored {
                    match serde_json::from_value::<E>(entry.payload.clone()) {
                        Ok(event) => {
                            debug!(key, storage_id = entry.storage_id, "replaying durable event");
                            action(&event);
                            if let Err(err) = self.storage.remove(key, &entry.storage_id) {
                                warn!(key, error = %err, "failed to remove replayed event");
                            }
                            let _ = replayed.insert(entry.storage_id);
                        }
                        Err(err) => {
                            warn!(key, storage_id = entry.storage_id, error = %err,
                                "skipping undeserializable stored event");
                        }
                    }
                }
            }
            Err(err) => warn!(key, error = %err, "failed to load stored events for replay"),
        }

        for (storage_id, event) in cached {
            if replayed.contains(&storage_id) {
                continue;
            }
            if let Some(event) = event.downcast_ref::<E>() {
                debug!(key, storage_id, "replaying cached event");
                action(event);
            }
        }
    }

    /// Deregister all observers for an event type.
    pub fn remove_observer<E>(&self)
    where
        E: EventRepresentable,
    {
        let key = E::key();
        if self.registry.lock().observers.remove(key).is_some() {
            debug!(key, "observers removed");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{MessageMetric, MetricKind, ProfileIdentified};

    use crate::storage::MemoryEventStorage;

    fn bus() -> EventBus {
        EventBus::new(Arc::new(MemoryEventStorage::new()))
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&ProfileIdentified) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event: &ProfileIdentified| {
            sink.lock().push(event.identifier.clone());
        })
    }

    // ── Dispatch ─────────────────────────────────────────────────────────

    #[test]
    fn post_reports_observer_presence() {
        let bus = bus();
        assert!(!bus.post(ProfileIdentified::new("u1")));

        let (_seen, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);
        assert!(bus.post(ProfileIdentified::new("u2")));
    }

    #[test]
    fn observers_notified_in_registration_order() {
        let bus = bus();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let sink = Arc::clone(&order);
            bus.add_observer::<ProfileIdentified, _>(move |_| sink.lock().push(tag));
        }

        let _ = bus.post(ProfileIdentified::new("u1"));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn types_route_independently() {
        let bus = bus();
        let (profiles, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);

        // Metric has no observer; posting it must not reach the profile one
        assert!(!bus.post(MessageMetric::new("q1", MetricKind::Delivered)));
        assert!(bus.post(ProfileIdentified::new("u1")));
        assert_eq!(*profiles.lock(), vec!["u1"]);
    }

    #[test]
    fn removed_observers_stop_receiving() {
        let bus = bus();
        let (seen, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);

        assert!(bus.post(ProfileIdentified::new("before")));
        bus.remove_observer::<ProfileIdentified>();
        assert!(!bus.post(ProfileIdentified::new("after")));
        assert_eq!(*seen.lock(), vec!["before"]);
    }

    // ── Replay ───────────────────────────────────────────────────────────

    #[test]
    fn unobserved_posts_replay_on_subscribe_exactly_once() {
        let bus = bus();
        let _ = bus.post(ProfileIdentified::new("u1"));
        let _ = bus.post(ProfileIdentified::new("u2"));

        // First observer gets both (durable + ring deduplicated)
        let (seen, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);
        assert_eq!(*seen.lock(), vec!["u1", "u2"]);
    }

    #[test]
    fn replay_removes_events_from_storage() {
        let storage = Arc::new(MemoryEventStorage::new());
        let bus = EventBus::new(Arc::clone(&storage) as Arc<dyn EventStorage>);

        let _ = bus.post(ProfileIdentified::new("u1"));
        assert_eq!(storage.load_all(ProfileIdentified::key()).unwrap().len(), 1);

        let (_seen, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);
        assert!(storage.load_all(ProfileIdentified::key()).unwrap().is_empty());
    }

    #[test]
    fn second_observer_replays_from_ring() {
        let bus = bus();
        let (first, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);

        // Delivered live, so nothing is persisted
        assert!(bus.post(ProfileIdentified::new("u1")));

        // A later observer still sees it via the ring
        let (second, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);
        assert_eq!(*first.lock(), vec!["u1"]);
        assert_eq!(*second.lock(), vec!["u1"]);
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let bus = EventBus::with_capacity(Arc::new(MemoryEventStorage::new()), 2);
        let (seen, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);

        for id in ["u1", "u2", "u3"] {
            let _ = bus.post(ProfileIdentified::new(id));
        }

        // Late observer replays only the newest two from the ring
        let (late, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);
        assert_eq!(*seen.lock(), vec!["u1", "u2", "u3"]);
        assert_eq!(*late.lock(), vec!["u2", "u3"]);
    }

    #[test]
    fn events_survive_bus_restart_via_shared_storage() {
        let storage: Arc<dyn EventStorage> = Arc::new(MemoryEventStorage::new());

        {
            let bus = EventBus::new(Arc::clone(&storage));
            let _ = bus.post(ProfileIdentified::new("persisted"));
        }

        // A new bus instance (fresh ring) over the same storage replays it
        let bus = EventBus::new(storage);
        let (seen, action) = recorder();
        bus.add_observer::<ProfileIdentified, _>(action);
        assert_eq!(*seen.lock(), vec!["persisted"]);
    }
}
