//! Opened/read status tracking for non-anonymous message categories.
//!
//! Stored as one `{queueId: bool}` JSON blob per category in the key/value
//! store, independent of the anonymous batch's TTL lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use courier_core::KeyValueStore;

/// Which read-state map a queue id is tracked in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadCategory {
    /// The message was opened/displayed.
    Opened,
    /// The message was read.
    Read,
}

impl ReadCategory {
    fn key(self) -> &'static str {
        match self {
            Self::Opened => "courier.readState.opened",
            Self::Read => "courier.readState.read",
        }
    }
}

/// Per-category read-state maps backed by the key/value store.
pub struct ReadStateStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ReadStateStore {
    /// Create a store over the given key/value backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Mark a queue entry in the given category.
    pub fn mark(&self, category: ReadCategory, queue_id: &str) {
        let mut state = self.load(category);
        let _ = state.insert(queue_id.to_string(), true);
        self.save(category, &state);
    }

    /// Whether a queue entry is marked in the given category.
    #[must_use]
    pub fn is_marked(&self, category: ReadCategory, queue_id: &str) -> bool {
        self.load(category).get(queue_id).copied().unwrap_or(false)
    }

    /// Drop all marks in a category.
    pub fn clear(&self, category: ReadCategory) {
        self.kv.remove(category.key());
    }

    fn load(&self, category: ReadCategory) -> HashMap<String, bool> {
        let Some(encoded) = self.kv.string(category.key()) else {
            return HashMap::new();
        };
        serde_json::from_str(&encoded).unwrap_or_else(|err| {
            warn!(category = ?category, error = %err, "stored read state is corrupt");
            HashMap::new()
        })
    }

    fn save(&self, category: ReadCategory, state: &HashMap<String, bool>) {
        match serde_json::to_string(state) {
            Ok(encoded) => self.kv.set_string(category.key(), &encoded),
            Err(err) => warn!(category = ?category, error = %err, "failed to save read state"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
