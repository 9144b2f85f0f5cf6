//! Key/value persistence interface.
//!
//! The pipeline consumes string-keyed storage with typed accessors; the
//! on-disk implementation is supplied by the host app. [`MemoryKeyValueStore`]
//! backs tests and ephemeral (logged-out) sessions.
//!
//! Typed accessors return `None` on both a missing key and a type mismatch —
//! persisted state is always treated as advisory, never load-bearing enough
//! to error on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// String-keyed storage with typed accessors.
pub trait KeyValueStore: Send + Sync {
    /// Store a string value.
    fn set_string(&self, key: &str, value: &str);
    /// Read a string value.
    fn string(&self, key: &str) -> Option<String>;

    /// Store an integer value.
    fn set_int(&self, key: &str, value: i64);
    /// Read an integer value.
    fn int(&self, key: &str) -> Option<i64>;

    /// Store a floating-point value.
    fn set_double(&self, key: &str, value: f64);
    /// Read a floating-point value.
    fn double(&self, key: &str) -> Option<f64>;

    /// Store a date value.
    fn set_date(&self, key: &str, value: DateTime<Utc>);
    /// Read a date value.
    fn date(&self, key: &str) -> Option<DateTime<Utc>>;

    /// Store a raw byte value.
    fn set_bytes(&self, key: &str, value: &[u8]);
    /// Read a raw byte value.
    fn bytes(&self, key: &str) -> Option<Vec<u8>>;

    /// Remove a key. Removing an absent key is a no-op.
    fn remove(&self, key: &str);
}

#[derive(Clone, Debug)]
enum StoredValue {
    Str(String),
    Int(i64),
    Double(f64),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
}

/// In-memory [`KeyValueStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, key: &str, value: StoredValue) {
        let _ = self.entries.write().insert(key.to_string(), value);
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn set_string(&self, key: &str, value: &str) {
        self.insert(key, StoredValue::Str(value.to_string()));
    }

    fn string(&self, key: &str) -> Option<String> {
        match self.entries.read().get(key) {
            Some(StoredValue::Str(v)) => Some(v.clone()),
            _ => None,
        }
    }

    fn set_int(&self, key: &str, value: i64) {
        self.insert(key, StoredValue::Int(value));
    }

    fn int(&self, key: &str) -> Option<i64> {
        match self.entries.read().get(key) {
            Some(StoredValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    fn set_double(&self, key: &str, value: f64) {
        self.insert(key, StoredValue::Double(value));
    }

    fn double(&self, key: &str) -> Option<f64> {
        match self.entries.read().get(key) {
            Some(StoredValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    fn set_date(&self, key: &str, value: DateTime<Utc>) {
        self.insert(key, StoredValue::Date(value));
    }

    fn date(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.entries.read().get(key) {
            Some(StoredValue::Date(v)) => Some(*v),
            _ => None,
        }
    }

    fn set_bytes(&self, key: &str, value: &[u8]) {
        self.insert(key, StoredValue::Bytes(value.to_vec()));
    }

    fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        match self.entries.read().get(key) {
            Some(StoredValue::Bytes(v)) => Some(v.clone()),
            _ => None,
        }
    }

    fn remove(&self, key: &str) {
        let _ = self.entries.write().remove(key);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
