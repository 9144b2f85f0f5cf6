//! # Durable event storage
//!
//! Persists events that were posted before any observer registered, so they
//! can be replayed later (including across process restarts). Storage is
//! keyed by `(event type, storage id)`; the file backend keeps one JSON file
//! per event under `<root>/<type>/<storage_id>.json`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Errors from the durable event store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("storage io error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Payload could not be serialized.
    #[error("storage serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One persisted event.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEvent {
    /// Unique event identity; also the replay dedup key.
    pub storage_id: String,
    /// Serialized event payload.
    pub payload: Value,
}

/// Durable storage for events awaiting an observer.
pub trait EventStorage: Send + Sync {
    /// Persist an event under its type key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the event cannot be written.
    fn store(&self, event_type: &str, event: &StoredEvent) -> Result<(), StorageError>;

    /// Load all persisted events of a type, ordered by storage id.
    ///
    /// Storage ids are time-ordered (UUID v7), so this is original post
    /// order. Corrupt entries are skipped, not fatal.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store itself cannot be read.
    fn load_all(&self, event_type: &str) -> Result<Vec<StoredEvent>, StorageError>;

    /// Remove one persisted event. Removing an absent event is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on filesystem failure other than absence.
    fn remove(&self, event_type: &str, storage_id: &str) -> Result<(), StorageError>;
}

/// File-per-event storage rooted at a directory.
pub struct FileEventStorage {
    root: PathBuf,
    // Serializes all store operations; readers never observe partial writes.
    lock: Mutex<()>,
}

impl FileEventStorage {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    fn type_dir(&self, event_type: &str) -> PathBuf {
        self.root.join(event_type)
    }

    fn event_path(&self, event_type: &str, storage_id: &str) -> PathBuf {
        self.type_dir(event_type).join(format!("{storage_id}.json"))
    }
}

impl EventStorage for FileEventStorage {
    fn store(&self, event_type: &str, event: &StoredEvent) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let dir = self.type_dir(event_type);
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = self.event_path(event_type, &event.storage_id);
        let bytes = serde_json::to_vec(&event.payload)?;
        fs::write(&path, bytes).map_err(|source| StorageError::Io { path, source })
    }

    fn load_all(&self, event_type: &str) -> Result<Vec<StoredEvent>, StorageError> {
        let _guard = self.lock.lock();
        let dir = self.type_dir(event_type);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            // No directory means nothing was ever stored for this type
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StorageError::Io { path: dir, source }),
        };

        let mut events = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(storage_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match read_payload(&path) {
                Ok(payload) => events.push(StoredEvent {
                    storage_id: storage_id.to_string(),
                    payload,
                }),
                Err(err) => {
                    // One corrupt file must not block replay of the rest
                    warn!(path = %path.display(), error = %err, "skipping corrupt stored event");
                }
            }
        }

        events.sort_by(|a, b| a.storage_id.cmp(&b.storage_id));
        Ok(events)
    }

    fn remove(&self, event_type: &str, storage_id: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let path = self.event_path(event_type, storage_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

fn read_payload(path: &Path) -> Result<Value, StorageError> {
    let bytes = fs::read(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// In-memory storage, for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemoryEventStorage {
    events: Mutex<HashMap<String, Vec<StoredEvent>>>,
}

impl MemoryEventStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStorage for MemoryEventStorage {
    fn store(&self, event_type: &str, event: &StoredEvent) -> Result<(), StorageError> {
        let mut events = self.events.lock();
        events
            .entry(event_type.to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn load_all(&self, event_type: &str) -> Result<Vec<StoredEvent>, StorageError> {
        let mut loaded = self
            .events
            .lock()
            .get(event_type)
            .cloned()
            .unwrap_or_default();
        loaded.sort_by(|a, b| a.storage_id.cmp(&b.storage_id));
        Ok(loaded)
    }

    fn remove(&self, event_type: &str, storage_id: &str) -> Result<(), StorageError> {
        let mut events = self.events.lock();
        if let Some(list) = events.get_mut(event_type) {
            list.retain(|e| e.storage_id != storage_id);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
