//! Domain events carried on the event bus.
//!
//! Any type implementing [`EventRepresentable`] can be posted: its `key` is a
//! type-derived routing string, its `storage_id` a unique identity used for
//! durable replay, and its serialized form is the persisted payload. Concrete
//! events below cover the cross-module notifications the pipeline emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A domain event that can be posted on the bus and persisted for replay.
pub trait EventRepresentable: Send + Sync + 'static {
    /// Type-derived routing key. Stable across process restarts.
    fn key() -> &'static str
    where
        Self: Sized;

    /// Unique identity of this event instance; replay dedup key.
    fn storage_id(&self) -> &str;

    /// When the event was created.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Structured parameters for logging and analytics handoff.
    fn params(&self) -> serde_json::Value;
}

/// A user profile was identified (login or anonymous-to-known migration).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileIdentified {
    /// Unique event id (UUID v7).
    pub storage_id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// The profile identifier.
    pub identifier: String,
}

impl ProfileIdentified {
    /// Create a new event for the given identifier.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            storage_id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            identifier: identifier.into(),
        }
    }
}

impl EventRepresentable for ProfileIdentified {
    fn key() -> &'static str {
        "profile.identified"
    }

    fn storage_id(&self) -> &str {
        &self.storage_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({ "identifier": self.identifier })
    }
}

/// What happened to a delivered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// The message reached the device.
    Delivered,
    /// The message was shown/opened.
    Opened,
    /// The user dismissed the message.
    Dismissed,
}

/// A display metric for a delivered message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetric {
    /// Unique event id (UUID v7).
    pub storage_id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// The queue entry the metric refers to.
    pub delivery_id: String,
    /// Which metric occurred.
    pub metric: MetricKind,
}

impl MessageMetric {
    /// Create a new metric event.
    #[must_use]
    pub fn new(delivery_id: impl Into<String>, metric: MetricKind) -> Self {
        Self {
            storage_id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            delivery_id: delivery_id.into(),
            metric,
        }
    }
}

impl EventRepresentable for MessageMetric {
    fn key() -> &'static str {
        "message.metric"
    }

    fn storage_id(&self) -> &str {
        &self.storage_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "deliveryId": self.delivery_id,
            "metric": self.metric,
        })
    }
}

/// Streaming was disabled after retry exhaustion; polling takes over.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingDisabled {
    /// Unique event id (UUID v7).
    pub storage_id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Why streaming was disabled (last error category).
    pub reason: String,
}

impl StreamingDisabled {
    /// Create a new event with the terminal error category as the reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            storage_id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            reason: reason.into(),
        }
    }
}

impl EventRepresentable for StreamingDisabled {
    fn key() -> &'static str {
        "streaming.disabled"
    }

    fn storage_id(&self) -> &str {
        &self.storage_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({ "reason": self.reason })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
