//! Wire-format message types and tracking state.
//!
//! A [`Message`] is stored as a flat struct with base fields at the top level
//! and opaque `properties` JSON, matching the server payload exactly. Typed
//! access to the properties (broadcast frequency, element id, page rule) is
//! opt-in via accessor methods, which validate on every call and degrade to
//! `None` rather than erroring on malformed data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Property key holding the broadcast block for anonymous messages.
const PROP_BROADCAST: &str = "broadcast";
/// Property key holding the frequency rules inside the broadcast block.
const PROP_FREQUENCY: &str = "frequency";
/// Property key holding the element id for inline/embedded messages.
const PROP_ELEMENT_ID: &str = "elementId";
/// Property key holding the route rule for page matching.
const PROP_ROUTE_RULE: &str = "routeRule";

/// An in-app message as delivered by the server.
///
/// The canonical wire format is
/// `{queueId, priority, messageId, properties?}`. `properties` is kept as
/// opaque JSON for wire compatibility; derived flags are computed on access.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub message_id: String,
    /// Queue entry identifier (absent for broadcast-only payloads).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    /// Display priority; lower values are shown first, `None` sorts last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Server-defined properties (opaque JSON).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, Value>,
}

impl Message {
    /// Create a message with no queue id, priority, or properties.
    #[must_use]
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            queue_id: None,
            priority: None,
            properties: serde_json::Map::new(),
        }
    }

    /// The validated broadcast frequency block, if present and well-formed.
    ///
    /// A negative `count` or `delay` invalidates the entire block.
    #[must_use]
    pub fn broadcast_frequency(&self) -> Option<BroadcastFrequency> {
        let frequency = self
            .properties
            .get(PROP_BROADCAST)?
            .get(PROP_FREQUENCY)?
            .as_object()?;

        let count = frequency.get("count").and_then(Value::as_i64).unwrap_or(0);
        let delay = frequency.get("delay").and_then(Value::as_i64).unwrap_or(0);
        if count < 0 || delay < 0 {
            return None;
        }

        Some(BroadcastFrequency {
            count: count.unsigned_abs(),
            delay_seconds: delay.unsigned_abs(),
            ignore_dismiss: frequency
                .get("ignoreDismiss")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Whether this is an anonymous (broadcast) message governed by
    /// frequency-capping rules.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.broadcast_frequency().is_some()
    }

    /// The element id for inline messages, if any.
    #[must_use]
    pub fn element_id(&self) -> Option<&str> {
        self.properties.get(PROP_ELEMENT_ID).and_then(Value::as_str)
    }

    /// Whether this message renders inline into a host-provided element.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.element_id().is_some()
    }

    /// The route rule for page matching, if any. Empty rules count as absent.
    #[must_use]
    pub fn page_rule(&self) -> Option<&str> {
        self.properties
            .get(PROP_ROUTE_RULE)
            .and_then(Value::as_str)
            .filter(|rule| !rule.is_empty())
    }
}

/// Validated frequency-capping rules for a broadcast message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadcastFrequency {
    /// Maximum number of times the message may be shown; `0` means unlimited.
    pub count: u64,
    /// Minimum seconds between shows; `0` means no delay window.
    pub delay_seconds: u64,
    /// Whether a user dismissal is ignored for eligibility.
    pub ignore_dismiss: bool,
}

/// Per-message display tracking, keyed by message id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTracking {
    /// How many times the message has been shown.
    #[serde(default)]
    pub times_shown: u64,
    /// Whether the user dismissed the message.
    #[serde(default)]
    pub dismissed: bool,
    /// Epoch milliseconds before which the message must not be shown again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_show_time: Option<f64>,
}

/// Persisted wrapper for the tracking map.
///
/// Stored as `{"tracking": {messageId: {...}}}` in the key/value store,
/// independent of the message cache's TTL lifecycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesTrackingData {
    /// Tracking entries keyed by message id.
    #[serde(default)]
    pub tracking: HashMap<String, MessageTracking>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
