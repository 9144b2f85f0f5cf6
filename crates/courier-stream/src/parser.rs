//! Server event parsing.
//!
//! Maps a decoded [`RawFrame`] into a typed [`ServerEvent`]. The parser is
//! deliberately tolerant: unrecognized types map to [`ServerEventType::Unknown`]
//! with the raw string retained, and message payloads degrade to "no
//! messages" on any JSON problem — absence of messages is a normal, frequent
//! case downstream, never a failure.

use serde_json::Value;
use tracing::{debug, warn};

use courier_core::Message;

use crate::sse::RawFrame;

/// Typed classification of a wire frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerEventType {
    /// The server acknowledged the connection.
    Connected,
    /// Periodic liveness signal.
    Heartbeat,
    /// A message-list payload.
    Messages,
    /// The server-side stream TTL elapsed; the client should reconnect.
    TtlExceeded,
    /// Unrecognized event type; retained for logging, otherwise ignored.
    Unknown,
}

/// One typed event from the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerEvent {
    /// Frame id, if the server sent one.
    pub id: Option<String>,
    /// Classified event type.
    pub event_type: ServerEventType,
    /// The raw type string as received, for unknown-type diagnostics.
    pub raw_type: Option<String>,
    /// Raw data payload.
    pub payload: String,
}

impl ServerEvent {
    /// Parse a wire frame into a typed event.
    ///
    /// An absent or empty `event` field defaults to `Messages` (SSE
    /// convention); unrecognized non-empty types map to `Unknown`.
    #[must_use]
    pub fn from_frame(frame: &RawFrame) -> Self {
        let event_type = match frame.event.as_deref() {
            None | Some("") => ServerEventType::Messages,
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "connected" => ServerEventType::Connected,
                "heartbeat" => ServerEventType::Heartbeat,
                "messages" => ServerEventType::Messages,
                "ttl_exceeded" => ServerEventType::TtlExceeded,
                other => {
                    debug!(event_type = other, "unrecognized server event type");
                    ServerEventType::Unknown
                }
            },
        };

        Self {
            id: frame.id.clone(),
            event_type,
            raw_type: frame.event.clone(),
            payload: frame.data.clone(),
        }
    }

    /// Parse the message list from the payload.
    ///
    /// Only attempted for `Messages`-type events; any other type yields an
    /// empty list without touching the payload. Malformed or partial array
    /// items are skipped individually, valid ones retained.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        if self.event_type != ServerEventType::Messages || self.payload.is_empty() {
            return Vec::new();
        }

        let root: Value = match serde_json::from_str(&self.payload) {
            Ok(v) => v,
            Err(err) => {
                warn!(error = %err, "failed to parse messages payload");
                return Vec::new();
            }
        };

        let Value::Array(items) = root else {
            warn!("messages payload is not an array");
            return Vec::new();
        };

        items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<Message>(item) {
                Ok(message) => Some(message),
                Err(err) => {
                    warn!(error = %err, "skipping invalid message in payload");
                    None
                }
            })
            .collect()
    }

    /// Server-advertised heartbeat interval in seconds, if the payload
    /// carries one (`{"interval": seconds}` on connected/heartbeat events).
    #[must_use]
    pub fn heartbeat_interval_seconds(&self) -> Option<u64> {
        if self.payload.is_empty() {
            return None;
        }
        serde_json::from_str::<Value>(&self.payload)
            .ok()?
            .get("interval")?
            .as_u64()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
