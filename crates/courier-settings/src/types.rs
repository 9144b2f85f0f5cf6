//! Settings type definitions with compiled defaults.

use serde::{Deserialize, Serialize};

/// Top-level Courier settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    /// Network endpoints.
    pub network: NetworkSettings,
    /// Streaming connection behavior.
    pub streaming: StreamingSettings,
    /// Polling fallback behavior.
    pub polling: PollingSettings,
    /// Local inbox behavior.
    pub inbox: InboxSettings,
}

/// Network endpoint settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSettings {
    /// Base URL of the delivery server.
    pub base_url: String,
    /// Path of the SSE stream endpoint, relative to `base_url`.
    pub stream_path: String,
}

impl NetworkSettings {
    /// Absolute URL of the SSE stream endpoint.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.stream_path.trim_start_matches('/')
        )
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            base_url: "https://in-app.courier.example".into(),
            stream_path: "/api/v1/stream".into(),
        }
    }
}

/// Streaming connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingSettings {
    /// Expected heartbeat interval before the server advertises its own, ms.
    pub heartbeat_interval_ms: u64,
    /// Grace buffer added to the heartbeat deadline, ms.
    pub heartbeat_buffer_ms: u64,
    /// Maximum reconnect attempts per failure episode.
    pub max_retry_count: u32,
    /// Fixed delay before attempts 2+, ms.
    pub retry_delay_ms: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            heartbeat_buffer_ms: 5_000,
            max_retry_count: courier_core::retry::DEFAULT_MAX_RETRY_COUNT,
            retry_delay_ms: courier_core::retry::DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Polling fallback settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingSettings {
    /// How often the fallback poller fetches the message list, ms.
    pub interval_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 600_000,
        }
    }
}

/// Local inbox settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboxSettings {
    /// Time-to-live of a received anonymous batch, minutes.
    pub anonymous_ttl_minutes: u64,
}

impl Default for InboxSettings {
    fn default() -> Self {
        Self {
            anonymous_ttl_minutes: 60,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_constants() {
        let settings = CourierSettings::default();
        assert_eq!(settings.streaming.heartbeat_interval_ms, 30_000);
        assert_eq!(settings.streaming.heartbeat_buffer_ms, 5_000);
        assert_eq!(settings.streaming.max_retry_count, 3);
        assert_eq!(settings.streaming.retry_delay_ms, 5_000);
        assert_eq!(settings.inbox.anonymous_ttl_minutes, 60);
        assert_eq!(settings.polling.interval_ms, 600_000);
    }

    #[test]
    fn stream_url_joins_base_and_path() {
        let settings = CourierSettings::default();
        assert_eq!(
            settings.network.stream_url(),
            "https://in-app.courier.example/api/v1/stream"
        );

        let slashed = NetworkSettings {
            base_url: "http://localhost:8080/".into(),
            stream_path: "stream".into(),
        };
        assert_eq!(slashed.stream_url(), "http://localhost:8080/stream");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: CourierSettings =
            serde_json::from_str(r#"{"streaming":{"maxRetryCount":5}}"#).unwrap();
        assert_eq!(settings.streaming.max_retry_count, 5);
        assert_eq!(settings.streaming.retry_delay_ms, 5_000);
        assert_eq!(settings.inbox.anonymous_ttl_minutes, 60);
    }

    #[test]
    fn serde_roundtrip() {
        let settings = CourierSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: CourierSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }
}
