//! Streaming error taxonomy.
//!
//! Every failure on the streaming path is classified into an [`SseError`]
//! variant whose retryability drives the retry policy:
//!
//! - network/timeout errors are transient and retryable
//! - server errors are retryable only for 408, 429, and 5xx
//! - configuration errors (missing credentials) are never retryable
//! - anything unclassified fails open as retryable [`SseError::Unknown`]

use thiserror::Error;

/// A classified streaming-connection error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SseError {
    /// Connectivity failure (no network, DNS, refused, connection lost).
    #[error("network error: {message}")]
    Network {
        /// Human-readable description.
        message: String,
    },

    /// A deadline was exceeded (connect or heartbeat).
    #[error("timed out: {message}")]
    Timeout {
        /// Human-readable description.
        message: String,
    },

    /// HTTP-classified server failure.
    #[error("server error (status {code:?}): {message}")]
    Server {
        /// HTTP status code, when one was observed.
        code: Option<u16>,
        /// Human-readable description.
        message: String,
    },

    /// Client misconfiguration, e.g. a missing auth token. Never retryable.
    #[error("configuration error: {message}")]
    Configuration {
        /// Human-readable description.
        message: String,
    },

    /// Unclassified failure. Retryable, failing open toward availability.
    #[error("unknown streaming error: {message}")]
    Unknown {
        /// Human-readable description.
        message: String,
    },
}

impl SseError {
    /// Classify an HTTP status code into a server error.
    #[must_use]
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Whether the retry policy should attempt to reconnect after this error.
    ///
    /// Server errors without an observed status code fail open as retryable.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::Unknown { .. } => true,
            Self::Configuration { .. } => false,
            Self::Server { code, .. } => {
                code.is_none_or(|c| c == 408 || c == 429 || (500..600).contains(&c))
            }
        }
    }

    /// Stable category label for logs and metrics.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::Server { .. } => "server",
            Self::Configuration { .. } => "configuration",
            Self::Unknown { .. } => "unknown",
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
    fn network_and_timeout_retryable() {
        assert!(SseError::Network { message: "refused".into() }.should_retry());
        assert!(SseError::Timeout { message: "deadline".into() }.should_retry());
    }

    #[test]
    fn unknown_fails_open() {
        assert!(SseError::Unknown { message: "?".into() }.should_retry());
    }

    #[test]
    fn configuration_never_retryable() {
        let err = SseError::Configuration {
            message: "missing token".into(),
        };
        assert!(!err.should_retry());
    }

    #[test]
    fn server_408_429_5xx_retryable() {
        assert!(SseError::from_status(408, "timeout").should_retry());
        assert!(SseError::from_status(429, "rate limited").should_retry());
        assert!(SseError::from_status(500, "internal").should_retry());
        assert!(SseError::from_status(503, "unavailable").should_retry());
        assert!(SseError::from_status(599, "edge").should_retry());
    }

    #[test]
    fn server_other_4xx_not_retryable() {
        assert!(!SseError::from_status(400, "bad request").should_retry());
        assert!(!SseError::from_status(401, "unauthorized").should_retry());
        assert!(!SseError::from_status(404, "not found").should_retry());
        assert!(!SseError::from_status(410, "gone").should_retry());
    }

    #[test]
    fn server_without_code_fails_open() {
        let err = SseError::Server {
            code: None,
            message: "opaque".into(),
        };
        assert!(err.should_retry());
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(SseError::Network { message: String::new() }.category(), "network");
        assert_eq!(SseError::from_status(500, "").category(), "server");
        assert_eq!(
            SseError::Configuration { message: String::new() }.category(),
            "configuration"
        );
    }

    #[test]
    fn display_includes_status() {
        let err = SseError::from_status(503, "unavailable");
        let rendered = err.to_string();
        assert!(rendered.contains("503"));
        assert!(rendered.contains("unavailable"));
    }
}
