//! Stream transport.
//!
//! The connection manager opens its byte stream through the injected
//! [`StreamTransport`] trait; tests substitute channel-backed fakes.
//! [`HttpStreamTransport`] is the production implementation: a long-lived
//! `text/event-stream` GET with bearer auth, classifying connect failures
//! and response statuses into [`SseError`] before the retry policy sees them.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use courier_core::SseError;

/// A raw byte stream from the server; errors are pre-classified.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SseError>> + Send>>;

/// Opens the streaming connection.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a new byte stream.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SseError`] when the connection cannot be
    /// established.
    async fn open(&self) -> Result<ByteStream, SseError>;
}

/// HTTP SSE transport over reqwest.
pub struct HttpStreamTransport {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpStreamTransport {
    /// Create a transport for the given stream URL.
    #[must_use]
    pub fn new(url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            auth_token,
        }
    }

    /// Create a transport pointed at the configured stream endpoint
    /// (`network.baseUrl` + `network.streamPath`).
    #[must_use]
    pub fn from_settings(
        settings: &courier_settings::CourierSettings,
        auth_token: Option<String>,
    ) -> Self {
        Self::new(settings.network.stream_url(), auth_token)
    }

    /// Create a transport with a shared HTTP client.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        url: impl Into<String>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            auth_token,
        }
    }

    fn build_headers(&self) -> Result<HeaderMap, SseError> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let token = self
            .auth_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SseError::Configuration {
                message: "missing auth token for streaming connection".into(),
            })?;

        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|err| {
            SseError::Configuration {
                message: format!("invalid auth token: {err}"),
            }
        })?;
        let _ = headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}

#[async_trait]
impl StreamTransport for HttpStreamTransport {
    async fn open(&self) -> Result<ByteStream, SseError> {
        let headers = self.build_headers()?;

        debug!(url = %self.url, "opening stream");
        let response = self
            .client
            .get(&self.url)
            .headers(headers)
            .send()
            .await
            .map_err(|err| classify_transport_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SseError::from_status(
                status.as_u16(),
                format!("stream endpoint returned {status}"),
            ));
        }

        let stream = response
            .bytes_stream()
            .map_err(|err| classify_transport_error(&err));
        Ok(Box::pin(stream))
    }
}

/// Classify a reqwest error into the streaming taxonomy.
pub fn classify_transport_error(err: &reqwest::Error) -> SseError {
    if err.is_timeout() {
        return SseError::Timeout {
            message: err.to_string(),
        };
    }
    if let Some(status) = err.status() {
        return SseError::from_status(status.as_u16(), err.to_string());
    }
    if err.is_connect() || err.is_request() || err.is_body() {
        return SseError::Network {
            message: err.to_string(),
        };
    }
    SseError::Unknown {
        message: err.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::sse::decode_frames;

    #[tokio::test]
    async fn missing_token_is_configuration_error() {
        let transport = HttpStreamTransport::new("https://unused.example/stream", None);
        let err = transport.open().await.err().expect("expected error");
        assert_matches!(err, SseError::Configuration { .. });
        assert!(!err.should_retry());
    }

    #[tokio::test]
    async fn empty_token_is_configuration_error() {
        let transport =
            HttpStreamTransport::new("https://unused.example/stream", Some(String::new()));
        assert_matches!(
            transport.open().await.err().expect("expected error"),
            SseError::Configuration { .. }
        );
    }

    #[tokio::test]
    async fn successful_open_yields_decodable_frames() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .and(header("accept", "text/event-stream"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("event: messages\ndata: []\n\n", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let transport =
            HttpStreamTransport::new(format!("{}/stream", server.uri()), Some("token-1".into()));
        let bytes = transport.open().await.unwrap();
        let frames: Vec<_> = decode_frames(bytes).map(|r| r.unwrap()).collect().await;

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("messages"));
        assert_eq!(frames[0].data, "[]");
    }

    #[tokio::test]
    async fn from_settings_targets_configured_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/custom/stream"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("data: []\n\n", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let mut settings = courier_settings::CourierSettings::default();
        settings.network.base_url = server.uri();
        settings.network.stream_path = "/custom/stream".into();

        let transport = HttpStreamTransport::from_settings(&settings, Some("t".into()));
        let bytes = transport.open().await.unwrap();
        let frames: Vec<_> = decode_frames(bytes).map(|r| r.unwrap()).collect().await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn server_4xx_classified_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport =
            HttpStreamTransport::new(format!("{}/stream", server.uri()), Some("t".into()));
        let err = transport.open().await.err().expect("expected error");
        assert_matches!(err, SseError::Server { code: Some(404), .. });
        assert!(!err.should_retry());
    }

    #[tokio::test]
    async fn server_5xx_classified_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let transport =
            HttpStreamTransport::new(format!("{}/stream", server.uri()), Some("t".into()));
        let err = transport.open().await.err().expect("expected error");
        assert_matches!(err, SseError::Server { code: Some(503), .. });
        assert!(err.should_retry());
    }

    #[tokio::test]
    async fn connect_failure_classified_as_network() {
        // Nothing listens on this port
        let transport =
            HttpStreamTransport::new("http://127.0.0.1:9/stream", Some("t".into()));
        let err = transport.open().await.err().expect("expected error");
        assert_matches!(err, SseError::Network { .. } | SseError::Timeout { .. });
        assert!(err.should_retry());
    }
}
