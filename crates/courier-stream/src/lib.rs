//! # courier-stream
//!
//! The resilient streaming half of the Courier pipeline:
//!
//! - [`sse`]: wire-frame decoder (bytes → [`sse::RawFrame`])
//! - [`parser`]: frame → typed [`parser::ServerEvent`] with lenient payloads
//! - [`retry_policy`]: generation-tracked backoff decisions
//! - [`heartbeat`]: deadline watchdog with stale-generation guards
//! - [`transport`]: the injected byte-stream transport (HTTP/SSE impl)
//! - [`connection`]: the connection-manager actor tying it all together
//!
//! Data flow: transport bytes → frames → server events → domain
//! [`connection::StreamAction`]s pulled by the host over a channel.

#![deny(unsafe_code)]

pub mod connection;
pub mod heartbeat;
pub mod parser;
pub mod retry_policy;
pub mod sse;
pub mod transport;

pub use connection::{ConnectionConfig, ConnectionHandle, ConnectionManager, ConnectionState, StreamAction};
pub use heartbeat::HeartbeatWatchdog;
pub use parser::{ServerEvent, ServerEventType};
pub use retry_policy::{RetryPolicy, RetryPolicyConfig, RetryVerdict};
pub use sse::RawFrame;
pub use transport::{ByteStream, HttpStreamTransport, StreamTransport};
