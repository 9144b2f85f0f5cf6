//! # Connection manager
//!
//! The actor that owns the streaming lifecycle: state transitions, the
//! heartbeat watchdog, and the retry policy all coordinate here. The manager
//! runs as a spawned task driven by a `select!` loop over four inputs — host
//! commands, decoded stream frames, retry verdicts, and heartbeat expirations
//! — and pushes [`StreamAction`]s to the host over a channel.
//!
//! Mutable connection state (the [`ConnectionState`], the generation counter,
//! the failure-episode flag) is owned exclusively by the run loop; external
//! callers interact only through [`ConnectionHandle`].

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use courier_core::{Message, RetryDecision, SseError};

use crate::heartbeat::{DEFAULT_HEARTBEAT_INTERVAL, HEARTBEAT_BUFFER, HeartbeatWatchdog};
use crate::parser::{ServerEvent, ServerEventType};
use crate::retry_policy::{RetryPolicy, RetryPolicyConfig, RetryVerdict};
use crate::sse::{RawFrame, decode_frames};
use crate::transport::StreamTransport;

/// Connection lifecycle states. Written only by the manager's run loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream is open and none is being opened.
    #[default]
    Disconnected,
    /// A stream is being opened.
    Connecting,
    /// The stream is open and frames are flowing.
    Connected,
    /// Teardown in progress after a stop request.
    Disconnecting,
}

/// Domain actions emitted toward the host application.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamAction {
    /// A `messages` event arrived; the payload (possibly empty) should be
    /// run through the message queue.
    ProcessMessages(Vec<Message>),
    /// The retry budget is exhausted or the error is not retryable; the host
    /// should fall back to polling. Emitted at most once per failure episode.
    DisableStreaming,
}

/// Tunables for the connection manager.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    /// Heartbeat interval assumed until the server advertises its own.
    pub heartbeat_interval: Duration,
    /// Grace buffer added to the heartbeat interval for the deadline.
    pub heartbeat_buffer: Duration,
    /// Retry policy tunables.
    pub retry: RetryPolicyConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_buffer: HEARTBEAT_BUFFER,
            retry: RetryPolicyConfig::default(),
        }
    }
}

impl From<&courier_settings::CourierSettings> for ConnectionConfig {
    fn from(settings: &courier_settings::CourierSettings) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(settings.streaming.heartbeat_interval_ms),
            heartbeat_buffer: Duration::from_millis(settings.streaming.heartbeat_buffer_ms),
            retry: RetryPolicyConfig::from(settings),
        }
    }
}

enum Command {
    Start,
    Stop,
}

/// Cloneable handle to a running [`ConnectionManager`].
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Request a connection. Idempotent: a start while `Connecting` or
    /// `Connected` is a no-op.
    pub fn start(&self) {
        let _ = self.commands.send(Command::Start);
    }

    /// Tear down the connection and invalidate in-flight retries/timers.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    /// The most recently published connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

type FrameStream = Pin<Box<dyn Stream<Item = Result<RawFrame, SseError>> + Send>>;

/// The streaming-connection actor.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Spawn the manager task.
    ///
    /// Returns the control handle and the channel on which domain actions
    /// are delivered.
    #[must_use]
    pub fn spawn(
        transport: Arc<dyn StreamTransport>,
        config: ConnectionConfig,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<StreamAction>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (policy, verdict_rx) = RetryPolicy::spawn(config.retry);
        let (watchdog, expired_rx) = HeartbeatWatchdog::new();

        let worker = Worker {
            transport,
            config,
            state: ConnectionState::Disconnected,
            state_tx,
            generation: 0,
            episode_failed: false,
            server_interval: None,
            policy,
            watchdog,
            actions: action_tx,
        };
        drop(tokio::spawn(worker.run(command_rx, verdict_rx, expired_rx)));

        (
            ConnectionHandle {
                commands: command_tx,
                state: state_rx,
            },
            action_rx,
        )
    }
}

struct Worker {
    transport: Arc<dyn StreamTransport>,
    config: ConnectionConfig,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    generation: u64,
    episode_failed: bool,
    server_interval: Option<Duration>,
    policy: RetryPolicy,
    watchdog: HeartbeatWatchdog,
    actions: mpsc::UnboundedSender<StreamAction>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut verdicts: mpsc::UnboundedReceiver<RetryVerdict>,
        mut expirations: mpsc::UnboundedReceiver<u64>,
    ) {
        let mut frames: Option<FrameStream> = None;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start) => self.handle_start(&mut frames).await,
                    Some(Command::Stop) => self.handle_stop(&mut frames),
                    None => {
                        // Every handle dropped; tear down and exit.
                        self.handle_stop(&mut frames);
                        break;
                    }
                },
                frame = Self::next_frame(&mut frames) => match frame {
                    Some(Ok(frame)) => self.handle_frame(&mut frames, &frame).await,
                    Some(Err(err)) => self.handle_stream_failure(&mut frames, err),
                    None => self.handle_stream_failure(
                        &mut frames,
                        SseError::Network {
                            message: "stream closed by server".into(),
                        },
                    ),
                },
                verdict = verdicts.recv() => {
                    let Some(verdict) = verdict else { break };
                    self.handle_verdict(&mut frames, verdict).await;
                }
                expired = expirations.recv() => {
                    let Some(generation) = expired else { break };
                    self.handle_heartbeat_timeout(&mut frames, generation);
                }
            }
        }
    }

    /// Resolves the next frame, or stays pending while no stream is open.
    async fn next_frame(frames: &mut Option<FrameStream>) -> Option<Result<RawFrame, SseError>> {
        match frames {
            Some(stream) => stream.next().await,
            None => std::future::pending().await,
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!(from = ?self.state, to = ?state, generation = self.generation, "connection state");
            self.state = state;
            let _ = self.state_tx.send(state);
        }
    }

    async fn handle_start(&mut self, frames: &mut Option<FrameStream>) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = ?self.state, "start ignored: connection already active");
            return;
        }

        // Fresh episode: a new generation invalidates any in-flight retries
        // and timers belonging to a superseded attempt.
        self.generation += 1;
        self.policy.advance_generation(self.generation);
        self.episode_failed = false;
        self.server_interval = None;

        self.open_stream(frames, false).await;
    }

    fn handle_stop(&mut self, frames: &mut Option<FrameStream>) {
        self.set_state(ConnectionState::Disconnecting);
        *frames = None;
        self.watchdog.cancel();

        // Advancing the generation is the cancellation mechanism for
        // in-flight retries and timers.
        self.generation += 1;
        self.policy.advance_generation(self.generation);

        self.set_state(ConnectionState::Disconnected);
    }

    async fn open_stream(&mut self, frames: &mut Option<FrameStream>, is_retry: bool) {
        self.set_state(ConnectionState::Connecting);
        debug!(generation = self.generation, is_retry, "opening stream");

        match self.transport.open().await {
            Ok(bytes) => {
                *frames = Some(Box::pin(decode_frames(bytes)));
                self.set_state(ConnectionState::Connected);
                self.policy.reset_retry_state(self.generation);
                self.watchdog
                    .start_timer(self.heartbeat_timeout(), self.generation);
            }
            Err(err) => self.handle_stream_failure(frames, err),
        }
    }

    /// The active heartbeat deadline: server-advertised interval when known,
    /// default otherwise, plus the grace buffer.
    fn heartbeat_timeout(&self) -> Duration {
        self.server_interval
            .unwrap_or(self.config.heartbeat_interval)
            + self.config.heartbeat_buffer
    }

    async fn handle_frame(&mut self, frames: &mut Option<FrameStream>, frame: &RawFrame) {
        let event = ServerEvent::from_frame(frame);
        match event.event_type {
            ServerEventType::Connected | ServerEventType::Heartbeat => {
                if let Some(seconds) = event.heartbeat_interval_seconds() {
                    self.server_interval = Some(Duration::from_secs(seconds));
                }
                debug!(
                    event_type = ?event.event_type,
                    generation = self.generation,
                    "liveness signal"
                );
                self.watchdog
                    .start_timer(self.heartbeat_timeout(), self.generation);
            }
            ServerEventType::Messages => {
                // Empty payloads still dispatch: zero messages is a normal
                // result, never silently dropped.
                let messages = event.messages();
                debug!(count = messages.len(), "dispatching message batch");
                let _ = self.actions.send(StreamAction::ProcessMessages(messages));
            }
            ServerEventType::TtlExceeded => {
                // Server-side stream rotation: reconnect within the same
                // generation without consuming a retry attempt.
                info!(generation = self.generation, "stream ttl exceeded, reconnecting");
                *frames = None;
                self.watchdog.cancel();
                self.open_stream(frames, true).await;
            }
            ServerEventType::Unknown => {
                debug!(raw_type = ?event.raw_type, "ignoring unknown server event");
            }
        }
    }

    fn handle_stream_failure(&mut self, frames: &mut Option<FrameStream>, error: SseError) {
        warn!(
            error = %error,
            category = error.category(),
            generation = self.generation,
            "stream failure"
        );
        *frames = None;
        self.watchdog.cancel();
        self.set_state(ConnectionState::Disconnected);
        self.policy.schedule_retry(error, self.generation);
    }

    async fn handle_verdict(&mut self, frames: &mut Option<FrameStream>, verdict: RetryVerdict) {
        if verdict.generation != self.generation {
            debug!(
                verdict_generation = verdict.generation,
                generation = self.generation,
                "ignoring retry verdict for stale generation"
            );
            return;
        }

        match verdict.decision {
            RetryDecision::RetryNow { attempt } => {
                if self.state == ConnectionState::Disconnected {
                    info!(attempt, generation = self.generation, "retrying connection");
                    self.open_stream(frames, true).await;
                } else {
                    debug!(state = ?self.state, "retry verdict ignored: not disconnected");
                }
            }
            RetryDecision::MaxRetriesReached | RetryDecision::RetryNotPossible => {
                self.dispatch_disable(verdict.decision);
            }
        }
    }

    fn handle_heartbeat_timeout(&mut self, frames: &mut Option<FrameStream>, generation: u64) {
        if generation != self.generation {
            debug!(
                expired_generation = generation,
                generation = self.generation,
                "ignoring heartbeat expiry for stale generation"
            );
            return;
        }
        warn!(generation, "heartbeat deadline missed");
        self.handle_stream_failure(
            frames,
            SseError::Timeout {
                message: "no heartbeat received within deadline".into(),
            },
        );
    }

    /// Surface retry exhaustion to the host, at most once per episode.
    fn dispatch_disable(&mut self, decision: RetryDecision) {
        if self.episode_failed {
            debug!("streaming already disabled for this episode");
            return;
        }
        self.episode_failed = true;
        warn!(
            ?decision,
            generation = self.generation,
            "disabling streaming, falling back to polling"
        );
        let _ = self.actions.send(StreamAction::DisableStreaming);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
