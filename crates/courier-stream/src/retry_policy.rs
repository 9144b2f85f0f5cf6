//! # Generation-tracked retry policy
//!
//! A worker task consumes an ordered command channel and emits
//! generation-tagged [`RetryDecision`]s on an mpsc stream. Commands are
//! processed strictly sequentially — the attempt delay is awaited inline in
//! the worker — so attempt numbers are monotonic within a generation and
//! consumers can pull decisions in order.
//!
//! Generation rules:
//! - `Schedule`/`Reset` carrying a generation other than the current one are
//!   ignored (stale callers from a superseded connection attempt)
//! - `Advance` moves to a new generation and zeroes the attempt counter
//!
//! Backoff: attempt 1 is immediate; attempts 2+ wait a fixed delay; the call
//! after the retry budget emits [`RetryDecision::MaxRetriesReached`] once,
//! and further calls in the exhausted episode emit nothing.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use courier_core::retry::{DEFAULT_MAX_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS};
use courier_core::{RetryDecision, SseError};

/// Configuration for the retry policy worker.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicyConfig {
    /// Maximum reconnect attempts per episode.
    pub max_retry_count: u32,
    /// Fixed delay before attempts 2+.
    pub retry_delay: Duration,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl From<&courier_settings::CourierSettings> for RetryPolicyConfig {
    fn from(settings: &courier_settings::CourierSettings) -> Self {
        Self {
            max_retry_count: settings.streaming.max_retry_count,
            retry_delay: Duration::from_millis(settings.streaming.retry_delay_ms),
        }
    }
}

/// A decision tagged with the generation it was made for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryVerdict {
    /// The decision.
    pub decision: RetryDecision,
    /// Generation the decision belongs to.
    pub generation: u64,
}

enum RetryCommand {
    Schedule { error: SseError, generation: u64 },
    Reset { generation: u64 },
    Advance { generation: u64 },
}

/// Handle to the retry policy worker.
#[derive(Clone)]
pub struct RetryPolicy {
    tx: mpsc::UnboundedSender<RetryCommand>,
}

impl RetryPolicy {
    /// Spawn the worker and return the handle plus the decision stream.
    #[must_use]
    pub fn spawn(config: RetryPolicyConfig) -> (Self, mpsc::UnboundedReceiver<RetryVerdict>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (verdict_tx, verdict_rx) = mpsc::unbounded_channel();
        drop(tokio::spawn(run_worker(config, rx, verdict_tx)));
        (Self { tx }, verdict_rx)
    }

    /// Ask for a retry decision after a failure in `generation`.
    ///
    /// Ignored entirely when `generation` is not the active one.
    pub fn schedule_retry(&self, error: SseError, generation: u64) {
        let _ = self.tx.send(RetryCommand::Schedule { error, generation });
    }

    /// Zero the attempt counter for `generation` (on successful reconnect).
    ///
    /// Generation-guarded like [`schedule_retry`](Self::schedule_retry).
    pub fn reset_retry_state(&self, generation: u64) {
        let _ = self.tx.send(RetryCommand::Reset { generation });
    }

    /// Move to a new generation, invalidating pending stale callers.
    pub fn advance_generation(&self, generation: u64) {
        let _ = self.tx.send(RetryCommand::Advance { generation });
    }
}

async fn run_worker(
    config: RetryPolicyConfig,
    mut rx: mpsc::UnboundedReceiver<RetryCommand>,
    verdicts: mpsc::UnboundedSender<RetryVerdict>,
) {
    let mut current_generation: u64 = 0;
    let mut attempts: u32 = 0;
    let mut exhausted = false;

    while let Some(command) = rx.recv().await {
        match command {
            RetryCommand::Advance { generation } => {
                if generation > current_generation {
                    debug!(generation, "retry policy advanced to new generation");
                    current_generation = generation;
                    attempts = 0;
                    exhausted = false;
                }
            }
            RetryCommand::Reset { generation } => {
                if generation == current_generation {
                    debug!(generation, "retry state reset");
                    attempts = 0;
                    exhausted = false;
                } else {
                    debug!(
                        generation,
                        current_generation, "ignoring reset for stale generation"
                    );
                }
            }
            RetryCommand::Schedule { error, generation } => {
                if generation != current_generation {
                    debug!(
                        generation,
                        current_generation, "ignoring retry request for stale generation"
                    );
                    continue;
                }

                if !error.should_retry() {
                    warn!(error = %error, category = error.category(), "error is not retryable");
                    let _ = verdicts.send(RetryVerdict {
                        decision: RetryDecision::RetryNotPossible,
                        generation,
                    });
                    continue;
                }

                if exhausted {
                    debug!(generation, "retry budget already exhausted");
                    continue;
                }

                attempts += 1;
                if attempts > config.max_retry_count {
                    warn!(
                        generation,
                        max_retry_count = config.max_retry_count,
                        "max retries reached"
                    );
                    exhausted = true;
                    let _ = verdicts.send(RetryVerdict {
                        decision: RetryDecision::MaxRetriesReached,
                        generation,
                    });
                    continue;
                }

                // First attempt retries immediately; later attempts wait the
                // fixed delay. Sleeping inline keeps decisions strictly ordered.
                if attempts > 1 {
                    tokio::time::sleep(config.retry_delay).await;
                }

                debug!(generation, attempt = attempts, "retrying connection");
                let _ = verdicts.send(RetryVerdict {
                    decision: RetryDecision::RetryNow { attempt: attempts },
                    generation,
                });
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
