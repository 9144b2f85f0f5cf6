//! # Heartbeat watchdog
//!
//! A single-deadline timer that declares the connection dead when no
//! liveness signal arrives in time. Expiry delivers the generation that was
//! active at schedule time on an mpsc channel; the consumer compares it
//! against its own current generation.
//!
//! Stale-generation rules:
//! - [`HeartbeatWatchdog::start_timer`] always replaces the pending timer
//! - [`HeartbeatWatchdog::reset`] cancels only when the pending timer's
//!   generation matches; a reset for an older/foreign generation is a no-op
//!   and the timer still fires with its original generation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Default heartbeat interval assumed before the server advertises its own.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Grace buffer added on top of the heartbeat interval.
pub const HEARTBEAT_BUFFER: Duration = Duration::from_secs(5);

/// The initial deadline used before any server-advertised interval: default
/// interval plus buffer (35s).
#[must_use]
pub fn default_initial_timeout() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL + HEARTBEAT_BUFFER
}

struct ScheduledTimer {
    timer_id: u64,
    generation: u64,
    handle: tokio::task::JoinHandle<()>,
}

/// Generation-guarded deadline timer.
pub struct HeartbeatWatchdog {
    expired: mpsc::UnboundedSender<u64>,
    pending: Arc<Mutex<Option<ScheduledTimer>>>,
    next_timer_id: AtomicU64,
}

impl HeartbeatWatchdog {
    /// Create a watchdog and the channel on which expirations (tagged with
    /// their scheduling generation) are delivered.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                expired: tx,
                pending: Arc::new(Mutex::new(None)),
                next_timer_id: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Cancel any prior timer and start a new deadline for `generation`.
    pub fn start_timer(&self, timeout: Duration, generation: u64) {
        let timer_id = self.next_timer_id.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = Arc::clone(&self.pending);
        let expired = self.expired.clone();

        let mut guard = self.pending.lock();
        if let Some(prev) = guard.take() {
            prev.handle.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // Fire only if this timer is still the scheduled one
            let fire = {
                let mut guard = pending.lock();
                if guard.as_ref().is_some_and(|t| t.timer_id == timer_id) {
                    *guard = None;
                    true
                } else {
                    false
                }
            };
            if fire {
                debug!(generation, "heartbeat deadline expired");
                let _ = expired.send(generation);
            }
        });

        debug!(generation, ?timeout, "heartbeat timer started");
        *guard = Some(ScheduledTimer {
            timer_id,
            generation,
            handle,
        });
    }

    /// Cancel the pending timer, but only if it belongs to `generation`.
    pub fn reset(&self, generation: u64) {
        let mut guard = self.pending.lock();
        match guard.as_ref() {
            Some(timer) if timer.generation == generation => {
                if let Some(timer) = guard.take() {
                    timer.handle.abort();
                }
                debug!(generation, "heartbeat timer reset");
            }
            Some(timer) => {
                debug!(
                    generation,
                    pending_generation = timer.generation,
                    "ignoring heartbeat reset for stale generation"
                );
            }
            None => {}
        }
    }

    /// Cancel the pending timer unconditionally (connection teardown).
    pub fn cancel(&self) {
        if let Some(timer) = self.pending.lock().take() {
            timer.handle.abort();
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
    fn initial_timeout_is_interval_plus_buffer() {
        assert_eq!(default_initial_timeout(), Duration::from_secs(35));
    }

    #[tokio::test]
    async fn timer_fires_with_scheduled_generation() {
        let (watchdog, mut expired) = HeartbeatWatchdog::new();
        watchdog.start_timer(Duration::from_millis(10), 7);
        assert_eq!(expired.recv().await, Some(7));
    }

    #[tokio::test]
    async fn matching_reset_cancels() {
        let (watchdog, mut expired) = HeartbeatWatchdog::new();
        watchdog.start_timer(Duration::from_millis(20), 1);
        watchdog.reset(1);

        let fired = tokio::time::timeout(Duration::from_millis(80), expired.recv()).await;
        assert!(fired.is_err(), "cancelled timer must not fire");
    }

    #[tokio::test]
    async fn stale_reset_is_ignored_and_timer_still_fires() {
        let (watchdog, mut expired) = HeartbeatWatchdog::new();
        watchdog.start_timer(Duration::from_millis(20), 2);
        watchdog.reset(1); // stale generation

        // The timer still fires, tagged with its original generation
        assert_eq!(expired.recv().await, Some(2));
    }

    #[tokio::test]
    async fn start_timer_replaces_pending() {
        let (watchdog, mut expired) = HeartbeatWatchdog::new();
        watchdog.start_timer(Duration::from_millis(10), 1);
        watchdog.start_timer(Duration::from_millis(30), 2);

        // Only the replacement fires
        assert_eq!(expired.recv().await, Some(2));
        let extra = tokio::time::timeout(Duration::from_millis(40), expired.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn cancel_drops_timer_unconditionally() {
        let (watchdog, mut expired) = HeartbeatWatchdog::new();
        watchdog.start_timer(Duration::from_millis(10), 5);
        watchdog.cancel();

        let fired = tokio::time::timeout(Duration::from_millis(50), expired.recv()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn reset_without_pending_timer_is_noop() {
        let (watchdog, _expired) = HeartbeatWatchdog::new();
        watchdog.reset(1); // must not panic
        watchdog.cancel();
    }
}
