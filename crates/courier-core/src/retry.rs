//! Retry decisions and default backoff constants.
//!
//! The portable, sync-only building blocks live here; the generation-tracked
//! retry worker that executes them lives in `courier-stream` (which has
//! access to tokio).

/// Default maximum number of retry attempts per connection episode.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 3;
/// Default fixed delay before attempts 2+ in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

/// Outcome of asking the retry policy what to do after a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect now; the policy has already applied the attempt's delay.
    RetryNow {
        /// 1-based attempt number within the current episode.
        attempt: u32,
    },
    /// The retry budget for this episode is exhausted.
    MaxRetriesReached,
    /// The error is not retryable; do not attempt to reconnect.
    RetryNotPossible,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
