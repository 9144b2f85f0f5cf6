//! # Eligibility engine
//!
//! Decides whether an anonymous (broadcast) message may currently be shown,
//! based on four gates: batch TTL, dismissal, post-show delay window, and
//! frequency cap. State lives in the injected key/value store:
//!
//! - the anonymous message batch itself (JSON array)
//! - the batch expiry (epoch milliseconds, `now >= expiry` means expired —
//!   the boundary is inclusive)
//! - the per-message tracking map (`{"tracking": {messageId: {...}}}`)
//!
//! The engine never errors: malformed persisted state reads as "no data" and
//! a message with invalid frequency rules simply isn't anonymous.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use courier_core::{Clock, KeyValueStore, Message, MessagesTrackingData};

/// Key holding the anonymous message batch (JSON array).
const KEY_ANONYMOUS_MESSAGES: &str = "courier.anonymousMessages";
/// Key holding the batch expiry in epoch milliseconds.
const KEY_ANONYMOUS_EXPIRY: &str = "courier.anonymousMessagesExpiry";
/// Key holding the tracking map.
const KEY_TRACKING: &str = "courier.messagesTracking";

/// How long an anonymous batch stays valid (60 minutes).
pub const DEFAULT_ANONYMOUS_TTL_MS: u64 = 60 * 60 * 1000;

/// Frequency-capping and TTL gate for anonymous messages.
pub struct EligibilityEngine {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
}

impl EligibilityEngine {
    /// Create an engine with the default 60-minute batch TTL.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(kv, clock, DEFAULT_ANONYMOUS_TTL_MS)
    }

    /// Create an engine with a custom batch TTL.
    #[must_use]
    pub fn with_ttl(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        Self { kv, clock, ttl_ms }
    }

    /// Create an engine with the TTL configured in
    /// `inbox.anonymousTtlMinutes`.
    #[must_use]
    pub fn from_settings(
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: &courier_settings::CourierSettings,
    ) -> Self {
        Self::with_ttl(kv, clock, settings.inbox.anonymous_ttl_minutes * 60 * 1000)
    }

    /// Whether the message may be shown right now.
    ///
    /// The batch TTL gate applies to every call, anonymous or not — an
    /// expired (or never-received) batch makes everything ineligible. Past
    /// that gate, non-anonymous messages (no valid frequency block) are
    /// always eligible; anonymous ones also pass through the dismissal,
    /// delay, and frequency-cap gates in that order.
    #[must_use]
    pub fn is_eligible(&self, message: &Message) -> bool {
        if self.batch_expired() {
            return false;
        }

        let Some(frequency) = message.broadcast_frequency() else {
            return true;
        };

        let tracking = self.tracking();
        let Some(entry) = tracking.tracking.get(&message.message_id) else {
            // Never shown, never dismissed
            return true;
        };

        if entry.dismissed && !frequency.ignore_dismiss {
            return false;
        }

        if let Some(next_show_time) = entry.next_show_time {
            #[allow(clippy::cast_precision_loss)]
            if (self.clock.now_ms() as f64) < next_show_time {
                return false;
            }
        }

        // count == 0 means unlimited
        if frequency.count != 0 && entry.times_shown >= frequency.count {
            return false;
        }

        true
    }

    /// Record one display of the message.
    ///
    /// A `count == 1` message is dismissed permanently after its single show
    /// (one-shot semantics); otherwise a positive delay opens a suppression
    /// window until `now + delay`.
    pub fn mark_as_seen(&self, message_id: &str) {
        let Some(frequency) = self.stored_frequency(message_id) else {
            debug!(message_id, "mark_as_seen for untracked message ignored");
            return;
        };

        let mut tracking = self.tracking();
        let entry = tracking.tracking.entry(message_id.to_string()).or_default();
        entry.times_shown += 1;

        if frequency.count == 1 {
            entry.dismissed = true;
        } else if frequency.delay_seconds > 0 {
            #[allow(clippy::cast_precision_loss)]
            let next = (self.clock.now_ms() + frequency.delay_seconds * 1000) as f64;
            entry.next_show_time = Some(next);
        }

        debug!(
            message_id,
            times_shown = entry.times_shown,
            dismissed = entry.dismissed,
            "message seen"
        );
        self.save_tracking(&tracking);
    }

    /// Record a user dismissal. A no-op when the message's frequency rules
    /// set `ignoreDismiss`.
    pub fn mark_as_dismissed(&self, message_id: &str) {
        let Some(frequency) = self.stored_frequency(message_id) else {
            debug!(message_id, "mark_as_dismissed for untracked message ignored");
            return;
        };
        if frequency.ignore_dismiss {
            debug!(message_id, "dismissal ignored per frequency rules");
            return;
        }

        let mut tracking = self.tracking();
        tracking
            .tracking
            .entry(message_id.to_string())
            .or_default()
            .dismissed = true;
        self.save_tracking(&tracking);
    }

    /// Ingest a fresh server batch.
    ///
    /// A batch with no anonymous messages resets all anonymous state. A
    /// non-empty batch replaces the stored one, restarts the TTL, and
    /// garbage-collects tracking entries whose ids are no longer present.
    pub fn update_from_batch(&self, messages: &[Message]) {
        let anonymous: Vec<Message> = messages
            .iter()
            .filter(|m| m.is_anonymous())
            .cloned()
            .collect();

        if anonymous.is_empty() {
            debug!("no anonymous messages in batch, clearing anonymous state");
            self.clear_all_anonymous_data();
            return;
        }

        let current_ids: HashSet<&str> =
            anonymous.iter().map(|m| m.message_id.as_str()).collect();
        let mut tracking = self.tracking();
        tracking
            .tracking
            .retain(|id, _| current_ids.contains(id.as_str()));
        self.save_tracking(&tracking);

        match serde_json::to_string(&anonymous) {
            Ok(encoded) => {
                self.kv.set_string(KEY_ANONYMOUS_MESSAGES, &encoded);
                #[allow(clippy::cast_precision_loss)]
                let expiry = (self.clock.now_ms() + self.ttl_ms) as f64;
                self.kv.set_double(KEY_ANONYMOUS_EXPIRY, expiry);
                debug!(count = anonymous.len(), "anonymous batch stored");
            }
            Err(err) => warn!(error = %err, "failed to serialize anonymous batch"),
        }
    }

    /// The stored anonymous messages that currently pass all gates.
    #[must_use]
    pub fn eligible_messages(&self) -> Vec<Message> {
        self.stored_messages()
            .into_iter()
            .filter(|m| self.is_eligible(m))
            .collect()
    }

    /// Drop the batch, its expiry, and all tracking state.
    pub fn clear_all_anonymous_data(&self) {
        self.kv.remove(KEY_ANONYMOUS_MESSAGES);
        self.kv.remove(KEY_ANONYMOUS_EXPIRY);
        self.kv.remove(KEY_TRACKING);
    }

    /// Whether the stored batch has outlived its TTL. A missing expiry stamp
    /// counts as expired.
    fn batch_expired(&self) -> bool {
        let Some(expiry) = self.kv.double(KEY_ANONYMOUS_EXPIRY) else {
            return true;
        };
        #[allow(clippy::cast_precision_loss)]
        let now = self.clock.now_ms() as f64;
        now >= expiry
    }

    fn stored_messages(&self) -> Vec<Message> {
        let Some(encoded) = self.kv.string(KEY_ANONYMOUS_MESSAGES) else {
            return Vec::new();
        };
        serde_json::from_str(&encoded).unwrap_or_else(|err| {
            warn!(error = %err, "stored anonymous batch is corrupt");
            Vec::new()
        })
    }

    fn stored_frequency(&self, message_id: &str) -> Option<courier_core::BroadcastFrequency> {
        self.stored_messages()
            .iter()
            .find(|m| m.message_id == message_id)
            .and_then(Message::broadcast_frequency)
    }

    fn tracking(&self) -> MessagesTrackingData {
        let Some(encoded) = self.kv.string(KEY_TRACKING) else {
            return MessagesTrackingData::default();
        };
        serde_json::from_str(&encoded).unwrap_or_else(|err| {
            warn!(error = %err, "stored tracking data is corrupt");
            MessagesTrackingData::default()
        })
    }

    fn save_tracking(&self, tracking: &MessagesTrackingData) {
        match serde_json::to_string(tracking) {
            Ok(encoded) => self.kv.set_string(KEY_TRACKING, &encoded),
            Err(err) => warn!(error = %err, "failed to serialize tracking data"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ManualClock, MemoryKeyValueStore};
    use serde_json::json;

    const MINUTE_MS: u64 = 60 * 1000;

    fn anonymous_message(id: &str, count: i64, delay: i64, ignore_dismiss: bool) -> Message {
        Message {
            message_id: id.to_string(),
            queue_id: Some(format!("q-{id}")),
            priority: Some(1),
            properties: json!({
                "broadcast": {
                    "frequency": {
                        "count": count,
                        "delay": delay,
                        "ignoreDismiss": ignore_dismiss,
                    }
                }
            })
            .as_object()
            .cloned()
            .unwrap(),
        }
    }

    fn engine_at(now_ms: u64) -> (EligibilityEngine, Arc<ManualClock>) {
        let clock = ManualClock::starting_at(now_ms);
        let engine = EligibilityEngine::new(
            Arc::new(MemoryKeyValueStore::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (engine, clock)
    }

    // ── Frequency gates ──────────────────────────────────────────────────

    #[test]
    fn one_shot_message_ineligible_after_single_show() {
        let (engine, _clock) = engine_at(1_000_000);
        let msg = anonymous_message("m1", 1, 0, false);
        engine.update_from_batch(std::slice::from_ref(&msg));

        assert!(engine.is_eligible(&msg));
        engine.mark_as_seen("m1");
        assert!(!engine.is_eligible(&msg));
    }

    #[test]
    fn unlimited_message_with_delay_window() {
        let (engine, clock) = engine_at(1_000_000);
        let msg = anonymous_message("m1", 0, 30, false);
        engine.update_from_batch(std::slice::from_ref(&msg));

        assert!(engine.is_eligible(&msg));
        engine.mark_as_seen("m1");

        clock.advance(20 * 1000);
        assert!(!engine.is_eligible(&msg), "still inside the delay window");

        clock.advance(11 * 1000);
        assert!(engine.is_eligible(&msg), "window elapsed at t+31s");
    }

    #[test]
    fn count_cap_blocks_after_limit() {
        let (engine, _clock) = engine_at(1_000_000);
        let msg = anonymous_message("m1", 2, 0, false);
        engine.update_from_batch(std::slice::from_ref(&msg));

        engine.mark_as_seen("m1");
        assert!(engine.is_eligible(&msg), "one of two shows used");
        engine.mark_as_seen("m1");
        assert!(!engine.is_eligible(&msg), "cap reached");
    }

    #[test]
    fn unlimited_count_never_caps() {
        let (engine, _clock) = engine_at(1_000_000);
        let msg = anonymous_message("m1", 0, 0, false);
        engine.update_from_batch(std::slice::from_ref(&msg));

        for _ in 0..5 {
            engine.mark_as_seen("m1");
        }
        assert!(engine.is_eligible(&msg));
    }

    // ── Batch TTL ────────────────────────────────────────────────────────

    #[test]
    fn batch_ttl_boundary_is_inclusive() {
        let (engine, clock) = engine_at(1_000_000);
        let msg = anonymous_message("m1", 0, 0, false);
        engine.update_from_batch(std::slice::from_ref(&msg));

        clock.advance(59 * MINUTE_MS);
        assert!(engine.is_eligible(&msg), "eligible at +59min");

        clock.advance(MINUTE_MS);
        assert!(!engine.is_eligible(&msg), "expired at exactly +60min");

        clock.advance(MINUTE_MS);
        assert!(!engine.is_eligible(&msg), "and beyond");
    }

    #[test]
    fn ttl_gate_applies_to_non_anonymous_messages_too() {
        let (engine, clock) = engine_at(1_000_000);
        let broadcast = anonymous_message("m1", 0, 0, false);
        let plain = Message::new("m2");
        engine.update_from_batch(std::slice::from_ref(&broadcast));

        assert!(engine.is_eligible(&plain), "fresh batch, no gates apply");
        clock.advance(60 * MINUTE_MS);
        assert!(!engine.is_eligible(&plain), "the batch ttl gates every call");
    }

    #[test]
    fn ttl_follows_configured_settings() {
        let mut settings = courier_settings::CourierSettings::default();
        settings.inbox.anonymous_ttl_minutes = 1;

        let clock = ManualClock::starting_at(1_000_000);
        let engine = EligibilityEngine::from_settings(
            Arc::new(MemoryKeyValueStore::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            &settings,
        );
        let msg = anonymous_message("m1", 0, 0, false);
        engine.update_from_batch(std::slice::from_ref(&msg));

        clock.advance(59 * 1000);
        assert!(engine.is_eligible(&msg));
        clock.advance(1000);
        assert!(!engine.is_eligible(&msg), "expired at the configured minute");
    }

    #[test]
    fn missing_expiry_counts_as_expired() {
        let (engine, _clock) = engine_at(1_000_000);
        let msg = anonymous_message("m1", 0, 0, false);
        // Never ingested a batch, so no expiry stamp exists
        assert!(!engine.is_eligible(&msg));
    }

    #[test]
    fn fresh_batch_restarts_ttl() {
        let (engine, clock) = engine_at(1_000_000);
        let msg = anonymous_message("m1", 0, 0, false);
        engine.update_from_batch(std::slice::from_ref(&msg));

        clock.advance(59 * MINUTE_MS);
        engine.update_from_batch(std::slice::from_ref(&msg));

        clock.advance(59 * MINUTE_MS);
        assert!(engine.is_eligible(&msg), "ttl measured from latest batch");
    }

    // ── Dismissal ────────────────────────────────────────────────────────

    #[test]
    fn dismissal_blocks_unless_ignored() {
        let (engine, _clock) = engine_at(1_000_000);
        let honored = anonymous_message("m1", 0, 0, false);
        let ignored = anonymous_message("m2", 0, 0, true);
        engine.update_from_batch(&[honored.clone(), ignored.clone()]);

        engine.mark_as_dismissed("m1");
        engine.mark_as_dismissed("m2");

        assert!(!engine.is_eligible(&honored));
        assert!(engine.is_eligible(&ignored), "ignoreDismiss keeps it eligible");
    }

    // ── Invalid frequency data ───────────────────────────────────────────

    #[test]
    fn negative_count_demotes_to_non_anonymous() {
        let (engine, _clock) = engine_at(1_000_000);
        let valid = anonymous_message("m1", 1, 0, false);
        let invalid = anonymous_message("m2", -1, 0, false);
        engine.update_from_batch(&[valid.clone(), invalid.clone()]);

        // The invalid one is not stored as anonymous and bypasses all gates
        assert!(engine.is_eligible(&invalid));
        let stored_ids: Vec<String> = engine
            .stored_messages()
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(stored_ids, vec!["m1"]);
    }

    // ── Batch lifecycle ──────────────────────────────────────────────────

    #[test]
    fn empty_batch_clears_all_anonymous_state() {
        let (engine, _clock) = engine_at(1_000_000);
        let msg = anonymous_message("m1", 1, 0, false);
        engine.update_from_batch(std::slice::from_ref(&msg));
        engine.mark_as_seen("m1");

        engine.update_from_batch(&[]);
        assert!(engine.stored_messages().is_empty());
        assert!(engine.tracking().tracking.is_empty());
    }

    #[test]
    fn tracking_garbage_collected_for_absent_ids() {
        let (engine, _clock) = engine_at(1_000_000);
        let m1 = anonymous_message("m1", 2, 0, false);
        let m2 = anonymous_message("m2", 2, 0, false);
        engine.update_from_batch(&[m1.clone(), m2.clone()]);
        engine.mark_as_seen("m1");
        engine.mark_as_seen("m2");

        // m1 disappears from the next batch; its tracking goes with it
        let m3 = anonymous_message("m3", 2, 0, false);
        engine.update_from_batch(&[m2.clone(), m3]);

        let tracking = engine.tracking();
        assert!(!tracking.tracking.contains_key("m1"));
        assert_eq!(tracking.tracking["m2"].times_shown, 1);
    }

    #[test]
    fn tracking_continuity_across_batches() {
        let (engine, _clock) = engine_at(1_000_000);
        let msg = anonymous_message("m1", 2, 0, false);
        engine.update_from_batch(std::slice::from_ref(&msg));
        engine.mark_as_seen("m1");

        engine.update_from_batch(std::slice::from_ref(&msg));
        engine.mark_as_seen("m1");
        assert!(!engine.is_eligible(&msg), "shows accumulate across batches");
    }

    // ── Queries ──────────────────────────────────────────────────────────

    #[test]
    fn eligible_messages_filters_stored_batch() {
        let (engine, _clock) = engine_at(1_000_000);
        let once = anonymous_message("m1", 1, 0, false);
        let open = anonymous_message("m2", 0, 0, false);
        engine.update_from_batch(&[once, open]);
        engine.mark_as_seen("m1");

        let eligible: Vec<String> = engine
            .eligible_messages()
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(eligible, vec!["m2"]);
    }

    #[test]
    fn marks_for_unknown_ids_are_ignored() {
        let (engine, _clock) = engine_at(1_000_000);
        engine.mark_as_seen("ghost");
        engine.mark_as_dismissed("ghost");
        assert!(engine.tracking().tracking.is_empty());
    }

    #[test]
    fn corrupt_stored_state_reads_as_empty() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set_string(KEY_ANONYMOUS_MESSAGES, "{corrupt");
        kv.set_string(KEY_TRACKING, "also corrupt");
        let clock = ManualClock::starting_at(1_000_000);
        let engine = EligibilityEngine::new(kv, clock);

        assert!(engine.stored_messages().is_empty());
        assert!(engine.tracking().tracking.is_empty());
    }
}
