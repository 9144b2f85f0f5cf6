//! # Message queue
//!
//! Local store for the server's message list. The server is the single
//! source of truth: every full fetch replaces the store wholesale
//! (clear-then-insert), since partial merges risk resurrecting revoked
//! messages. Queries never mutate — a message whose page rule doesn't match
//! the current route stays in the queue for re-evaluation on the next
//! route change.

use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, warn};

use courier_core::Message;

/// Priority used for sorting when a message carries none; sorts last.
const UNRANKED_PRIORITY: i64 = i64::MAX;

/// Replace-on-fetch store of the current message list.
#[derive(Default)]
pub struct MessageQueue {
    messages: RwLock<Vec<Message>>,
}

impl MessageQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored list with a fresh server batch.
    ///
    /// Duplicate queue ids within one batch keep their first occurrence;
    /// messages without a queue id are never deduplicated.
    pub fn add_messages(&self, batch: Vec<Message>) {
        let mut seen_queue_ids = std::collections::HashSet::new();
        let deduped: Vec<Message> = batch
            .into_iter()
            .filter(|message| match &message.queue_id {
                Some(queue_id) => seen_queue_ids.insert(queue_id.clone()),
                None => true,
            })
            .collect();

        debug!(count = deduped.len(), "message queue replaced");
        *self.messages.write() = deduped;
    }

    /// Snapshot of the stored list, in server order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Whether the queue holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Inline messages targeting the given element, sorted ascending by
    /// priority with unranked messages last.
    #[must_use]
    pub fn inline_messages(&self, element_id: &str) -> Vec<Message> {
        let mut matching: Vec<Message> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.element_id() == Some(element_id))
            .cloned()
            .collect();
        matching.sort_by_key(|m| m.priority.unwrap_or(UNRANKED_PRIORITY));
        matching
    }

    /// Messages displayable on the given route.
    ///
    /// A message with no page rule is always displayable; one with a rule is
    /// displayable only when the rule fully matches the route. Non-matching
    /// messages are retained in the queue, just not returned here.
    #[must_use]
    pub fn displayable_messages(&self, route: &str) -> Vec<Message> {
        self.messages
            .read()
            .iter()
            .filter(|m| Self::matches_route(m, route))
            .cloned()
            .collect()
    }

    fn matches_route(message: &Message, route: &str) -> bool {
        let Some(rule) = message.page_rule() else {
            return true;
        };
        // Anchor both ends: the rule must describe the whole route
        match Regex::new(&format!("^{rule}$")) {
            Ok(pattern) => pattern.is_match(route),
            Err(err) => {
                warn!(
                    message_id = message.message_id,
                    rule,
                    error = %err,
                    "invalid page rule"
                );
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(queue_id: &str, priority: Option<i64>, properties: serde_json::Value) -> Message {
        Message {
            message_id: format!("msg-{queue_id}"),
            queue_id: Some(queue_id.to_string()),
            priority,
            properties: properties.as_object().cloned().unwrap_or_default(),
        }
    }

    // ── Replacement semantics ────────────────────────────────────────────

    #[test]
    fn add_messages_replaces_wholesale() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![message("q1", Some(1), json!({}))]);
        queue.add_messages(vec![message("q2", Some(1), json!({}))]);

        let stored = queue.messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].queue_id.as_deref(), Some("q2"));
    }

    #[test]
    fn empty_batch_clears_queue() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![message("q1", Some(1), json!({}))]);
        queue.add_messages(Vec::new());
        assert!(queue.is_empty());
    }

    #[test]
    fn duplicate_queue_ids_keep_first() {
        let queue = MessageQueue::new();
        let mut first = message("q1", Some(1), json!({}));
        first.message_id = "original".into();
        let mut dup = message("q1", Some(2), json!({}));
        dup.message_id = "duplicate".into();

        queue.add_messages(vec![first, dup]);
        let stored = queue.messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message_id, "original");
    }

    #[test]
    fn messages_without_queue_id_are_not_deduplicated() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![Message::new("a"), Message::new("b")]);
        assert_eq!(queue.len(), 2);
    }

    // ── Inline queries ───────────────────────────────────────────────────

    #[test]
    fn inline_messages_filter_by_element_and_sort_by_priority() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![
            message("q1", Some(5), json!({"elementId": "banner"})),
            message("q2", Some(1), json!({"elementId": "banner"})),
            message("q3", Some(1), json!({"elementId": "sidebar"})),
            message("q4", None, json!({})),
        ]);

        let inline: Vec<Option<String>> = queue
            .inline_messages("banner")
            .into_iter()
            .map(|m| m.queue_id)
            .collect();
        assert_eq!(inline, vec![Some("q2".into()), Some("q1".into())]);
    }

    #[test]
    fn nil_priority_sorts_last() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![
            message("unranked", None, json!({"elementId": "banner"})),
            message("ranked", Some(9), json!({"elementId": "banner"})),
        ]);

        let inline = queue.inline_messages("banner");
        assert_eq!(inline[0].queue_id.as_deref(), Some("ranked"));
        assert_eq!(inline[1].queue_id.as_deref(), Some("unranked"));
    }

    // ── Page rules ───────────────────────────────────────────────────────

    #[test]
    fn no_rule_is_always_displayable() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![message("q1", Some(1), json!({}))]);
        assert_eq!(queue.displayable_messages("/anywhere").len(), 1);
    }

    #[test]
    fn rule_must_match_whole_route() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![message("q1", Some(1), json!({"routeRule": "settings/.*"}))]);

        assert_eq!(queue.displayable_messages("settings/profile").len(), 1);
        assert!(queue.displayable_messages("home").is_empty());
        // Partial match is not enough
        assert!(queue.displayable_messages("app/settings/profile").is_empty());
    }

    #[test]
    fn non_matching_messages_are_retained() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![message("q1", Some(1), json!({"routeRule": "home"}))]);

        assert!(queue.displayable_messages("settings").is_empty());
        // Still in the queue, displayable once the route changes
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.displayable_messages("home").len(), 1);
    }

    #[test]
    fn invalid_rule_is_never_displayable() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![message("q1", Some(1), json!({"routeRule": "([unclosed"}))]);
        assert!(queue.displayable_messages("anything").is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn empty_rule_counts_as_no_rule() {
        let queue = MessageQueue::new();
        queue.add_messages(vec![message("q1", Some(1), json!({"routeRule": ""}))]);
        assert_eq!(queue.displayable_messages("any/route").len(), 1);
    }
}
