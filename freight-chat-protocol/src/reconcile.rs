//! Message Reconciler
//!
//! Merges REST history with live pushes into one deduplicated,
//! time-ordered sequence. The merge is a pure function of its two inputs and
//! is recomputed whenever either side changes.
//!
//! ## Deduplication keys
//!
//! - a message with a persisted id is a duplicate when that id was seen
//! - any other message is a duplicate when its content key matches a kept
//!   persisted message or an earlier id-less message
//!
//! The content key is `(sender, content, first 19 chars of timestamp)`,
//! which is the timestamp truncated to whole seconds. An optimistic live
//! message collapses into its persisted echo wherever the echo sits in the
//! input, so merging an already merged list changes nothing. Two distinct
//! id-less messages with the same sender and text inside one second are
//! merged as well, since no client nonce exists on the wire.
//!
//! ## Ordering
//!
//! Ascending by parsed timestamp, stable for ties. Timestamps that cannot be
//! parsed sort after all parseable ones, in insertion order.

use crate::message::{ChatMessage, HistoryRecord, MessageId};
use std::collections::HashSet;

/// Length of `YYYY-MM-DDTHH:MM:SS`
const SECOND_PRECISION_LEN: usize = 19;

type ContentKey = (String, String, String);

fn content_key(message: &ChatMessage) -> ContentKey {
    (
        message.sender.clone(),
        message.content.clone(),
        truncate_to_seconds(&message.timestamp).to_string(),
    )
}

fn persisted_id(message: &ChatMessage) -> Option<&str> {
    message
        .id
        .as_ref()
        .filter(|id| id.is_persisted())
        .map(MessageId::as_str)
}

/// Cut an ISO-8601 timestamp down to whole-second precision
pub fn truncate_to_seconds(timestamp: &str) -> &str {
    match timestamp.char_indices().nth(SECOND_PRECISION_LEN) {
        Some((index, _)) => &timestamp[..index],
        None => timestamp,
    }
}

/// Drop duplicates, first occurrence wins
///
/// Persisted messages are settled first so that their content keys are
/// known before any id-less message is judged.
pub fn dedup(messages: impl IntoIterator<Item = ChatMessage>) -> Vec<ChatMessage> {
    let mut ids = HashSet::new();
    let mut persisted_keys = HashSet::new();
    let mut candidates = Vec::new();

    for message in messages {
        if let Some(id) = persisted_id(&message) {
            if !ids.insert(id.to_string()) {
                continue;
            }
            persisted_keys.insert(content_key(&message));
        }
        candidates.push(message);
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|message| {
            if persisted_id(message).is_some() {
                return true;
            }
            let key = content_key(message);
            !persisted_keys.contains(&key) && seen.insert(key)
        })
        .collect()
}

/// Stable ascending sort by parsed timestamp
pub fn sort_by_timestamp(messages: &mut [ChatMessage]) {
    messages.sort_by_cached_key(|message| {
        let parsed = message.parsed_timestamp();
        (parsed.is_none(), parsed)
    });
}

/// Merge already-normalized messages, historical first
pub fn merge_messages(historical: &[ChatMessage], live: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut merged = dedup(historical.iter().chain(live.iter()).cloned());
    sort_by_timestamp(&mut merged);
    merged
}

/// Merge raw REST history records with live messages
pub fn merge(history: &[HistoryRecord], live: &[ChatMessage]) -> Vec<ChatMessage> {
    let historical: Vec<ChatMessage> = history.iter().map(ChatMessage::from_history).collect();
    merge_messages(&historical, live)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ConversationId;

    const CONV: ConversationId = ConversationId(7);

    fn msg(sender: &str, content: &str, timestamp: &str) -> ChatMessage {
        ChatMessage::new(sender, content, timestamp, CONV)
    }

    #[test]
    fn test_history_echo_wins_over_live_copy() {
        let historical = vec![msg("Ali", "Merhaba", "2024-01-01T10:00:00").with_persisted_id("5")];
        let live = vec![msg("Ali", "Merhaba", "2024-01-01T10:00:00")];

        let merged = merge_messages(&historical, &live);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, Some(MessageId::Persisted("5".to_string())));
    }

    #[test]
    fn test_subsecond_difference_still_collapses() {
        let historical = vec![msg("Ali", "Selam", "2024-01-01T10:00:00.900").with_persisted_id("8")];
        let live = vec![msg("Ali", "Selam", "2024-01-01T10:00:00.100Z")];
        assert_eq!(merge_messages(&historical, &live).len(), 1);
    }

    #[test]
    fn test_distinct_persisted_ids_are_kept() {
        let historical = vec![
            msg("Ali", "ok", "2024-01-01T10:00:00").with_persisted_id("1"),
            msg("Ali", "ok", "2024-01-01T10:00:00").with_persisted_id("2"),
        ];
        assert_eq!(merge_messages(&historical, &[]).len(), 2);
    }

    #[test]
    fn test_same_persisted_id_from_both_sources() {
        let historical = vec![msg("Ali Yilmaz", "hi", "2024-01-01T10:00:00").with_persisted_id("3")];
        let live = vec![msg("Ali", "hi", "2024-01-01T10:00:01Z").with_persisted_id("3")];
        let merged = merge_messages(&historical, &live);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].sender, "Ali Yilmaz");
    }

    #[test]
    fn test_provisional_ids_use_content_key() {
        let mut live = msg("Ali", "hi", "2024-01-01T10:00:00Z");
        live.id = Some(MessageId::Provisional("1704103200000".to_string()));
        let historical = vec![msg("Ali", "hi", "2024-01-01T10:00:00").with_persisted_id("3")];
        assert_eq!(merge_messages(&historical, &[live]).len(), 1);
    }

    #[test]
    fn test_sorted_ascending_and_stable() {
        let live = vec![
            msg("B", "second", "2024-01-01T10:00:05Z"),
            msg("A", "tie-1", "2024-01-01T10:00:01Z"),
            msg("C", "tie-2", "2024-01-01T10:00:01Z"),
            msg("D", "first", "2024-01-01T09:59:00Z"),
        ];
        let merged = merge_messages(&[], &live);
        let contents: Vec<_> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "tie-1", "tie-2", "second"]);
    }

    #[test]
    fn test_unparseable_timestamps_sort_last() {
        let live = vec![
            msg("A", "broken", "not a date"),
            msg("B", "fine", "2024-01-01T10:00:00Z"),
        ];
        let merged = merge_messages(&[], &live);
        assert_eq!(merged[0].content, "fine");
        assert_eq!(merged[1].content, "broken");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let historical = vec![
            msg("Ali", "a", "2024-01-01T10:00:00").with_persisted_id("1"),
            msg("Veli", "b", "2024-01-01T10:00:02").with_persisted_id("2"),
        ];
        let live = vec![
            msg("Ali", "a", "2024-01-01T10:00:00.400Z"),
            msg("Veli", "c", "2024-01-01T10:00:01Z"),
            msg("Veli", "c", "2024-01-01T10:00:01.500Z"),
            msg("Ali", "a", "2024-01-01T10:00:00").with_persisted_id("1"),
        ];

        let once = merge_messages(&historical, &live);
        let twice = merge_messages(&once, &[]);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_live_echo_after_optimistic_copy() {
        let live = vec![
            msg("Ali", "hi", "2024-01-01T10:00:00.900Z"),
            msg("Ali", "hi", "2024-01-01T10:00:00.100Z").with_persisted_id("9"),
        ];

        let once = merge_messages(&[], &live);
        assert_eq!(once.len(), 1);
        assert_eq!(once[0].id, Some(MessageId::Persisted("9".to_string())));
        assert_eq!(merge_messages(&once, &[]), once);
    }

    #[test]
    fn test_duplicate_id_does_not_claim_content_key() {
        let live = vec![
            msg("Ali", "first", "2024-01-01T10:00:00Z").with_persisted_id("4"),
            msg("Ali", "second", "2024-01-01T10:00:01Z"),
            msg("Ali", "second", "2024-01-01T10:00:01Z").with_persisted_id("4"),
        ];

        let merged = merge_messages(&[], &live);
        let contents: Vec<_> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(merged[1].id, None);
    }

    #[test]
    fn test_merge_from_history_records() {
        let record: HistoryRecord = serde_json::from_value(serde_json::json!({
            "id": 5,
            "conversationId": 7,
            "content": "Merhaba",
            "createdAt": "2024-01-01T10:00:00",
            "sender": "Ali"
        }))
        .unwrap();
        let live = vec![msg("Ali", "Merhaba", "2024-01-01T10:00:00")];

        let merged = merge(&[record], &live);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id.as_ref().map(MessageId::as_str), Some("5"));
    }

    #[test]
    fn test_truncate_to_seconds() {
        assert_eq!(truncate_to_seconds("2024-01-01T10:00:00.123Z"), "2024-01-01T10:00:00");
        assert_eq!(truncate_to_seconds("2024-01-01"), "2024-01-01");
    }
}
