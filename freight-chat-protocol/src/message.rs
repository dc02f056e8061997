//! Chat message model
//!
//! Both message sources end up as [`ChatMessage`]:
//!
//! - REST history records ([`HistoryRecord`]) via [`ChatMessage::from_history`]
//! - live STOMP payloads via [`parse_live_payload`]
//!
//! ## Live payload
//!
//! ```json
//! {
//!     "id": "42",
//!     "sender": "Ali Yilmaz",
//!     "content": "Merhaba",
//!     "timestamp": "2024-01-01T10:00:00.000Z"
//! }
//! ```
//!
//! `id` and `timestamp` are optional. A missing `id` is replaced by a
//! provisional one, a missing `timestamp` by the receive time.
//!
//! ## Outbound payload
//!
//! ```json
//! { "content": "Merhaba", "timestamp": "2024-01-01T10:00:00.000Z" }
//! ```

use crate::{ChatError, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Display name used when a sender cannot be named
pub const UNKNOWN_SENDER: &str = "Kullanıcı";

/// Backend conversation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Message identifier
///
/// Only persisted identifiers are trusted for deduplication. A provisional
/// identifier is made up on receipt and never matches a REST record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Assigned by the backend
    Persisted(String),
    /// Inferred locally for a live payload without an id
    Provisional(String),
}

impl MessageId {
    /// Raw identifier text
    pub fn as_str(&self) -> &str {
        match self {
            MessageId::Persisted(id) | MessageId::Provisional(id) => id,
        }
    }

    /// Whether the backend assigned this identifier
    pub fn is_persisted(&self) -> bool {
        matches!(self, MessageId::Persisted(_))
    }

    /// Provisional identifier from the current time in milliseconds
    pub fn provisional_now() -> Self {
        MessageId::Provisional(Utc::now().timestamp_millis().to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single displayable chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Identifier, absent for optimistic messages that never got one
    pub id: Option<MessageId>,
    /// Sender display name
    pub sender: String,
    /// Message text
    pub content: String,
    /// ISO-8601 timestamp as received
    pub timestamp: String,
    /// Owning conversation
    pub conversation_id: ConversationId,
}

impl ChatMessage {
    /// Create a message without an identifier
    pub fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: impl Into<String>,
        conversation_id: ConversationId,
    ) -> Self {
        Self {
            id: None,
            sender: sender.into(),
            content: content.into(),
            timestamp: timestamp.into(),
            conversation_id,
        }
    }

    /// Attach a persisted identifier
    pub fn with_persisted_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(MessageId::Persisted(id.into()));
        self
    }

    /// Normalize a REST history record
    pub fn from_history(record: &HistoryRecord) -> Self {
        Self {
            id: record.id.clone().map(MessageId::Persisted),
            sender: record.display_name(),
            content: record.content.clone(),
            timestamp: record.created_at.clone(),
            conversation_id: record.conversation_id,
        }
    }

    /// Parsed timestamp, if the text is a recognizable ISO-8601 value
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// Persisted message record returned by the REST backend
///
/// Every field decodes leniently: a `null` or mistyped value becomes the
/// field's default instead of failing the whole history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Backend message id, numeric or string on the wire
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    /// Owning conversation
    #[serde(default = "default_conversation", deserialize_with = "lenient_conversation")]
    pub conversation_id: ConversationId,
    /// Sender user id
    #[serde(default, deserialize_with = "lenient_number")]
    pub sender_id: Option<i64>,
    /// Message text
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: String,
    /// Creation time
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: String,
    /// Read flag
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_read: Option<bool>,
    /// Sender first name
    #[serde(default, deserialize_with = "lenient_text")]
    pub sender_first_name: Option<String>,
    /// Sender last name
    #[serde(default, deserialize_with = "lenient_text")]
    pub sender_last_name: Option<String>,
    /// Sender email
    #[serde(default, deserialize_with = "lenient_text")]
    pub sender_email: Option<String>,
    /// Raw sender label, sent by some backend versions
    #[serde(default, deserialize_with = "lenient_text")]
    pub sender: Option<String>,
}

fn default_conversation() -> ConversationId {
    ConversationId(0)
}

fn lenient_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    lenient_text(deserializer).map(Option::unwrap_or_default)
}

fn lenient_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(lenient_text(deserializer)?
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty()))
}

fn lenient_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_conversation<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<ConversationId, D::Error> {
    Ok(lenient_number(deserializer)?.map_or_else(default_conversation, ConversationId))
}

fn lenient_bool<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<bool>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_bool())
}

impl HistoryRecord {
    /// Display name derived from the sender identity fields
    pub fn display_name(&self) -> String {
        sender_display_name(
            self.sender_first_name.as_deref(),
            self.sender_last_name.as_deref(),
            self.sender.as_deref(),
            self.sender_email.as_deref(),
        )
    }
}

/// Compute a sender display name
///
/// Prefers first and last name joined by a space, then the raw sender
/// label, then the email, then [`UNKNOWN_SENDER`]. Blank values are skipped.
pub fn sender_display_name(
    first_name: Option<&str>,
    last_name: Option<&str>,
    sender: Option<&str>,
    email: Option<&str>,
) -> String {
    let full = [first_name, last_name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !full.is_empty() {
        return full;
    }

    [sender, email]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_SENDER)
        .to_string()
}

/// Parse a live payload delivered on a conversation topic
///
/// The payload must be a JSON object. Missing `sender` and `content`
/// fields fall back to safe defaults instead of rejecting the message.
pub fn parse_live_payload(body: &str, conversation_id: ConversationId) -> Result<ChatMessage> {
    let value: Value = serde_json::from_str(body)?;
    let object = value.as_object().ok_or(ChatError::InvalidMessageFormat)?;

    let id = match object.get("id") {
        Some(Value::String(id)) if !id.is_empty() => MessageId::Persisted(id.clone()),
        Some(Value::Number(id)) => MessageId::Persisted(id.to_string()),
        _ => MessageId::provisional_now(),
    };

    let sender = object
        .get("sender")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SENDER)
        .to_string();

    let content = object
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let timestamp = object
        .get("timestamp")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(now_iso);

    Ok(ChatMessage {
        id: Some(id),
        sender,
        content,
        timestamp,
        conversation_id,
    })
}

/// Body published to a conversation's send destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    /// Trimmed message text
    pub content: String,
    /// Client send time
    pub timestamp: String,
}

impl OutboundPayload {
    /// Build a payload from user input, `None` when only whitespace remains
    pub fn compose(content: &str) -> Option<Self> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        Some(Self {
            content: content.to_string(),
            timestamp: now_iso(),
        })
    }
}

/// Current time as ISO-8601 with millisecond precision and a `Z` suffix
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse the timestamp shapes the backend and clients produce
///
/// Accepts RFC 3339 with an offset, and naive `YYYY-MM-DDTHH:MM:SS[.fff]`
/// values which are read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
