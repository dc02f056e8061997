//! REST collaborator client
//!
//! Conversation history, message persistence and read markers live behind
//! the marketplace REST API. The chat core only needs the three operations
//! of [`MessageStore`]; [`ApiClient`] implements them with reqwest.
//!
//! Responses may be wrapped as `{"data": ...}`; the envelope is removed
//! before decoding.

use crate::message::{sender_display_name, ConversationId, HistoryRecord};
use crate::{ChatError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Persistence operations the chat core consumes
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persisted messages of a conversation
    async fn fetch_history(&self, conversation: ConversationId) -> Result<Vec<HistoryRecord>>;

    /// Persist an outbound message
    async fn create_message(&self, conversation: ConversationId, content: &str) -> Result<()>;

    /// Mark every message of a conversation as read
    async fn mark_read(&self, conversation: ConversationId) -> Result<()>;
}

/// Conversation summary normalised for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id
    pub id: ConversationId,
    /// The other participant
    pub other_user_id: Option<i64>,
    /// Display name of the other participant
    pub other_user_name: Option<String>,
    /// Company of the other participant
    pub other_user_company: Option<String>,
    /// Last message text
    pub last_message_preview: Option<String>,
    /// Unread messages, `None` when zero
    pub unread_count: Option<u32>,
    /// Last activity
    pub updated_at: Option<String>,
}

fn text_field<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| raw.get(*name))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
}

fn number_field(raw: &Value, names: &[&str]) -> Option<i64> {
    names
        .iter()
        .filter_map(|name| raw.get(*name))
        .find_map(|value| match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|n| *n != 0)
}

impl Conversation {
    /// Normalise a loosely shaped backend record
    ///
    /// The other participant is whichever of `user1Id`/`user2Id` is not the
    /// current user, falling back to `otherUserId`.
    pub fn from_raw(raw: &Value, current_user: Option<i64>) -> Result<Self> {
        let id = number_field(raw, &["id"]).ok_or_else(|| ChatError::Api {
            status: 200,
            message: "conversation without id".to_string(),
        })?;

        let user1 = number_field(raw, &["user1Id", "userOneId"]);
        let user2 = number_field(raw, &["user2Id", "userTwoId"]);
        let current_is_first = current_user.is_some() && current_user == user1;

        let other_user_id = match (current_user, user1, user2) {
            (Some(current), Some(first), Some(second)) => {
                Some(if current == first { second } else { first })
            }
            _ => number_field(raw, &["otherUserId"]),
        };

        let counterpart = |first: &str, second: &str| {
            if current_is_first {
                text_field(raw, &[second])
            } else {
                text_field(raw, &[first])
            }
        };

        let company = text_field(raw, &["companyName", "otherUserCompany"])
            .or_else(|| counterpart("user1CompanyName", "user2CompanyName"))
            .map(str::to_string);

        let first_name = text_field(raw, &["otherFirstName", "firstName"]);
        let last_name = text_field(raw, &["otherLastName", "lastName"]);
        let combined = match (first_name, last_name) {
            (None, None) => None,
            (first, last) => Some(sender_display_name(first, last, None, None)),
        };
        let other_user_name = combined
            .or_else(|| {
                text_field(raw, &["otherUserName"])
                    .or_else(|| counterpart("user1Name", "user2Name"))
                    .map(str::to_string)
            })
            .or_else(|| company.clone());

        let unread_count = number_field(raw, &["unreadCount"])
            .and_then(|n| u32::try_from(n).ok());

        Ok(Self {
            id: ConversationId(id),
            other_user_id,
            other_user_name,
            other_user_company: company,
            last_message_preview: text_field(raw, &["lastMessagePreview"]).map(str::to_string),
            unread_count,
            updated_at: text_field(raw, &["lastMessageDate", "updatedAt", "createdDate"])
                .map(str::to_string),
        })
    }
}

/// Remove a `{"data": ...}` envelope
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut object) if object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Map a non-success status to an error
pub fn status_error(status: u16, body: &str) -> ChatError {
    if status == 401 {
        return ChatError::Unauthorized;
    }

    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|code| code.canonical_reason())
                .unwrap_or("request failed")
                .to_string()
        });

    ChatError::Api { status, message }
}

/// reqwest-backed REST client
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    user_id: Option<i64>,
}

impl ApiClient {
    /// Create a client for an API base URL such as `http://localhost:8080/api`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Url::parse(base_url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            user_id: None,
        })
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Current user, used to identify the other participant
    pub fn with_user_id(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.base_url,
            path.trim_start_matches('/')
        ))?)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, url);
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("REST request failed with {}", status);
            return Err(status_error(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(unwrap_envelope(serde_json::from_str(&body)?))
    }

    /// Conversations of the current user
    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        let url = self.url("messages/conversations")?;
        let value = self.execute(self.request(reqwest::Method::GET, url)).await?;
        let records = match value {
            Value::Array(records) => records,
            Value::Null => Vec::new(),
            other => {
                return Err(ChatError::Api {
                    status: 200,
                    message: format!("expected a conversation list, got {}", other),
                })
            }
        };

        let mut conversations = Vec::with_capacity(records.len());
        for raw in &records {
            match Conversation::from_raw(raw, self.user_id) {
                Ok(conversation) => conversations.push(conversation),
                Err(e) => warn!("Skipping conversation record: {}", e),
            }
        }
        Ok(conversations)
    }

    /// Open (or fetch) the conversation with another user
    pub async fn create_conversation(
        &self,
        other_user_id: i64,
        cargo_request_id: Option<i64>,
    ) -> Result<Conversation> {
        let mut url = self.url("messages/conversation")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("otherUserId", &other_user_id.to_string());
            if let Some(cargo) = cargo_request_id {
                query.append_pair("cargoRequestId", &cargo.to_string());
            }
        }
        let value = self.execute(self.request(reqwest::Method::POST, url)).await?;
        Conversation::from_raw(&value, self.user_id)
    }
}

/// Decode a history list, skipping entries that are not records at all
fn decode_history(value: Value) -> Result<Vec<HistoryRecord>> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ChatError::Api {
                status: 200,
                message: format!("expected a message list, got {}", other),
            })
        }
    };

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<HistoryRecord>(entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping message record: {}", e),
        }
    }
    Ok(records)
}

#[async_trait]
impl MessageStore for ApiClient {
    async fn fetch_history(&self, conversation: ConversationId) -> Result<Vec<HistoryRecord>> {
        let url = self.url(&format!("messages/conversation/{}", conversation))?;
        let value = self.execute(self.request(reqwest::Method::GET, url)).await?;
        let records = decode_history(value)?;
        debug!("Fetched {} messages for conversation {}", records.len(), conversation);
        Ok(records)
    }

    async fn create_message(&self, conversation: ConversationId, content: &str) -> Result<()> {
        let url = self.url("messages")?;
        let body = json!({ "conversationId": conversation, "content": content });
        self.execute(self.request(reqwest::Method::POST, url).json(&body))
            .await?;
        debug!("Persisted message in conversation {}", conversation);
        Ok(())
    }

    async fn mark_read(&self, conversation: ConversationId) -> Result<()> {
        let url = self.url(&format!("messages/conversation/{}/mark-read", conversation))?;
        self.execute(self.request(reqwest::Method::PUT, url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_envelope() {
        assert_eq!(unwrap_envelope(json!({"data": [1, 2]})), json!([1, 2]));
        assert_eq!(unwrap_envelope(json!([1, 2])), json!([1, 2]));
        assert_eq!(unwrap_envelope(json!({"id": 1})), json!({"id": 1}));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(status_error(401, ""), ChatError::Unauthorized));

        match status_error(400, r#"{"message":"Boş mesaj gönderilemez"}"#) {
            ChatError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Boş mesaj gönderilemez");
            }
            other => panic!("unexpected {:?}", other),
        }

        match status_error(503, "<html>") {
            ChatError::Api { message, .. } => assert_eq!(message, "Service Unavailable"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_conversation_other_user_from_pair() {
        let raw = json!({
            "id": 12,
            "user1Id": 3,
            "user2Id": 9,
            "user1Name": "Ayşe Kaya",
            "user2Name": "Mehmet Demir",
            "user2CompanyName": "Demir Lojistik",
            "unreadCount": 0,
            "lastMessageDate": "2024-01-01T10:00:00"
        });

        let conversation = Conversation::from_raw(&raw, Some(3)).unwrap();
        assert_eq!(conversation.id, ConversationId(12));
        assert_eq!(conversation.other_user_id, Some(9));
        assert_eq!(conversation.other_user_name.as_deref(), Some("Mehmet Demir"));
        assert_eq!(conversation.other_user_company.as_deref(), Some("Demir Lojistik"));
        assert_eq!(conversation.unread_count, None);
        assert_eq!(conversation.updated_at.as_deref(), Some("2024-01-01T10:00:00"));

        let conversation = Conversation::from_raw(&raw, Some(9)).unwrap();
        assert_eq!(conversation.other_user_id, Some(3));
        assert_eq!(conversation.other_user_name.as_deref(), Some("Ayşe Kaya"));
    }

    #[test]
    fn test_conversation_name_fallbacks() {
        let raw = json!({
            "id": "4",
            "otherUserId": "8",
            "otherFirstName": "Ali",
            "lastName": "Yilmaz",
            "unreadCount": 2,
            "updatedAt": "2024-02-02T08:00:00"
        });
        let conversation = Conversation::from_raw(&raw, None).unwrap();
        assert_eq!(conversation.other_user_id, Some(8));
        assert_eq!(conversation.other_user_name.as_deref(), Some("Ali Yilmaz"));
        assert_eq!(conversation.unread_count, Some(2));

        let raw = json!({ "id": 5, "companyName": "Kargo AŞ" });
        let conversation = Conversation::from_raw(&raw, None).unwrap();
        assert_eq!(conversation.other_user_name.as_deref(), Some("Kargo AŞ"));
        assert_eq!(conversation.other_user_id, None);
    }

    #[test]
    fn test_conversation_requires_id() {
        assert!(Conversation::from_raw(&json!({"user1Id": 1}), None).is_err());
    }

    #[test]
    fn test_decode_history_tolerates_bad_records() {
        let value = json!([
            { "id": 1, "content": "Merhaba", "createdAt": "2024-01-01T10:00:00" },
            { "id": "2", "content": null, "createdAt": null, "conversationId": null },
            "not a record",
            { "id": 3, "content": "Yük hazır" }
        ]);
        let records = decode_history(value).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("1"), Some("2"), Some("3")]);
        assert_eq!(records[1].content, "");

        assert!(decode_history(Value::Null).unwrap().is_empty());
        assert!(decode_history(json!({"id": 1})).is_err());
    }

    #[test]
    fn test_url_building() {
        let client = ApiClient::new("http://localhost:8080/api/", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(
            client.url("messages/conversation/7/mark-read").unwrap().as_str(),
            "http://localhost:8080/api/messages/conversation/7/mark-read"
        );
        assert!(ApiClient::new("no scheme", DEFAULT_REQUEST_TIMEOUT).is_err());
    }
}
