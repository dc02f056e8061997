//! Error handling for the freight chat client
//!
//! This module provides one error type for every chat operation. Errors from
//! underlying libraries are converted automatically with `thiserror`.
//!
//! ## Error Handling Patterns
//!
//! ### Basic Usage
//!
//! ```rust
//! use freight_chat_protocol::Result;
//!
//! fn parse_payload(data: &str) -> Result<serde_json::Value> {
//!     // JSON errors are converted through the From trait
//!     let value: serde_json::Value = serde_json::from_str(data)?;
//!     Ok(value)
//! }
//! ```
//!
//! ### Error Matching
//!
//! ```rust
//! use freight_chat_protocol::ChatError;
//!
//! fn describe(error: &ChatError) -> &'static str {
//!     match error {
//!         ChatError::NotConnected => "offline",
//!         ChatError::Timeout(_) => "slow network",
//!         _ => "other",
//!     }
//! }
//!
//! assert_eq!(describe(&ChatError::NotConnected), "offline");
//! ```
//!
//! ## Error Categories
//!
//! ### Connection Errors
//! Handshake failure, timeout, unexpected close and exhausted reconnects.
//! All are recoverable by calling `connect` again.
//!
//! ### Subscription and Send Errors
//! `NotConnected`, `NoActiveConversation`, `InvalidMessageFormat` and
//! `SendFailed`. None of them close the connection.
//!
//! ### REST Errors
//! `Http`, `Api` and `Unauthorized` come from the backend collaborator.

use thiserror::Error;

/// Result type for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur while talking to the chat backend
///
/// The `Display` text of each variant is what listeners receive in
/// [`ChatEvent::Error`](crate::ChatEvent::Error).
///
/// # Examples
///
/// ```rust
/// use freight_chat_protocol::ChatError;
///
/// let error = ChatError::Timeout(10_000);
/// assert_eq!(error.to_string(), "Connection timeout after 10000ms");
///
/// let error = ChatError::NotConnected;
/// assert_eq!(error.to_string(), "Not connected to chat server");
/// ```
#[derive(Error, Debug)]
pub enum ChatError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL could not be parsed or rewritten
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP client error from the REST collaborator
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport layer error (WebSocket, SockJS framing)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection handshake did not finish in time
    ///
    /// The payload is the configured timeout in milliseconds.
    #[error("Connection timeout after {0}ms")]
    Timeout(u64),

    /// The server rejected the STOMP handshake
    #[error("STOMP connection error: {0}")]
    Handshake(String),

    /// The transport closed while a session was expected to be alive
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Automatic reconnection gave up
    #[error("Failed to reconnect after {0} attempts: max attempts exceeded")]
    MaxAttemptsExceeded(u32),

    /// An operation needed an established session
    #[error("Not connected to chat server")]
    NotConnected,

    /// A send was attempted without a conversation
    #[error("No active conversation")]
    NoActiveConversation,

    /// `connect` was called without a usable credential
    #[error("Authentication token not available")]
    MissingCredential,

    /// An inbound live payload could not be parsed
    #[error("Invalid message format received")]
    InvalidMessageFormat,

    /// A STOMP frame could not be decoded
    #[error("Invalid STOMP frame: {0}")]
    InvalidFrame(String),

    /// Publishing to the send destination failed
    #[error("Failed to send message: {0}")]
    SendFailed(String),

    /// Subscribing to a conversation topic failed
    #[error("Failed to subscribe to conversation: {0}")]
    SubscribeFailed(String),

    /// The REST backend rejected the credential
    #[error("Unauthorized")]
    Unauthorized,

    /// The REST backend answered with a non-success status
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message from the response body, or the canonical reason
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation cancelled by a deliberate disconnect
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The background connection task is gone
    #[error("Chat connection task is not running")]
    TaskStopped,
}

impl ChatError {
    /// Check if this error is transient and a retry may succeed
    ///
    /// # Examples
    ///
    /// ```rust
    /// use freight_chat_protocol::ChatError;
    ///
    /// assert!(ChatError::Timeout(10_000).is_recoverable());
    /// assert!(!ChatError::Unauthorized.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChatError::Timeout(_)
                | ChatError::Transport(_)
                | ChatError::ConnectionClosed(_)
                | ChatError::MaxAttemptsExceeded(_)
                | ChatError::NotConnected
                | ChatError::Io(_)
                | ChatError::Http(_)
        )
    }

    /// Check if this error cannot be resolved without the user
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            ChatError::Unauthorized
                | ChatError::MissingCredential
                | ChatError::Handshake(_)
                | ChatError::Configuration(_)
        )
    }

    /// Get a short, actionable message for display
    ///
    /// # Examples
    ///
    /// ```rust
    /// use freight_chat_protocol::ChatError;
    ///
    /// assert_eq!(
    ///     ChatError::Unauthorized.user_message(),
    ///     "Session expired. Please log in again."
    /// );
    /// ```
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Unauthorized => "Session expired. Please log in again.".to_string(),
            ChatError::MissingCredential => {
                "Not logged in. Please log in to use chat.".to_string()
            }
            ChatError::Timeout(ms) => {
                format!("Connection timeout after {}ms. Check network connection.", ms)
            }
            ChatError::MaxAttemptsExceeded(n) => format!(
                "Could not reconnect after {} attempts. Use retry to connect again.",
                n
            ),
            ChatError::NotConnected => {
                "No chat connection. The message could not be sent.".to_string()
            }
            ChatError::Handshake(msg) => {
                format!("Chat server refused the connection: {}.", msg)
            }
            ChatError::Api { status, message } => {
                format!("Server error ({}): {}.", status, message)
            }
            other => other.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match error {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                ChatError::ConnectionClosed("websocket closed".to_string())
            }
            WsError::Io(e) => ChatError::Io(e),
            other => ChatError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ChatError::Timeout(10_000).to_string(),
            "Connection timeout after 10000ms"
        );
        assert_eq!(
            ChatError::MaxAttemptsExceeded(3).to_string(),
            "Failed to reconnect after 3 attempts: max attempts exceeded"
        );
        assert_eq!(
            ChatError::InvalidMessageFormat.to_string(),
            "Invalid message format received"
        );
        assert_eq!(
            ChatError::NoActiveConversation.to_string(),
            "No active conversation"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let error: ChatError = json_error.into();
        assert!(matches!(error, ChatError::Json(_)));
    }

    #[test]
    fn test_classification() {
        assert!(ChatError::ConnectionClosed("eof".into()).is_recoverable());
        assert!(!ChatError::ConnectionClosed("eof".into()).requires_user_action());
        assert!(ChatError::MissingCredential.requires_user_action());
        assert!(!ChatError::InvalidMessageFormat.is_recoverable());
    }

    #[test]
    fn test_websocket_close_maps_to_connection_closed() {
        let error: ChatError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(error, ChatError::ConnectionClosed(_)));
    }
}
