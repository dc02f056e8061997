//! Chat client configuration

use crate::message::ConversationId;
use crate::stomp::{self, HeartBeat};
use crate::transport::TransportType;
use crate::{ChatError, Result};
use std::time::Duration;
use url::Url;

/// Default REST API base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Handshake timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Reconnect attempts after an unexpected close
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Base of the linear reconnect delay
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(2_000);

/// Heart-beat interval offered in both directions
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(10_000);

/// Inbound topic prefix
pub const DEFAULT_TOPIC_PREFIX: &str = "/topic/conversation-";

/// Outbound destination prefix
pub const DEFAULT_SEND_PREFIX: &str = "/chat/sendTo/conversation-";

/// Chat connection configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat endpoint, `http(s)` or `ws(s)`
    pub endpoint: Url,
    /// Socket framing used on the endpoint
    pub transport: TransportType,
    /// Maximum time a handshake may take
    pub connect_timeout: Duration,
    /// Maximum automatic reconnect attempts
    pub max_reconnect_attempts: u32,
    /// Attempt `k` waits `k * reconnect_base_delay`
    pub reconnect_base_delay: Duration,
    /// Outgoing heart-beat offer, zero disables
    pub heartbeat_outgoing: Duration,
    /// Incoming heart-beat request, zero disables
    pub heartbeat_incoming: Duration,
    /// Prefix of the per-conversation topic
    pub topic_prefix: String,
    /// Prefix of the per-conversation send destination
    pub send_prefix: String,
}

impl ChatConfig {
    /// Configuration with defaults for everything but the endpoint
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            transport: TransportType::SockJs,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            heartbeat_outgoing: DEFAULT_HEARTBEAT,
            heartbeat_incoming: DEFAULT_HEARTBEAT,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            send_prefix: DEFAULT_SEND_PREFIX.to_string(),
        }
    }

    /// Chat endpoint next to a REST API: the API origin plus `/chat`
    ///
    /// ```rust
    /// use freight_chat_protocol::ChatConfig;
    ///
    /// let config = ChatConfig::for_api_base("https://api.example.com/api").unwrap();
    /// assert_eq!(config.endpoint.as_str(), "https://api.example.com/chat");
    /// ```
    pub fn for_api_base(api_base: &str) -> Result<Self> {
        let api = Url::parse(api_base)?;
        if api.cannot_be_a_base() {
            return Err(ChatError::Configuration(format!(
                "API base URL '{}' has no origin",
                api_base
            )));
        }
        let endpoint = api.join("/chat")?;
        Ok(Self::new(endpoint))
    }

    /// Topic a conversation's messages are pushed to
    pub fn topic(&self, conversation: ConversationId) -> String {
        stomp::conversation_topic(&self.topic_prefix, conversation)
    }

    /// Destination outbound messages are published to
    pub fn destination(&self, conversation: ConversationId) -> String {
        format!("{}{}", self.send_prefix, conversation)
    }

    /// Heart-beat header offered in CONNECT
    pub fn heart_beat(&self) -> HeartBeat {
        HeartBeat::new(
            self.heartbeat_outgoing.as_millis() as u64,
            self.heartbeat_incoming.as_millis() as u64,
        )
    }

    /// Reject values the connection manager cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(ChatError::Configuration(
                "connect timeout must be positive".to_string(),
            ));
        }
        match self.endpoint.scheme() {
            "http" | "https" | "ws" | "wss" => Ok(()),
            other => Err(ChatError::Configuration(format!(
                "unsupported endpoint scheme '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> ChatConfig {
        ChatConfig::for_api_base(DEFAULT_API_BASE_URL).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = local();
        assert_eq!(config.connect_timeout, Duration::from_millis(10_000));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(2_000));
        assert_eq!(config.heart_beat(), HeartBeat::new(10_000, 10_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_topic_and_destination_differ() {
        let config = local();
        assert_eq!(config.topic(ConversationId(7)), "/topic/conversation-7");
        assert_eq!(
            config.destination(ConversationId(7)),
            "/chat/sendTo/conversation-7"
        );
    }

    #[test]
    fn test_endpoint_from_api_base() {
        let config = ChatConfig::for_api_base("http://localhost:8080/api").unwrap();
        assert_eq!(config.endpoint.as_str(), "http://localhost:8080/chat");
        assert!(ChatConfig::for_api_base("not a url").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let config = ChatConfig::new(Url::parse("ftp://example.com/chat").unwrap());
        assert!(matches!(config.validate(), Err(ChatError::Configuration(_))));
    }
}
