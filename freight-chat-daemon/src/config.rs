//! Client Configuration
//!
//! TOML configuration for the freight chat client.

use anyhow::{Context, Result};
use freight_chat_protocol::config::{
    DEFAULT_API_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY,
};
use freight_chat_protocol::{ApiClient, ChatConfig, TransportType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// REST backend
    #[serde(default)]
    pub api: ApiConfig,

    /// Live chat connection
    #[serde(default)]
    pub chat: ChatSettings,
}

/// REST backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Bearer token for REST and STOMP
    #[serde(default)]
    pub token: Option<String>,

    /// Id of the logged-in user
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Live chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Chat endpoint (derived from the API base URL if not set)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Socket framing: "sockjs" or "websocket"
    #[serde(default)]
    pub transport: TransportType,

    /// Handshake timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Automatic reconnect attempts after a drop
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base of the linear reconnect delay in milliseconds
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,

    /// Outgoing heart-beat in milliseconds (0 disables)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_outgoing_ms: u64,

    /// Expected incoming heart-beat in milliseconds (0 disables)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_incoming_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_reconnect_base_delay() -> u64 {
    DEFAULT_RECONNECT_BASE_DELAY.as_millis() as u64
}

fn default_heartbeat() -> u64 {
    DEFAULT_HEARTBEAT.as_millis() as u64
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_request_timeout(),
            token: None,
            user_id: None,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            transport: TransportType::default(),
            connect_timeout_ms: default_connect_timeout(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            heartbeat_outgoing_ms: default_heartbeat(),
            heartbeat_incoming_ms: default_heartbeat(),
        }
    }
}

impl Config {
    /// `<config_dir>/freight-chat/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("freight-chat")
            .join("config.toml")
    }

    /// Load configuration from `path`, creating a default file if not found
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!("Created default configuration at {}", path.display());
            Ok(config)
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Replace the stored token when one was given on the command line or in
    /// the environment
    pub fn override_token(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.api.token = Some(token);
        }
    }

    /// REST request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Live connection settings
    pub fn chat_config(&self) -> Result<ChatConfig> {
        let mut config = match &self.chat.endpoint {
            Some(endpoint) => ChatConfig::new(
                Url::parse(endpoint)
                    .with_context(|| format!("Invalid chat endpoint '{}'", endpoint))?,
            ),
            None => ChatConfig::for_api_base(&self.api.base_url)
                .context("Failed to derive chat endpoint from API base URL")?,
        };

        config.transport = self.chat.transport;
        config.connect_timeout = Duration::from_millis(self.chat.connect_timeout_ms);
        config.max_reconnect_attempts = self.chat.max_reconnect_attempts;
        config.reconnect_base_delay = Duration::from_millis(self.chat.reconnect_base_delay_ms);
        config.heartbeat_outgoing = Duration::from_millis(self.chat.heartbeat_outgoing_ms);
        config.heartbeat_incoming = Duration::from_millis(self.chat.heartbeat_incoming_ms);
        config.validate().context("Invalid chat configuration")?;
        Ok(config)
    }

    /// REST client carrying the configured token and user
    pub fn api_client(&self) -> Result<ApiClient> {
        let client = ApiClient::new(&self.api.base_url, self.request_timeout())
            .context("Failed to create API client")?;
        Ok(client
            .with_token(self.api.token.clone())
            .with_user_id(self.api.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8080/api");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.chat.transport, TransportType::SockJs);
        assert_eq!(config.chat.connect_timeout_ms, 10_000);
        assert_eq!(config.chat.max_reconnect_attempts, 3);
        assert_eq!(config.chat.reconnect_base_delay_ms, 2_000);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.api.user_id = Some(12);
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.api.user_id, Some(12));
        assert_eq!(parsed.chat.transport, config.chat.transport);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [api]
            base_url = "https://freight.example.com/api"

            [chat]
            transport = "ws"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.api.timeout_secs, 30);
        assert_eq!(parsed.chat.transport, TransportType::WebSocket);
        assert_eq!(parsed.chat.heartbeat_incoming_ms, 10_000);
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let parsed: std::result::Result<Config, _> = toml::from_str("[chat]\ntransport = \"carrier-pigeon\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freight-chat").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);

        let mut edited = config;
        edited.api.token = Some("stored".to_string());
        edited.save_to(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.api.token.as_deref(), Some("stored"));
    }

    #[test]
    fn test_token_override() {
        let mut config = Config::default();
        config.api.token = Some("stored".to_string());

        config.override_token(None);
        assert_eq!(config.api.token.as_deref(), Some("stored"));

        config.override_token(Some("  ".to_string()));
        assert_eq!(config.api.token.as_deref(), Some("stored"));

        config.override_token(Some("fresh".to_string()));
        assert_eq!(config.api.token.as_deref(), Some("fresh"));
    }

    #[test]
    fn test_chat_config_derived_from_api_base() {
        let mut config = Config::default();
        config.api.base_url = "https://freight.example.com/api/v1".to_string();
        config.chat.heartbeat_outgoing_ms = 0;

        let chat = config.chat_config().unwrap();
        assert_eq!(chat.endpoint.as_str(), "https://freight.example.com/chat");
        assert_eq!(chat.heartbeat_outgoing, Duration::ZERO);
        assert_eq!(chat.reconnect_base_delay, Duration::from_millis(2_000));
    }

    #[test]
    fn test_chat_config_explicit_endpoint() {
        let mut config = Config::default();
        config.chat.endpoint = Some("wss://chat.example.com/ws".to_string());
        config.chat.transport = TransportType::WebSocket;

        let chat = config.chat_config().unwrap();
        assert_eq!(chat.endpoint.as_str(), "wss://chat.example.com/ws");
        assert_eq!(chat.transport, TransportType::WebSocket);
    }

    #[test]
    fn test_chat_config_rejects_zero_timeout() {
        let mut config = Config::default();
        config.chat.connect_timeout_ms = 0;
        assert!(config.chat_config().is_err());
    }
}
