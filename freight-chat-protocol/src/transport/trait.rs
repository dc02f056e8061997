//! Transport Trait Abstraction
//!
//! Defines a common interface for the socket transports (plain WebSocket,
//! SockJS over WebSocket) that carry STOMP text between client and server.

use crate::{ChatError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;
use url::Url;

/// Common transport interface for the chat connection
///
/// A transport moves opaque text in both directions. STOMP framing lives
/// one layer up, so a transport may deliver partial or multiple frames per
/// call.
#[async_trait]
pub trait Transport: Send + Debug {
    /// Get the transport type
    fn transport_type(&self) -> TransportType;

    /// Get remote address
    fn remote_address(&self) -> String;

    /// Send a chunk of STOMP text
    ///
    /// # Errors
    ///
    /// Returns an error if there's a communication failure.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Receive the next chunk of STOMP text
    ///
    /// Returns `Ok(None)` once the peer closed the connection. Implementations
    /// must be cancel safe: dropping the future must not lose received data.
    ///
    /// # Errors
    ///
    /// Returns an error if reception fails or the transport framing is
    /// malformed.
    async fn receive_text(&mut self) -> Result<Option<String>>;

    /// Close the connection gracefully
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be closed cleanly.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Factory trait for creating transport connections
#[async_trait]
pub trait TransportFactory: Send + Sync + Debug {
    /// Open a transport to the chat endpoint
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Configured chat endpoint, `http(s)` or `ws(s)`
    async fn connect(&self, endpoint: &Url) -> Result<Box<dyn Transport>>;

    /// Get the transport type this factory creates
    fn transport_type(&self) -> TransportType;
}

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Raw WebSocket, one or more STOMP frames per text message
    #[serde(alias = "ws")]
    WebSocket,

    /// SockJS WebSocket transport
    #[default]
    SockJs,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::WebSocket => write!(f, "WebSocket"),
            TransportType::SockJs => write!(f, "SockJS"),
        }
    }
}

impl FromStr for TransportType {
    type Err = ChatError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(TransportType::WebSocket),
            "sockjs" => Ok(TransportType::SockJs),
            other => Err(ChatError::Configuration(format!(
                "unknown transport '{}'",
                other
            ))),
        }
    }
}

/// Map an `http(s)` endpoint onto its `ws(s)` equivalent
pub fn websocket_scheme(endpoint: &Url) -> Result<Url> {
    let scheme = match endpoint.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChatError::Configuration(format!(
                "unsupported endpoint scheme '{}'",
                other
            )))
        }
    };
    let mut url = endpoint.clone();
    url.set_scheme(scheme)
        .map_err(|_| ChatError::Configuration(format!("cannot use scheme {}", scheme)))?;
    Ok(url)
}
