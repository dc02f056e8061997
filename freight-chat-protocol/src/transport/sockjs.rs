//! SockJS WebSocket transport
//!
//! The chat backend exposes its STOMP broker behind SockJS. Only the
//! WebSocket leg of SockJS is spoken here:
//!
//! ```text
//! <endpoint>/<server-id>/<session-id>/websocket
//! ```
//!
//! Server frames:
//!
//! | Frame | Meaning |
//! |-------|---------|
//! | `o` | session open |
//! | `h` | SockJS heart-beat |
//! | `a["..",".."]` | array of messages |
//! | `m".."` | single message |
//! | `c[code,"reason"]` | session closed |
//!
//! Client messages are sent as a JSON array of strings.

use super::websocket::WebSocketConnection;
use super::{websocket_scheme, Transport, TransportFactory, TransportType};
use crate::{ChatError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};
use url::Url;
use uuid::Uuid;

/// Decoded SockJS server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    /// Session open
    Open,
    /// Keep-alive
    Heartbeat,
    /// One or more application messages
    Messages(Vec<String>),
    /// Session closed by the server
    Close {
        /// SockJS close code
        code: u16,
        /// Close reason
        reason: String,
    },
}

impl SockJsFrame {
    /// Decode a server frame
    pub fn parse(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ChatError::Transport("empty SockJS frame".to_string()))?;
        let rest = chars.as_str();

        match kind {
            'o' => Ok(SockJsFrame::Open),
            'h' => Ok(SockJsFrame::Heartbeat),
            'a' => Ok(SockJsFrame::Messages(serde_json::from_str(rest)?)),
            'm' => Ok(SockJsFrame::Messages(vec![serde_json::from_str(rest)?])),
            'c' => {
                let (code, reason): (u16, String) = serde_json::from_str(rest)?;
                Ok(SockJsFrame::Close { code, reason })
            }
            other => Err(ChatError::Transport(format!(
                "unknown SockJS frame type '{}'",
                other
            ))),
        }
    }
}

/// Encode a client message
pub fn encode_client_message(text: &str) -> Result<String> {
    Ok(serde_json::to_string(&[text])?)
}

/// Build the SockJS WebSocket URL for a fresh session
pub fn session_url(endpoint: &Url) -> Result<Url> {
    let id = Uuid::new_v4();
    let server_id = format!("{:03}", id.as_u128() % 1000);
    let session_id = id.simple().to_string();
    session_url_with_ids(endpoint, &server_id, &session_id)
}

fn session_url_with_ids(endpoint: &Url, server_id: &str, session_id: &str) -> Result<Url> {
    let mut url = websocket_scheme(endpoint)?;
    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}/{}/{}/websocket", base, server_id, session_id));
    Ok(url)
}

/// SockJS session over a WebSocket
#[derive(Debug)]
pub struct SockJsConnection {
    socket: WebSocketConnection,
    // Messages decoded from an `a[...]` frame but not yet handed out
    pending: VecDeque<String>,
}

impl SockJsConnection {
    /// Open the WebSocket and wait for the SockJS `o` frame
    pub async fn open(endpoint: &Url) -> Result<Self> {
        let url = session_url(endpoint)?;
        let mut socket = WebSocketConnection::open(url).await?;

        loop {
            let raw = socket.next_text().await?.ok_or_else(|| {
                ChatError::ConnectionClosed("SockJS session closed before open".to_string())
            })?;
            match SockJsFrame::parse(&raw)? {
                SockJsFrame::Open => break,
                SockJsFrame::Heartbeat => continue,
                SockJsFrame::Close { code, reason } => {
                    return Err(ChatError::ConnectionClosed(format!(
                        "SockJS session refused ({}): {}",
                        code, reason
                    )))
                }
                SockJsFrame::Messages(_) => {
                    return Err(ChatError::Transport(
                        "SockJS message received before open frame".to_string(),
                    ))
                }
            }
        }

        debug!("SockJS session open at {}", socket.remote());
        Ok(Self {
            socket,
            pending: VecDeque::new(),
        })
    }
}

#[async_trait]
impl Transport for SockJsConnection {
    fn transport_type(&self) -> TransportType {
        TransportType::SockJs
    }

    fn remote_address(&self) -> String {
        self.socket.remote().to_string()
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        let encoded = encode_client_message(text)?;
        self.socket.send_raw(encoded).await
    }

    async fn receive_text(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(Some(message));
            }

            let Some(raw) = self.socket.next_text().await? else {
                return Ok(None);
            };

            match SockJsFrame::parse(&raw)? {
                SockJsFrame::Messages(messages) => self.pending.extend(messages),
                SockJsFrame::Heartbeat => trace!("SockJS heart-beat"),
                SockJsFrame::Open => warn!("Unexpected SockJS open frame on live session"),
                SockJsFrame::Close { code, reason } => {
                    return Err(ChatError::ConnectionClosed(format!(
                        "SockJS session closed ({}): {}",
                        code, reason
                    )))
                }
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.socket.shutdown().await
    }
}

/// Factory for SockJS sessions
#[derive(Debug, Default, Clone)]
pub struct SockJsTransportFactory;

impl SockJsTransportFactory {
    /// Create a new factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for SockJsTransportFactory {
    async fn connect(&self, endpoint: &Url) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SockJsConnection::open(endpoint).await?))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::SockJs
    }
}
