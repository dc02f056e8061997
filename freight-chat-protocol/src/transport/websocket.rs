//! Plain WebSocket transport

use super::{websocket_scheme, Transport, TransportFactory, TransportType};
use crate::{ChatError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::fmt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection carrying STOMP text messages
pub struct WebSocketConnection {
    stream: WsStream,
    remote: Url,
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("remote", &self.remote.as_str())
            .finish()
    }
}

impl WebSocketConnection {
    /// Open a WebSocket to an already mapped `ws(s)` URL
    pub async fn open(url: Url) -> Result<Self> {
        debug!("Opening WebSocket to {}", url);
        let (stream, response) = connect_async(url.as_str()).await?;
        debug!("WebSocket upgrade answered with {}", response.status());
        Ok(Self {
            stream,
            remote: url,
        })
    }

    /// Next text payload, `None` on close
    ///
    /// Control frames are consumed here; tungstenite answers pings itself.
    pub(crate) async fn next_text(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => {
                    let text = String::from_utf8(data.to_vec()).map_err(|_| {
                        ChatError::Transport("binary message is not UTF-8".to_string())
                    })?;
                    return Ok(Some(text));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("WebSocket closed by server: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => trace!("Ignoring WebSocket control frame {:?}", other),
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    pub(crate) async fn send_raw(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    pub(crate) async fn shutdown(mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn remote(&self) -> &Url {
        &self.remote
    }
}

#[async_trait]
impl Transport for WebSocketConnection {
    fn transport_type(&self) -> TransportType {
        TransportType::WebSocket
    }

    fn remote_address(&self) -> String {
        self.remote.to_string()
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_raw(text.to_string()).await
    }

    async fn receive_text(&mut self) -> Result<Option<String>> {
        self.next_text().await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.shutdown().await
    }
}

/// Factory for plain WebSocket connections
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransportFactory;

impl WebSocketTransportFactory {
    /// Create a new factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for WebSocketTransportFactory {
    async fn connect(&self, endpoint: &Url) -> Result<Box<dyn Transport>> {
        let url = websocket_scheme(endpoint)?;
        Ok(Box::new(WebSocketConnection::open(url).await?))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::WebSocket
    }
}
