//! In-memory transport for unit tests
//!
//! The factory hands the server end of every new connection to the test
//! through a channel, so tests script the broker side frame by frame.

use crate::config::ChatConfig;
use crate::stomp::{Command, Frame, FrameParser, Inbound};
use crate::transport::{Transport, TransportFactory, TransportType};
use crate::{ChatError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Configuration with heart-beats disabled
pub fn test_config() -> ChatConfig {
    let mut config = ChatConfig::new(Url::parse("http://localhost:8080/chat").unwrap());
    config.transport = TransportType::WebSocket;
    config.heartbeat_outgoing = Duration::ZERO;
    config.heartbeat_incoming = Duration::ZERO;
    config
}

/// Client side of an in-memory connection
#[derive(Debug)]
pub struct MemoryTransport {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::WebSocket
    }

    fn remote_address(&self) -> String {
        "memory://broker".to_string()
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.to_server
            .send(text.to_string())
            .map_err(|_| ChatError::ConnectionClosed("peer gone".to_string()))
    }

    async fn receive_text(&mut self) -> Result<Option<String>> {
        Ok(self.from_server.recv().await)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Factory creating [`MemoryTransport`]s
#[derive(Debug)]
pub struct MemoryTransportFactory {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportFactory for MemoryTransportFactory {
    async fn connect(&self, _endpoint: &Url) -> Result<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ChatError::Transport("connection refused".to_string()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            from_client,
            to_client: Some(to_client),
            parser: FrameParser::new(),
        };
        self.peers
            .send(peer)
            .map_err(|_| ChatError::Transport("test server gone".to_string()))?;

        Ok(Box::new(MemoryTransport {
            to_server,
            from_server,
        }))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::WebSocket
    }
}

/// Test-side handle accepting connections
pub struct MemoryServer {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
    refuse: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryServer {
    /// Wait for the next client connection
    pub async fn accept_connection(&mut self) -> MemoryPeer {
        self.peers.recv().await.expect("factory dropped")
    }

    /// Make subsequent connects fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connect calls seen by the factory
    pub fn connection_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Server end of one connection
pub struct MemoryPeer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: Option<mpsc::UnboundedSender<String>>,
    parser: FrameParser,
}

impl MemoryPeer {
    /// Next raw chunk written by the client
    pub async fn next_raw(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame written by the client, skipping heart-beats
    pub async fn next_frame(&mut self) -> Frame {
        loop {
            match self.parser.next_inbound().unwrap() {
                Some(Inbound::Frame(frame)) => return frame,
                Some(Inbound::Heartbeat) => continue,
                None => {
                    let chunk = self.next_raw().await.expect("client closed");
                    self.parser.push(&chunk);
                }
            }
        }
    }

    /// Write a frame to the client
    pub fn send_frame(&self, frame: Frame) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(frame.encode());
        }
    }

    /// Read CONNECT and answer CONNECTED without heart-beats
    pub async fn complete_handshake(&mut self) -> Frame {
        self.complete_handshake_with_heartbeat("0,0").await
    }

    /// Read CONNECT and answer CONNECTED with the given heart-beat header
    pub async fn complete_handshake_with_heartbeat(&mut self, heart_beat: &str) -> Frame {
        let connect = self.next_frame().await;
        assert_eq!(connect.command, Command::Connect);
        self.send_frame(
            Frame::new(Command::Connected)
                .header("version", "1.2")
                .header("heart-beat", heart_beat),
        );
        connect
    }

    /// Push a MESSAGE frame on a subscription
    pub fn deliver(&self, subscription: &str, destination: &str, body: &str) {
        self.send_frame(
            Frame::new(Command::Message)
                .header("subscription", subscription)
                .header("destination", destination)
                .header("message-id", "1")
                .body(body),
        );
    }

    /// Close the connection from the server side
    pub fn close(&mut self) {
        self.to_client = None;
    }
}

/// Factory plus its test-side server
pub fn memory_transport() -> (Arc<dyn TransportFactory>, MemoryServer) {
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();
    let refuse = Arc::new(AtomicBool::new(false));
    let attempts = Arc::new(AtomicUsize::new(0));

    let factory = MemoryTransportFactory {
        peers: peers_tx,
        refuse: refuse.clone(),
        attempts: attempts.clone(),
    };
    let server = MemoryServer {
        peers: peers_rx,
        refuse,
        attempts,
    };
    (Arc::new(factory), server)
}
