//! Chat Transport Layer
//!
//! The transport layer supports plain WebSocket and SockJS sessions
//! through a common trait interface. STOMP framing sits on top and never
//! sees which one is in use.

mod r#trait;
pub mod sockjs;
pub mod websocket;

pub use r#trait::{websocket_scheme, Transport, TransportFactory, TransportType};
pub use sockjs::{SockJsConnection, SockJsFrame, SockJsTransportFactory};
pub use websocket::{WebSocketConnection, WebSocketTransportFactory};

use std::sync::Arc;

/// Factory for the configured transport type
pub fn factory_for(transport: TransportType) -> Arc<dyn TransportFactory> {
    match transport {
        TransportType::WebSocket => Arc::new(WebSocketTransportFactory::new()),
        TransportType::SockJs => Arc::new(SockJsTransportFactory::new()),
    }
}
