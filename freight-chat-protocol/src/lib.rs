//! Freight Chat Protocol Implementation
//!
//! Real-time chat core for the freight marketplace: a supervised STOMP
//! session over WebSocket or SockJS, single-conversation subscriptions,
//! the outbound send path, and the reconciler that merges REST history
//! with live pushes into one ordered view.

pub mod api;
pub mod config;
pub mod connection;
pub mod message;
pub mod reconcile;
pub mod recovery;
pub mod room;
pub mod stomp;
pub mod subscription;
pub mod transport;

mod error;

pub use api::{ApiClient, Conversation, MessageStore};
pub use config::ChatConfig;
pub use connection::{
    ChatClient, ChatEvent, ConnectionPhase, ConnectionState, EventBus, EventListener,
};
pub use error::{ChatError, Result};
pub use message::{ChatMessage, ConversationId, HistoryRecord, MessageId, OutboundPayload};
pub use reconcile::{merge, merge_messages};
pub use recovery::ReconnectionStrategy;
pub use room::{ChatRoom, RoomSnapshot, RoomUpdates};
pub use subscription::{Subscription, SubscriptionManager};
pub use transport::{
    factory_for, SockJsTransportFactory, Transport, TransportFactory, TransportType,
    WebSocketTransportFactory,
};

/// STOMP version preferred in the handshake
pub const STOMP_VERSION: &str = "1.2";

#[cfg(test)]
pub mod test_utils;
