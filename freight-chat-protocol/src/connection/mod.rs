//! Chat connection management
//!
//! - [`ChatClient`]: connection lifecycle, subscription and send path
//! - [`ChatEvent`] / [`EventListener`]: multi-listener notifications
//! - [`ConnectionState`]: observable state snapshot

pub mod events;
pub mod manager;
pub mod state;

pub use events::{ChatEvent, EventBus, EventListener};
pub use manager::ChatClient;
pub use state::{ConnectionPhase, ConnectionState};
