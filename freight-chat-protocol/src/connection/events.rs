//! Chat events and the listener registry
//!
//! Any number of listeners may be registered. Each one owns an unbounded
//! channel and is unregistered when dropped or explicitly removed.

use crate::message::ChatMessage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::trace;

/// Events emitted by the chat client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A live message arrived on the active subscription
    Message(ChatMessage),

    /// The session was established (`true`) or lost (`false`)
    ConnectionChanged(bool),

    /// A non-fatal failure, carrying a human-readable reason
    Error(String),
}

#[derive(Debug, Default)]
struct ListenerTable {
    next_id: u64,
    listeners: Vec<(u64, mpsc::UnboundedSender<ChatEvent>)>,
}

fn lock(table: &Mutex<ListenerTable>) -> MutexGuard<'_, ListenerTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fan-out of chat events to registered listeners
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    table: Arc<Mutex<ListenerTable>>,
}

impl EventBus {
    /// Create a bus with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener
    pub fn listen(&self) -> EventListener {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut table = lock(&self.table);
        let id = table.next_id;
        table.next_id += 1;
        table.listeners.push((id, tx));

        EventListener {
            id,
            table: Arc::downgrade(&self.table),
            receiver: rx,
        }
    }

    /// Deliver an event to every listener, in registration order
    pub fn emit(&self, event: ChatEvent) {
        trace!("Emitting chat event {:?}", event);
        let mut table = lock(&self.table);
        table
            .listeners
            .retain(|(_, listener)| listener.send(event.clone()).is_ok());
    }
}

/// Handle returned by [`EventBus::listen`]
#[derive(Debug)]
pub struct EventListener {
    id: u64,
    table: Weak<Mutex<ListenerTable>>,
    receiver: mpsc::UnboundedReceiver<ChatEvent>,
}

impl EventListener {
    /// Wait for the next event, `None` once the client is gone
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        self.receiver.try_recv().ok()
    }

    /// Unregister explicitly
    pub fn remove(self) {
        drop(self);
    }

    fn unregister(&self) {
        if let Some(table) = self.table.upgrade() {
            lock(&table).listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_multiple_listeners_receive_events() {
        let bus = EventBus::new();
        let mut first = bus.listen();
        let mut second = bus.listen();

        bus.emit(ChatEvent::ConnectionChanged(true));

        assert_eq!(first.recv().await, Some(ChatEvent::ConnectionChanged(true)));
        assert_eq!(second.recv().await, Some(ChatEvent::ConnectionChanged(true)));
    }

    #[test]
    fn test_recv_waits_for_emit() {
        let bus = EventBus::new();
        let mut listener = bus.listen();
        let mut recv = tokio_test::task::spawn(listener.recv());

        tokio_test::assert_pending!(recv.poll());
        bus.emit(ChatEvent::ConnectionChanged(true));
        assert!(recv.is_woken());
        assert_eq!(
            tokio_test::assert_ready!(recv.poll()),
            Some(ChatEvent::ConnectionChanged(true))
        );
    }

    fn listener_count(bus: &EventBus) -> usize {
        lock(&bus.table).listeners.len()
    }

    #[test]
    fn test_drop_unregisters() {
        let bus = EventBus::new();
        let listener = bus.listen();
        let kept = bus.listen();
        assert_eq!(listener_count(&bus), 2);

        drop(listener);
        assert_eq!(listener_count(&bus), 1);

        kept.remove();
        assert_eq!(listener_count(&bus), 0);
    }

    #[test]
    fn test_events_keep_order() {
        let bus = EventBus::new();
        let mut listener = bus.listen();

        bus.emit(ChatEvent::Error("a".into()));
        bus.emit(ChatEvent::ConnectionChanged(false));

        assert_eq!(listener.try_recv(), Some(ChatEvent::Error("a".into())));
        assert_eq!(listener.try_recv(), Some(ChatEvent::ConnectionChanged(false)));
        assert_eq!(listener.try_recv(), None);
    }

    #[test]
    fn test_listener_outlives_bus() {
        let bus = EventBus::new();
        let mut listener = bus.listen();
        drop(bus);
        assert_eq!(listener.try_recv(), None);
        drop(listener);
    }
}
