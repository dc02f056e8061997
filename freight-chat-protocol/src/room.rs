//! Reactive chat room handle
//!
//! [`ChatRoom`] is what a front end binds to: it combines the live client
//! with the REST store and republishes one merged, deduplicated message
//! list whenever either source changes.

use crate::api::MessageStore;
use crate::connection::{ChatClient, ChatEvent, EventListener};
use crate::message::{ChatMessage, ConversationId};
use crate::reconcile::merge_messages;
use crate::{ChatError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What a view renders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSnapshot {
    /// Selected conversation
    pub conversation: Option<ConversationId>,
    /// History and live messages, merged and ordered
    pub messages: Vec<ChatMessage>,
    /// Live connection flag
    pub connected: bool,
    /// Last error, if any
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct RoomState {
    snapshot: RoomSnapshot,
    history: Vec<ChatMessage>,
    live: Vec<ChatMessage>,
    marked_read: Option<ConversationId>,
}

struct RoomShared {
    client: ChatClient,
    store: Arc<dyn MessageStore>,
    credential: Option<String>,
    state: watch::Sender<RoomState>,
}

impl RoomShared {
    fn update(&self, apply: impl FnOnce(&mut RoomState)) {
        self.state.send_modify(|state| {
            apply(state);
            state.snapshot.messages = merge_messages(&state.history, &state.live);
        });
    }

    fn conversation(&self) -> Option<ConversationId> {
        self.state.borrow().snapshot.conversation
    }

    fn record_error(&self, error: &ChatError) {
        let message = error.to_string();
        self.update(|state| state.snapshot.error = Some(message));
    }

    fn on_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Message(message) => {
                if Some(message.conversation_id) == self.conversation() {
                    self.update(|state| state.live.push(message));
                } else {
                    debug!(
                        "Ignoring live message for conversation {}",
                        message.conversation_id
                    );
                }
            }
            ChatEvent::ConnectionChanged(true) => {
                self.update(|state| {
                    state.snapshot.connected = true;
                    state.snapshot.error = None;
                });
                if let Some(conversation) = self.conversation() {
                    if self.client.active_conversation() != Some(conversation) {
                        if let Err(e) = self.client.subscribe_to_conversation(conversation) {
                            debug!("Failed to restore subscription to {}: {}", conversation, e);
                        }
                    }
                }
            }
            ChatEvent::ConnectionChanged(false) => {
                self.update(|state| state.snapshot.connected = false);
            }
            ChatEvent::Error(message) => {
                self.update(|state| state.snapshot.error = Some(message));
            }
        }
    }
}

async fn pump(shared: Arc<RoomShared>, mut events: EventListener) {
    while let Some(event) = events.recv().await {
        shared.on_event(event);
    }
}

/// Stream of room snapshots
#[derive(Debug)]
pub struct RoomUpdates {
    receiver: watch::Receiver<RoomState>,
}

impl RoomUpdates {
    /// Wait for the next change, `None` once the room is gone
    pub async fn changed(&mut self) -> Option<RoomSnapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().snapshot.clone())
    }

    /// Latest snapshot
    pub fn current(&self) -> RoomSnapshot {
        self.receiver.borrow().snapshot.clone()
    }
}

/// Chat view state bound to one conversation at a time
pub struct ChatRoom {
    shared: Arc<RoomShared>,
    pump: JoinHandle<()>,
}

impl std::fmt::Debug for ChatRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRoom")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl ChatRoom {
    /// Create a room over a client and a message store
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        client: ChatClient,
        store: Arc<dyn MessageStore>,
        credential: Option<String>,
    ) -> Self {
        let events = client.listen();
        let (state, _) = watch::channel(RoomState {
            snapshot: RoomSnapshot {
                connected: client.is_connected(),
                ..Default::default()
            },
            ..Default::default()
        });
        let shared = Arc::new(RoomShared {
            client,
            store,
            credential,
            state,
        });
        let pump = tokio::spawn(pump(shared.clone(), events));
        Self { shared, pump }
    }

    /// Underlying chat client
    pub fn client(&self) -> &ChatClient {
        &self.shared.client
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> RoomSnapshot {
        self.shared.state.borrow().snapshot.clone()
    }

    /// Subscribe to snapshot changes
    pub fn updates(&self) -> RoomUpdates {
        RoomUpdates {
            receiver: self.shared.state.subscribe(),
        }
    }

    /// Switch to a conversation
    ///
    /// Drops the live messages of the previous one, binds the live session
    /// when connected, refetches history and marks the conversation read
    /// once per selection.
    pub async fn select_conversation(&self, conversation: ConversationId) -> Result<()> {
        let switched = self.shared.conversation() != Some(conversation);
        self.shared.update(|state| {
            state.snapshot.conversation = Some(conversation);
            state.live.clear();
            if switched {
                state.history.clear();
                state.marked_read = None;
            }
        });

        if self.shared.client.is_connected() {
            if let Err(e) = self.shared.client.subscribe_to_conversation(conversation) {
                debug!("Subscription deferred: {}", e);
            }
        }

        self.refresh_history().await?;

        let unread = self.shared.state.borrow().marked_read != Some(conversation);
        if unread {
            match self.shared.store.mark_read(conversation).await {
                Ok(()) => self
                    .shared
                    .update(|state| state.marked_read = Some(conversation)),
                Err(e) => warn!("Failed to mark conversation {} read: {}", conversation, e),
            }
        }
        Ok(())
    }

    /// Refetch history for the selected conversation
    pub async fn refresh_history(&self) -> Result<()> {
        let Some(conversation) = self.shared.conversation() else {
            return Ok(());
        };

        let records = match self.shared.store.fetch_history(conversation).await {
            Ok(records) => records,
            Err(e) => {
                self.shared.record_error(&e);
                return Err(e);
            }
        };
        let history: Vec<ChatMessage> = records.iter().map(ChatMessage::from_history).collect();

        self.shared.update(|state| {
            // A newer selection wins over a slow fetch
            if state.snapshot.conversation == Some(conversation) {
                state.history = history;
            }
        });
        Ok(())
    }

    /// Open the live session with the room's credential
    pub async fn connect(&self) -> Result<()> {
        let Some(credential) = self.shared.credential.as_deref() else {
            let error = ChatError::MissingCredential;
            self.shared.record_error(&error);
            return Err(error);
        };
        self.shared.client.connect(credential).await
    }

    /// Close the live session and forget live messages
    pub fn disconnect(&self) {
        self.shared.client.disconnect();
        self.shared.update(|state| {
            state.live.clear();
            state.snapshot.error = None;
            state.snapshot.connected = false;
        });
    }

    /// Persist a message, publish it live when possible, then refetch
    pub async fn send(&self, content: &str) -> Result<()> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(());
        }
        let Some(conversation) = self.shared.conversation() else {
            let error = ChatError::NoActiveConversation;
            self.shared.record_error(&error);
            return Err(error);
        };

        if let Err(e) = self.shared.store.create_message(conversation, content).await {
            self.shared.record_error(&e);
            return Err(e);
        }

        if self.shared.client.is_connected() {
            if let Err(e) = self.shared.client.send_message(Some(conversation), content) {
                debug!("Live publish skipped: {}", e);
            }
        }

        self.refresh_history().await
    }

    /// Clear the error banner
    pub fn clear_error(&self) {
        self.shared.update(|state| state.snapshot.error = None);
    }
}

impl Drop for ChatRoom {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
