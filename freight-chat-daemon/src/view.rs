//! Terminal rendering of the chat room

use chrono::Local;
use freight_chat_protocol::{ChatError, ChatMessage, Conversation, RoomSnapshot};

/// Format one message as `[HH:MM] sender: content`
pub fn format_message(message: &ChatMessage) -> String {
    let time = message
        .parsed_timestamp()
        .map(|at| at.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    format!("[{}] {}: {}", time, message.sender, message.content)
}

/// Format a conversation list row
pub fn format_conversation(conversation: &Conversation) -> String {
    let mut row = format!(
        "#{:<6} {}",
        conversation.id.0,
        conversation.other_user_name.as_deref().unwrap_or("?")
    );
    if let Some(company) = &conversation.other_user_company {
        row.push_str(&format!(" ({})", company));
    }
    if let Some(unread) = conversation.unread_count {
        row.push_str(&format!(" [{} unread]", unread));
    }
    if let Some(preview) = &conversation.last_message_preview {
        row.push_str(&format!(" - {}", preview));
    }
    row
}

/// Follow-up hint for a failed connect, if the user can do anything about it
pub fn connect_hint(error: &ChatError) -> Option<&'static str> {
    if error.requires_user_action() {
        Some("Check the token and endpoint (freight-chat dump-config)")
    } else if error.is_recoverable() {
        Some("Type /reconnect to try again")
    } else {
        None
    }
}

/// Incremental printer for room snapshots
///
/// Prints only what changed since the last snapshot. When the merged list
/// was reordered (history arriving after live echoes) the whole list is
/// printed again.
#[derive(Debug, Default)]
pub struct ChatView {
    shown: Vec<ChatMessage>,
    connected: Option<bool>,
    error: Option<String>,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for a new snapshot
    pub fn render(&mut self, snapshot: &RoomSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if self.connected != Some(snapshot.connected) {
            self.connected = Some(snapshot.connected);
            lines.push(if snapshot.connected {
                "* connected".to_string()
            } else {
                "* offline".to_string()
            });
        }

        if snapshot.error != self.error {
            if let Some(error) = &snapshot.error {
                lines.push(format!("! {}", error));
            }
            self.error = snapshot.error.clone();
        }

        let extends = snapshot.messages.len() >= self.shown.len()
            && snapshot.messages[..self.shown.len()] == self.shown[..];
        let fresh = if extends {
            &snapshot.messages[self.shown.len()..]
        } else {
            lines.push("* ---".to_string());
            &snapshot.messages[..]
        };
        lines.extend(fresh.iter().map(format_message));
        self.shown = snapshot.messages.clone();

        lines
    }
}
