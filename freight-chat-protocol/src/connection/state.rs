//! Observable connection state

use crate::message::ConversationId;
use std::fmt;

/// Lifecycle phase of the chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No session and no pending work
    #[default]
    Idle,
    /// Handshake in flight
    Connecting,
    /// Session established
    Connected,
    /// Waiting for automatic retry `attempt`
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Deliberate teardown in progress
    Closing,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionPhase::Idle => write!(f, "idle"),
            ConnectionPhase::Connecting => write!(f, "connecting"),
            ConnectionPhase::Connected => write!(f, "connected"),
            ConnectionPhase::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            ConnectionPhase::Closing => write!(f, "closing"),
        }
    }
}

/// Snapshot of the client's connection state
///
/// `connected` and `connecting` are derived from the phase, so they can
/// never be true at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    /// Current phase
    pub phase: ConnectionPhase,
    /// Last error reported, cleared on success or deliberate disconnect
    pub last_error: Option<String>,
    /// Automatic reconnect attempts since the last successful connection
    pub reconnect_attempts: u32,
    /// Conversation the session is bound to
    pub conversation: Option<ConversationId>,
}

impl ConnectionState {
    /// Whether a session is established
    pub fn connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// Whether a handshake is in flight
    pub fn connecting(&self) -> bool {
        self.phase == ConnectionPhase::Connecting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_and_connecting_exclusive() {
        for phase in [
            ConnectionPhase::Idle,
            ConnectionPhase::Connecting,
            ConnectionPhase::Connected,
            ConnectionPhase::Reconnecting { attempt: 1 },
            ConnectionPhase::Closing,
        ] {
            let state = ConnectionState {
                phase,
                ..Default::default()
            };
            assert!(!(state.connected() && state.connecting()));
        }
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(
            ConnectionPhase::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
    }
}
