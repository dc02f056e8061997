//! STOMP messaging layer
//!
//! Frame codec plus the handful of client frames the chat core sends.
//! Heart-beat intervals are negotiated the STOMP 1.2 way: each side only
//! commits to a rate the peer asked for.

mod frame;

pub use frame::{Command, Frame, FrameParser, Inbound};

use crate::message::ConversationId;
use crate::{ChatError, Result};
use std::time::Duration;

/// Versions offered in the CONNECT frame
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Heart-beat intervals in milliseconds, `0` meaning "none"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Interval at which the sender can emit heart-beats
    pub outgoing: u64,
    /// Interval at which the sender wants to receive heart-beats
    pub incoming: u64,
}

impl HeartBeat {
    /// Build from millisecond values
    pub fn new(outgoing: u64, incoming: u64) -> Self {
        Self { outgoing, incoming }
    }

    /// Parse a `heart-beat` header value such as `10000,10000`
    pub fn parse(value: &str) -> Result<Self> {
        let (outgoing, incoming) = value
            .split_once(',')
            .ok_or_else(|| ChatError::InvalidFrame(format!("bad heart-beat '{}'", value)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| ChatError::InvalidFrame(format!("bad heart-beat '{}'", value)))
        };
        Ok(Self {
            outgoing: parse(outgoing)?,
            incoming: parse(incoming)?,
        })
    }

    /// Header representation
    pub fn to_header(&self) -> String {
        format!("{},{}", self.outgoing, self.incoming)
    }

    /// Negotiate against the server's CONNECTED value
    ///
    /// Returns `(send_every, expect_every)` for the client side.
    pub fn negotiate(&self, server: HeartBeat) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: u64, theirs: u64| {
            if ours == 0 || theirs == 0 {
                None
            } else {
                Some(Duration::from_millis(ours.max(theirs)))
            }
        };
        (
            pick(self.outgoing, server.incoming),
            pick(self.incoming, server.outgoing),
        )
    }
}

/// CONNECT frame carrying the bearer credential
pub fn connect_frame(host: &str, credential: &str, heart_beat: HeartBeat) -> Frame {
    Frame::new(Command::Connect)
        .header("accept-version", ACCEPT_VERSION)
        .header("host", host)
        .header("heart-beat", heart_beat.to_header())
        .header("Authorization", format!("Bearer {}", credential))
}

/// SUBSCRIBE frame for a conversation topic
pub fn subscribe_frame(id: &str, destination: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .header("id", id)
        .header("destination", destination)
        .header("ack", "auto")
}

/// UNSUBSCRIBE frame
pub fn unsubscribe_frame(id: &str) -> Frame {
    Frame::new(Command::Unsubscribe).header("id", id)
}

/// SEND frame with a JSON body
pub fn send_frame(destination: &str, body: String) -> Frame {
    Frame::new(Command::Send)
        .header("destination", destination)
        .header("content-type", "application/json")
        .body(body)
}

/// DISCONNECT frame
pub fn disconnect_frame() -> Frame {
    Frame::new(Command::Disconnect)
}

/// Inbound topic for a conversation
pub fn conversation_topic(prefix: &str, conversation: ConversationId) -> String {
    format!("{}{}", prefix, conversation)
}

/// Human-readable reason from an ERROR frame
pub fn error_reason(frame: &Frame) -> String {
    match frame.get_header("message") {
        Some(message) if !message.is_empty() => message.to_string(),
        _ if !frame.body.trim().is_empty() => frame.body.trim().to_string(),
        _ => "unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_negotiation() {
        let client = HeartBeat::new(10_000, 10_000);

        let (send, expect) = client.negotiate(HeartBeat::new(0, 0));
        assert_eq!((send, expect), (None, None));

        let (send, expect) = client.negotiate(HeartBeat::new(5_000, 20_000));
        assert_eq!(send, Some(Duration::from_millis(20_000)));
        assert_eq!(expect, Some(Duration::from_millis(10_000)));

        let (send, expect) = HeartBeat::new(0, 10_000).negotiate(HeartBeat::new(5_000, 5_000));
        assert_eq!(send, None);
        assert_eq!(expect, Some(Duration::from_millis(10_000)));
    }

    #[test]
    fn test_heartbeat_parse() {
        assert_eq!(HeartBeat::parse("0,0").unwrap(), HeartBeat::default());
        assert_eq!(HeartBeat::parse(" 100 , 200 ").unwrap(), HeartBeat::new(100, 200));
        assert!(HeartBeat::parse("100").is_err());
        assert!(HeartBeat::parse("a,b").is_err());
    }

    #[test]
    fn test_connect_frame_carries_bearer() {
        let frame = connect_frame("localhost", "tok", HeartBeat::new(10_000, 10_000));
        assert_eq!(frame.get_header("Authorization"), Some("Bearer tok"));
        assert_eq!(frame.get_header("accept-version"), Some("1.2,1.1,1.0"));
        assert_eq!(frame.get_header("heart-beat"), Some("10000,10000"));
    }

    #[test]
    fn test_topic_naming() {
        assert_eq!(
            conversation_topic("/topic/conversation-", ConversationId(42)),
            "/topic/conversation-42"
        );
    }

    #[test]
    fn test_error_reason_fallbacks() {
        let frame = Frame::new(Command::Error).header("message", "Invalid token");
        assert_eq!(error_reason(&frame), "Invalid token");
        let frame = Frame::new(Command::Error).body("denied\n");
        assert_eq!(error_reason(&frame), "denied");
        assert_eq!(error_reason(&Frame::new(Command::Error)), "unknown error");
    }
}
