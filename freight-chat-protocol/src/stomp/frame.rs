//! STOMP frame encoding and decoding

use crate::{ChatError, Result};
use std::fmt;

/// STOMP frame commands used by the chat client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Client handshake
    Connect,
    /// Server handshake acknowledgement
    Connected,
    /// Client publish
    Send,
    /// Client topic subscription
    Subscribe,
    /// Client topic unsubscription
    Unsubscribe,
    /// Client graceful close
    Disconnect,
    /// Server delivery on a subscription
    Message,
    /// Server receipt
    Receipt,
    /// Server error, the server closes the connection afterwards
    Error,
}

impl Command {
    /// Wire name of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        Ok(match value {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => {
                return Err(ChatError::InvalidFrame(format!("unknown command '{}'", other)))
            }
        })
    }

    // STOMP 1.2 never escapes CONNECT and CONNECTED headers
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command
    pub command: Command,
    /// Headers in wire order; the first occurrence of a name wins
    pub headers: Vec<(String, String)>,
    /// Frame body
    pub body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Builder-style header append
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builder-style body
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header value
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Encode the frame including the trailing NUL
    ///
    /// Frames with a body carry a `content-length` header unless one was set.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() && self.get_header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChatError::InvalidFrame(format!(
                    "undefined header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// One decoded unit of the inbound stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Bare end-of-line, a server heart-beat
    Heartbeat,
    /// A complete frame
    Frame(Frame),
}

/// Incremental STOMP decoder
///
/// Transports may split a frame over several messages or pack several frames
/// into one; the parser buffers until a complete frame is available.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: String,
}

impl FrameParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received text
    pub fn push(&mut self, data: &str) {
        self.buffer.push_str(data);
    }

    /// Pop the next heart-beat or frame, `None` until more data arrives
    pub fn next_inbound(&mut self) -> Result<Option<Inbound>> {
        if self.buffer.starts_with("\r\n") {
            self.buffer.drain(..2);
            return Ok(Some(Inbound::Heartbeat));
        }
        if self.buffer.starts_with('\n') {
            self.buffer.drain(..1);
            return Ok(Some(Inbound::Heartbeat));
        }
        if self.buffer.is_empty() || self.buffer == "\r" {
            return Ok(None);
        }

        let Some(header_end) = find_header_end(&self.buffer) else {
            return Ok(None);
        };
        let (head, body_start) = header_end;
        let (command, headers) = parse_head(&self.buffer[..head])?;

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .map(|(_, value)| {
                value.trim().parse::<usize>().map_err(|_| {
                    ChatError::InvalidFrame(format!("bad content-length '{}'", value))
                })
            })
            .transpose()?;

        let body_end = match content_length {
            Some(length) => {
                let end = body_start + length;
                if self.buffer.len() <= end {
                    return Ok(None);
                }
                if self.buffer.as_bytes()[end] != 0 {
                    return Err(ChatError::InvalidFrame(
                        "frame body not terminated by NUL".to_string(),
                    ));
                }
                end
            }
            None => match self.buffer[body_start..].find('\0') {
                Some(offset) => body_start + offset,
                None => return Ok(None),
            },
        };

        let body = self
            .buffer
            .get(body_start..body_end)
            .ok_or_else(|| ChatError::InvalidFrame("body is not valid UTF-8".to_string()))?
            .to_string();
        self.buffer.drain(..=body_end);

        Ok(Some(Inbound::Frame(Frame {
            command,
            headers,
            body,
        })))
    }
}

// Returns (end of header block, start of body)
fn find_header_end(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|i| (i, i + 2));
    let crlf = buffer.find("\r\n\r\n").map(|i| (i, i + 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_head(head: &str) -> Result<(Command, Vec<(String, String)>)> {
    let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));
    let command = Command::parse(lines.next().unwrap_or_default())?;
    let escaped = command.escapes_headers();

    let mut headers = Vec::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ChatError::InvalidFrame(format!("malformed header '{}'", line)))?;
        if escaped {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    Ok((command, headers))
}
