//! Message protocol definitions
//!
//! Newline-delimited text protocol. Client lines are decoded once into
//! `ClientCommand`; server traffic is built as typed `ServerMessage`
//! values and rendered to wire text only when written to a socket.

use std::fmt;

use serde::Serialize;

/// Prefix that turns a client line into a whisper
pub const WHISPER_PREFIX: &str = "/w ";

/// Prefix of a server roster line
pub const ROSTER_PREFIX: &str = "__USERS__:";

/// Prefix of a server system notice
pub const SYSTEM_PREFIX: &str = "[System] ";

/// Usage hint sent back on a malformed whisper
pub const WHISPER_USAGE: &str = "Usage: /w <name> <message>";

/// Client → Server command
///
/// Decoded from every line after the first (the first line is the
/// requested display name and never goes through `parse`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Broadcast chat line
    Chat { body: String },
    /// Private message to one named session
    Whisper { target: String, body: String },
    /// `/w ` line with fewer than three space-separated parts
    MalformedWhisper,
    /// Graceful disconnect
    Quit,
    /// Blank line, ignored
    Empty,
}

impl ClientCommand {
    /// Decode one client line
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("/quit") {
            return ClientCommand::Quit;
        }

        if line.starts_with(WHISPER_PREFIX) {
            // "/w", target, rest of the line with its spaces intact
            let mut parts = line.splitn(3, ' ');
            let _prefix = parts.next();
            return match (parts.next(), parts.next()) {
                (Some(target), Some(body)) => ClientCommand::Whisper {
                    target: target.trim().to_string(),
                    body: body.to_string(),
                },
                _ => ClientCommand::MalformedWhisper,
            };
        }

        if trimmed.is_empty() {
            ClientCommand::Empty
        } else {
            ClientCommand::Chat {
                body: line.to_string(),
            }
        }
    }
}

/// Which side of a whisper a `Private` message is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Copy delivered to the target
    Inbound,
    /// Confirmation delivered to the sender
    Outbound,
}

/// Server → Client message
///
/// Immutable once built. `Display` renders the exact wire line
/// (without the trailing newline, which the line codec adds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join/leave/error notice
    System { text: String },
    /// Broadcast chat from `sender`
    Chat { sender: String, body: String },
    /// Whisper between two sessions
    Private {
        sender: String,
        target: String,
        body: String,
        direction: Direction,
    },
    /// Full roster snapshot
    Roster { names: Vec<String> },
}

impl ServerMessage {
    /// Build a system notice
    pub fn system(text: impl Into<String>) -> Self {
        ServerMessage::System { text: text.into() }
    }

    /// Join announcement
    pub fn joined(name: &str) -> Self {
        Self::system(format!("{} joined the chat", name))
    }

    /// Departure announcement
    pub fn left(name: &str) -> Self {
        Self::system(format!("{} left the chat", name))
    }

    /// Reply to an unknown whisper target
    pub fn user_not_found(target: &str) -> Self {
        Self::system(format!("User not found: {}", target))
    }

    /// Render the wire line
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::System { text } => write!(f, "{}{}", SYSTEM_PREFIX, text),
            ServerMessage::Chat { sender, body } => write!(f, "{}: {}", sender, body),
            ServerMessage::Private {
                sender,
                body,
                direction: Direction::Inbound,
                ..
            } => write!(f, "[Private from {}]: {}", sender, body),
            ServerMessage::Private {
                target,
                body,
                direction: Direction::Outbound,
                ..
            } => write!(f, "[Private to {}]: {}", target, body),
            ServerMessage::Roster { names } => write!(f, "{}{}", ROSTER_PREFIX, names.join(",")),
        }
    }
}
