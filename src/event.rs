//! Observable server event feed
//!
//! Renderers (terminal log, web dashboard, desktop window) subscribe to
//! these instead of the protocol logic knowing anything about display.

use serde::Serialize;

use crate::message::ServerMessage;

/// Something that happened inside the chat server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A connection claimed a name
    SessionOpened { name: String },
    /// The requested name was taken and a suffixed one was assigned
    NameReassigned { requested: String, assigned: String },
    /// A chat, whisper or system notice was delivered
    MessageDelivered {
        message: ServerMessage,
        recipients: usize,
    },
    /// Membership changed; `names` is the roster just sent out
    RosterChanged { names: Vec<String> },
    /// A session released its name
    SessionClosed { name: String },
}
