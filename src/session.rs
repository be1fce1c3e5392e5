//! Session struct definition
//!
//! Represents one registered participant: its claimed name and the
//! bounded outbound queue drained by that connection's writer.

use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Lifecycle of a client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, waiting for the requested name
    Connecting,
    /// Name claimed, reading commands
    Registered { name: String },
    /// Cleanup done (terminal)
    Closed,
}

/// Registered participant
#[derive(Debug)]
pub struct Session {
    /// Claimed display name (unique while registered)
    pub name: String,
    /// Connection that owns this session
    pub client_id: ClientId,
    /// Server → Client message queue
    pub sender: mpsc::Sender<ServerMessage>,
    /// Registration time
    pub connected_at: Instant,
}

impl Session {
    /// Create a new session for an already-claimed name
    pub fn new(name: String, client_id: ClientId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            name,
            client_id,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Queue a message for this session without waiting
    ///
    /// A full queue drops the message rather than stalling the caller,
    /// so one slow reader never holds up delivery to everyone else.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_send() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = Session::new("Alice".to_string(), ClientId::new(), tx);

        session.send(ServerMessage::joined("Alice")).unwrap();

        assert_eq!(rx.recv().await, Some(ServerMessage::joined("Alice")));
    }

    #[test]
    fn test_session_send_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new("Alice".to_string(), ClientId::new(), tx);

        assert!(session.send(ServerMessage::system("one")).is_ok());
        assert_eq!(
            session.send(ServerMessage::system("two")),
            Err(SendError::QueueFull)
        );
    }

    #[test]
    fn test_session_send_closed() {
        let (tx, rx) = mpsc::channel(1);
        let session = Session::new("Alice".to_string(), ClientId::new(), tx);
        drop(rx);

        assert_eq!(
            session.send(ServerMessage::system("gone")),
            Err(SendError::ChannelClosed)
        );
    }
}
