//! Error types for the chat server
//!
//! Defines connection-level errors and outbound queue errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// All of these end the affected connection. None of them reach
/// other sessions or the listener.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the client socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (over-long line or invalid UTF-8)
    #[error("Line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// The ChatServer actor is gone (server shutting down)
    #[error("Chat server closed")]
    ServerClosed,
}

/// Outbound message errors
///
/// Delivery is fire-and-forget, so callers log these and move on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session's writer has gone away
    #[error("Channel closed")]
    ChannelClosed,

    /// The session's outbound queue is full; the message was dropped
    #[error("Outbound queue full")]
    QueueFull,
}
