//! Multi-user line-based TCP chat server library
//!
//! Participants connect over plain TCP, claim a unique display name with
//! their first line, then chat, whisper and watch a live roster.
//!
//! # Features
//! - Unique display names (collisions become `name_1`, `name_2`, …)
//! - Broadcast chat to every participant
//! - Private messages with `/w <name> <text>`
//! - Roster snapshots pushed on every join and departure
//! - Event feed for renderers and operator logs
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor; it owns the `Router`, which owns
//!   the `Registry`, so all membership changes are serialized
//! - Each connection runs a read loop plus a writer draining its own
//!   bounded outbound queue, so a slow client never stalls the others
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use line_chat::{Listener, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default().with_bind_addr("127.0.0.1:1234");
//!     let listener = Listener::bind(config).await.unwrap();
//!     let stop = listener.stop_handle();
//!
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         stop.stop();
//!     });
//!
//!     listener.run().await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod listener;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use error::{AppError, SendError};
pub use event::ServerEvent;
pub use handler::{handle_connection, run_session};
pub use listener::{Listener, StopHandle};
pub use message::{ClientCommand, Direction, ServerMessage};
pub use registry::Registry;
pub use router::Router;
pub use server::{ChatServer, ServerCommand, ServerHandle};
pub use session::{Session, SessionState};
pub use types::ClientId;
