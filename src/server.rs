//! ChatServer Actor implementation
//!
//! The central actor owning the `Router` (and through it the `Registry`).
//! Every membership change and every delivery goes through its single
//! command loop, so name claims are atomic and all recipients see
//! messages in the same order.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::event::ServerEvent;
use crate::message::ServerMessage;
use crate::router::Router;
use crate::types::ClientId;

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Claim a name for a connection
    Join {
        client_id: ClientId,
        requested: String,
        sender: mpsc::Sender<ServerMessage>,
        respond_to: oneshot::Sender<String>,
    },
    /// Release a name
    Leave { client_id: ClientId, name: String },
    /// Broadcast chat line
    Chat { name: String, body: String },
    /// Private message
    Whisper {
        name: String,
        target: String,
        body: String,
    },
    /// Message for one session only
    Reply { name: String, message: ServerMessage },
    /// Current roster
    Roster {
        respond_to: oneshot::Sender<Vec<String>>,
    },
}

/// The main ChatServer actor
///
/// Processes commands from connection handlers until every
/// `ServerHandle` is dropped.
pub struct ChatServer {
    router: Router,
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, events: broadcast::Sender<ServerEvent>) -> Self {
        Self {
            router: Router::new(events),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Join {
                client_id,
                requested,
                sender,
                respond_to,
            } => {
                let name = self.router.join(&requested, client_id, sender);
                if respond_to.send(name.clone()).is_err() {
                    // Handler vanished between asking and hearing back
                    debug!("Client {} gone before join reply", client_id);
                    self.router.leave(&name, client_id);
                }
            }
            ServerCommand::Leave { client_id, name } => {
                self.router.leave(&name, client_id);
            }
            ServerCommand::Chat { name, body } => {
                self.router.broadcast_chat(&name, &body);
            }
            ServerCommand::Whisper { name, target, body } => {
                self.router.deliver_private(&name, &target, &body);
            }
            ServerCommand::Reply { name, message } => {
                self.router.reply(&name, message);
            }
            ServerCommand::Roster { respond_to } => {
                let _ = respond_to.send(self.router.registry().snapshot());
            }
        }
    }
}

/// Cheap-to-clone handle for talking to the ChatServer actor
#[derive(Debug, Clone)]
pub struct ServerHandle {
    sender: mpsc::Sender<ServerCommand>,
    events: broadcast::Sender<ServerEvent>,
}

impl ServerHandle {
    /// Start a ChatServer actor and return a handle to it
    pub fn spawn(config: &ServerConfig) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        let (event_tx, _) = broadcast::channel(config.event_buffer);

        let server = ChatServer::new(cmd_rx, event_tx.clone());
        let task = tokio::spawn(server.run());

        (
            Self {
                sender: cmd_tx,
                events: event_tx,
            },
            task,
        )
    }

    /// Subscribe to the event feed
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Claim `requested` (or a suffixed variant); returns the assigned name
    pub async fn join(
        &self,
        client_id: ClientId,
        requested: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<String, AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(ServerCommand::Join {
            client_id,
            requested,
            sender,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| AppError::ServerClosed)
    }

    /// Release `name` held by `client_id`
    pub async fn leave(&self, client_id: ClientId, name: String) -> Result<(), AppError> {
        self.send(ServerCommand::Leave { client_id, name }).await
    }

    /// Broadcast a chat line from `name`
    pub async fn chat(&self, name: String, body: String) -> Result<(), AppError> {
        self.send(ServerCommand::Chat { name, body }).await
    }

    /// Whisper from `name` to `target`
    pub async fn whisper(&self, name: String, target: String, body: String) -> Result<(), AppError> {
        self.send(ServerCommand::Whisper { name, target, body })
            .await
    }

    /// Send a message to `name` only
    pub async fn reply(&self, name: String, message: ServerMessage) -> Result<(), AppError> {
        self.send(ServerCommand::Reply { name, message }).await
    }

    /// Current roster, sorted
    pub async fn roster(&self) -> Result<Vec<String>, AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(ServerCommand::Roster { respond_to: tx }).await?;
        rx.await.map_err(|_| AppError::ServerClosed)
    }

    async fn send(&self, cmd: ServerCommand) -> Result<(), AppError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| AppError::ServerClosed)
    }
}
