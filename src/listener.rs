//! TCP listener and server lifecycle
//!
//! Binds the endpoint, starts the ChatServer actor and spawns one
//! session task per accepted connection until stopped. Stopping is
//! abrupt: the endpoint closes, live sessions are aborted and the actor
//! is torn down without draining anything.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::server::ServerHandle;

/// Bound chat server, ready to accept connections
pub struct Listener {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    handle: ServerHandle,
    server_task: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Stops a running `Listener`
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
}

impl StopHandle {
    /// Close the endpoint and abort every live session
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Listener {
    /// Open the listening endpoint and start the ChatServer actor
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let (handle, server_task) = ServerHandle::spawn(&config);

        info!("Chat server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config: Arc::new(config),
            handle,
            server_task,
            cancel: CancellationToken::new(),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the ChatServer actor (event feed, roster)
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Handle for stopping `run` from elsewhere
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Accept connections until stopped
    pub async fn run(self) -> Result<(), AppError> {
        let Listener {
            listener,
            config,
            handle,
            server_task,
            cancel,
        } = self;

        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        let handle = handle.clone();
                        let config = Arc::clone(&config);

                        sessions.spawn(async move {
                            if let Err(e) = handle_connection(stream, handle, config).await {
                                warn!("Connection from {} ended with error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        drop(listener);
        debug!("Aborting {} live sessions", sessions.len());
        sessions.abort_all();
        while sessions.join_next().await.is_some() {}

        server_task.abort();
        info!("Chat server stopped");
        Ok(())
    }
}
