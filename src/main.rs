//! Line chat server - Entry Point
//!
//! Binds the listener, logs the event feed and stops on Ctrl-C.

use std::env;

use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use line_chat::{Listener, ServerConfig, ServerEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("line_chat=info")),
        )
        .init();

    // Bind address from the first argument, or the default
    let config = ServerConfig::from_args(env::args().skip(1));

    let listener = Listener::bind(config).await?;
    let stop = listener.stop_handle();

    // Operator display: print the event feed
    let mut events = listener.handle().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event log lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                stop.stop();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    listener.run().await?;
    Ok(())
}

fn log_event(event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => info!(target: "line_chat::events", "{}", json),
        Err(e) => error!("Failed to serialize event: {}", e),
    }
}
