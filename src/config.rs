//! Server configuration
//!
//! Bind address plus the sizes of the internal queues. Everything has a
//! default; the binary only overrides the address from argv.

use std::time::Duration;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:1234";

/// Channel buffer size for server commands
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Per-session outbound queue size; overflowing it disconnects the session
pub const DEFAULT_OUTBOUND_BUFFER: usize = 1024;

/// Event feed buffer size
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Longest accepted client line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// How long a closing session may spend flushing its queue
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime settings for the listener and the ChatServer actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_addr: String,
    /// Capacity of the handler → ChatServer command channel
    pub command_buffer: usize,
    /// Capacity of each session's outbound queue
    pub outbound_buffer: usize,
    /// Capacity of the event feed (lagging subscribers skip ahead)
    pub event_buffer: usize,
    /// Longest accepted client line
    pub max_line_length: usize,
    /// Grace period for writing queued lines after a session closes
    pub flush_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            command_buffer: DEFAULT_COMMAND_BUFFER,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Build from command line arguments (program name already skipped)
    ///
    /// The first argument, if any, is the bind address.
    pub fn from_args<I>(mut args: I) -> Self
    where
        I: Iterator<Item = String>,
    {
        let mut config = Self::default();
        if let Some(addr) = args.next() {
            config.bind_addr = addr;
        }
        config
    }

    /// Override the bind address
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Override the per-session outbound queue size
    pub fn with_outbound_buffer(mut self, size: usize) -> Self {
        self.outbound_buffer = size.max(1);
        self
    }

    /// Override the longest accepted line
    pub fn with_max_line_length(mut self, len: usize) -> Self {
        self.max_line_length = len;
        self
    }

    /// Override the closing flush grace period
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:1234");
        assert_eq!(config.command_buffer, 256);
        assert_eq!(config.outbound_buffer, 1024);
        assert_eq!(config.flush_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_args() {
        let config = ServerConfig::from_args(vec!["0.0.0.0:9000".to_string()].into_iter());
        assert_eq!(config.bind_addr, "0.0.0.0:9000");

        let config = ServerConfig::from_args(std::iter::empty());
        assert_eq!(config.bind_addr, DEFAULT_ADDR);
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::default()
            .with_bind_addr("127.0.0.1:0")
            .with_outbound_buffer(0)
            .with_max_line_length(64)
            .with_flush_timeout(Duration::from_millis(100));
        assert_eq!(config.bind_addr, "127.0.0.1:0");
        assert_eq!(config.outbound_buffer, 1);
        assert_eq!(config.max_line_length, 64);
        assert_eq!(config.flush_timeout, Duration::from_millis(100));
    }
}
