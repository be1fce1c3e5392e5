//! Client connection handler
//!
//! Drives one connection through `Connecting → Registered → Closed`:
//! the first line claims a name, every later line is decoded and handed
//! to the ChatServer, and whichever way the connection ends the same
//! cleanup runs once. Outbound traffic is written by a separate writer
//! task draining the session's queue, never by the read loop.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::{ClientCommand, ServerMessage, WHISPER_USAGE};
use crate::server::ServerHandle;
use crate::session::SessionState;
use crate::types::ClientId;

/// Why a registered session ended
#[derive(Debug)]
enum CloseReason {
    /// Client sent the quit command
    Quit,
    /// Client closed the stream
    Eof,
    /// Reading failed
    ReadFailed(AppError),
    /// The writer stopped (write error or queue closed)
    WriterStopped,
    /// The ChatServer actor is gone
    ServerClosed,
}

/// Handle a new TCP connection
pub async fn handle_connection(
    stream: TcpStream,
    handle: ServerHandle,
    config: Arc<ServerConfig>,
) -> Result<(), AppError> {
    let peer = stream.peer_addr().ok();
    let (read_half, write_half) = stream.into_split();
    run_session(read_half, write_half, peer, handle, &config).await
}

/// Run the session state machine over any byte stream pair
pub async fn run_session<R, W>(
    reader: R,
    writer: W,
    peer: Option<SocketAddr>,
    handle: ServerHandle,
    config: &ServerConfig,
) -> Result<(), AppError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let client_id = ClientId::new();
    let codec = LinesCodec::new_with_max_length(config.max_line_length);
    let mut lines = FramedRead::new(reader, codec.clone());
    let sink = FramedWrite::new(writer, codec);

    let mut state = SessionState::Connecting;
    debug!("Client {} connecting from {:?}", client_id, peer);

    // First line is the requested name
    let first = match lines.next().await {
        Some(Ok(line)) => line,
        Some(Err(e)) => {
            transition(client_id, &mut state, SessionState::Closed);
            return Err(e.into());
        }
        None => {
            debug!("Client {} closed before sending a name", client_id);
            transition(client_id, &mut state, SessionState::Closed);
            return Ok(());
        }
    };

    let (msg_tx, msg_rx) = mpsc::channel(config.outbound_buffer);
    let requested = requested_name(&first, peer, client_id);
    let name = handle.join(client_id, requested, msg_tx).await?;
    transition(
        client_id,
        &mut state,
        SessionState::Registered { name: name.clone() },
    );

    // Aborted if this session task is itself aborted
    let mut writer = AbortOnDropHandle::new(tokio::spawn(write_loop(sink, msg_rx)));
    let mut writer_done = false;

    let reason = tokio::select! {
        reason = read_loop(&mut lines, &handle, &name) => reason,
        _ = &mut writer => {
            writer_done = true;
            CloseReason::WriterStopped
        }
    };

    // Single cleanup path for every way out of the loop
    info!("'{}' ({}) closing: {:?}", name, client_id, reason);
    if handle.leave(client_id, name.clone()).await.is_err() {
        debug!("Server already closed while '{}' was leaving", name);
    }
    // Leaving drops the registry's sender, so the writer flushes what is
    // queued and then shuts the socket down
    if !writer_done && timeout(config.flush_timeout, &mut writer).await.is_err() {
        warn!("'{}' did not take its queued lines in time, dropping", name);
        writer.abort();
    }
    transition(client_id, &mut state, SessionState::Closed);

    match reason {
        CloseReason::ReadFailed(e) => Err(e),
        CloseReason::ServerClosed => Err(AppError::ServerClosed),
        CloseReason::Quit | CloseReason::Eof | CloseReason::WriterStopped => Ok(()),
    }
}

/// Read lines until quit, end of stream or failure
async fn read_loop<S>(lines: &mut S, handle: &ServerHandle, name: &str) -> CloseReason
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    while let Some(result) = lines.next().await {
        let line = match result {
            Ok(line) => line,
            Err(e) => return CloseReason::ReadFailed(e.into()),
        };

        debug!("'{}' sent {:?}", name, line);

        let sent = match ClientCommand::parse(&line) {
            ClientCommand::Quit => return CloseReason::Quit,
            ClientCommand::Empty => continue,
            ClientCommand::Chat { body } => handle.chat(name.to_string(), body).await,
            ClientCommand::Whisper { target, body } => {
                handle.whisper(name.to_string(), target, body).await
            }
            ClientCommand::MalformedWhisper => {
                handle
                    .reply(name.to_string(), ServerMessage::system(WHISPER_USAGE))
                    .await
            }
        };

        if sent.is_err() {
            return CloseReason::ServerClosed;
        }
    }

    CloseReason::Eof
}

/// Drain the outbound queue onto the socket
async fn write_loop<S>(mut sink: S, mut receiver: mpsc::Receiver<ServerMessage>)
where
    S: Sink<String, Error = LinesCodecError> + Unpin,
{
    while let Some(msg) = receiver.recv().await {
        if let Err(e) = sink.send(msg.to_line()).await {
            warn!("Write failed, ending writer: {}", e);
            break;
        }
    }

    let _ = sink.close().await;
}

fn transition(client_id: ClientId, state: &mut SessionState, next: SessionState) {
    debug!("Client {}: {:?} -> {:?}", client_id, state, next);
    *state = next;
}

/// Turn the first line into the name to claim
///
/// Blank lines get an anonymous placeholder derived from the peer port
/// (or the client ID when the peer address is unknown).
pub fn requested_name(line: &str, peer: Option<SocketAddr>, client_id: ClientId) -> String {
    let name = sanitize_name(line.trim());
    if !name.is_empty() {
        return name;
    }

    match peer {
        Some(addr) => format!("Anonymous-{}", addr.port()),
        None => format!("Anonymous-{}", client_id.short()),
    }
}

/// Replace roster/whisper delimiters in a name with `_`
///
/// Commas would split a roster entry, colons would blur the
/// `name: text` chat form and whitespace would make the name
/// unreachable by `/w`.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c == ',' || c == ':' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio::time::{timeout, Duration};

    struct TestClient {
        reader: BufReader<tokio::io::ReadHalf<DuplexStream>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
        task: JoinHandle<Result<(), AppError>>,
    }

    impl TestClient {
        fn connect(handle: &ServerHandle) -> Self {
            Self::connect_with(handle, ServerConfig::default(), 4096)
        }

        fn connect_with(handle: &ServerHandle, config: ServerConfig, pipe_size: usize) -> Self {
            let (client, server) = tokio::io::duplex(pipe_size);
            let (server_read, server_write) = tokio::io::split(server);
            let handle = handle.clone();
            let task = tokio::spawn(async move {
                run_session(server_read, server_write, None, handle, &config).await
            });

            let (client_read, client_write) = tokio::io::split(client);
            Self {
                reader: BufReader::new(client_read),
                writer: client_write,
                task,
            }
        }

        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            let mut line = String::new();
            let n = timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for a line")
                .unwrap();
            if n == 0 {
                None
            } else {
                Some(line.trim_end_matches(['\r', '\n']).to_string())
            }
        }
    }

    #[test]
    fn test_requested_name() {
        let id = ClientId::new();
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();

        assert_eq!(requested_name("  Alice \r", Some(peer), id), "Alice");
        assert_eq!(requested_name("   ", Some(peer), id), "Anonymous-40000");
        assert_eq!(
            requested_name("", None, id),
            format!("Anonymous-{}", id.short())
        );
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("a,b:c d\te"), "a_b_c_d_e");
        assert_eq!(sanitize_name("Zoë"), "Zoë");
    }

    #[tokio::test]
    async fn test_join_then_quit() {
        let (handle, _server) = ServerHandle::spawn(&ServerConfig::default());
        let mut alice = TestClient::connect(&handle);

        alice.send("Alice").await;
        assert_eq!(alice.recv().await.unwrap(), "[System] Alice joined the chat");
        assert_eq!(alice.recv().await.unwrap(), "__USERS__:Alice");

        alice.send("hello world").await;
        assert_eq!(alice.recv().await.unwrap(), "Alice: hello world");

        alice.send("QUIT").await;
        assert_eq!(alice.recv().await, None);
        assert!(alice.task.await.unwrap().is_ok());
        assert!(handle.roster().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_whisper_usage() {
        let (handle, _server) = ServerHandle::spawn(&ServerConfig::default());
        let mut alice = TestClient::connect(&handle);
        alice.send("Alice").await;
        alice.recv().await;
        alice.recv().await;

        alice.send("/w Bob").await;

        assert_eq!(
            alice.recv().await.unwrap(),
            "[System] Usage: /w <name> <message>"
        );
        assert_eq!(handle.roster().await.unwrap(), vec!["Alice"]);
    }

    #[tokio::test]
    async fn test_blank_lines_ignored() {
        let (handle, _server) = ServerHandle::spawn(&ServerConfig::default());
        let mut alice = TestClient::connect(&handle);
        alice.send("Alice").await;
        alice.recv().await;
        alice.recv().await;

        alice.send("").await;
        alice.send("after").await;

        assert_eq!(alice.recv().await.unwrap(), "Alice: after");
    }

    #[tokio::test]
    async fn test_eof_runs_cleanup() {
        let (handle, _server) = ServerHandle::spawn(&ServerConfig::default());
        let mut bob = TestClient::connect(&handle);
        bob.send("Bob").await;
        bob.recv().await;
        bob.recv().await;

        let mut alice = TestClient::connect(&handle);
        alice.send("Alice").await;
        assert_eq!(bob.recv().await.unwrap(), "[System] Alice joined the chat");
        assert_eq!(bob.recv().await.unwrap(), "__USERS__:Alice,Bob");

        // Dropping both halves ends Alice's stream without a quit
        let TestClient { reader, writer, task } = alice;
        drop(reader);
        drop(writer);

        assert_eq!(bob.recv().await.unwrap(), "[System] Alice left the chat");
        assert_eq!(bob.recv().await.unwrap(), "__USERS__:Bob");
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_close_before_name() {
        let (handle, _server) = ServerHandle::spawn(&ServerConfig::default());
        let TestClient { reader, writer, task } = TestClient::connect(&handle);
        drop(reader);
        drop(writer);

        assert!(task.await.unwrap().is_ok());
        assert!(handle.roster().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quit_with_unread_queue_is_bounded() {
        let (handle, _server) = ServerHandle::spawn(&ServerConfig::default());
        let config = ServerConfig::default().with_flush_timeout(Duration::from_millis(100));
        // Pipe too small for even the join notice, and nobody reads it
        let mut alice = TestClient::connect_with(&handle, config, 16);

        alice.send("Alice").await;
        alice.send("quit").await;

        let result = timeout(Duration::from_secs(5), &mut alice.task)
            .await
            .expect("session stuck flushing")
            .unwrap();
        assert!(result.is_ok());
        assert!(handle.roster().await.unwrap().is_empty());
    }
}
