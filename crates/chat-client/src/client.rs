//! Connection client for the chat room.
//!
//! This module provides the `ChatClient` which handles:
//! - Connecting to the server over TCP
//! - Negotiating a display name (retrying on `ERROR: ` replies)
//! - Sending and receiving framed text
//! - Splitting into independent reader and writer halves
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use chat_core::Username;
use chat_protocol::{error_reason, FrameCodec, DEFAULT_MAX_FRAME_SIZE, EXIT_COMMAND};

use crate::error::{ClientError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Server address used when none is given.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8081";

/// Environment variable that overrides the server address.
pub const SERVER_ADDR_ENV: &str = "CHAT_SERVER";

/// Connection settings for the chat client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the chat server.
    pub server_addr: String,

    /// Largest payload accepted or sent, in bytes.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

// ============================================================================
// Chat Client
// ============================================================================

/// A connection to the chat server.
///
/// # Connection Lifecycle
///
/// 1. `connect` opens the TCP connection
/// 2. `join` sends a candidate name until the server accepts one
/// 3. `send` / `recv` exchange chat text
/// 4. `exit` announces departure, or the client is dropped
///
/// # Example
///
/// ```rust,ignore
/// use chat_client::ChatClient;
///
/// let mut client = ChatClient::connect("127.0.0.1:8081", 1024 * 1024).await?;
/// let welcome = client.join("alice").await?;
/// client.send("hello").await?;
/// ```
pub struct ChatClient {
    reader: ChatReader,
    writer: ChatWriter,
    name: Option<Username>,
}

impl ChatClient {
    /// Opens a connection to `addr`.
    pub async fn connect(addr: &str, max_frame_size: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        info!(addr, "Connected to chat server");

        let codec = FrameCodec::new(max_frame_size);
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: ChatReader {
                frames: FramedRead::new(read_half, codec),
            },
            writer: ChatWriter {
                frames: FramedWrite::new(write_half, codec),
            },
            name: None,
        })
    }

    /// Opens a connection using `config`.
    pub async fn connect_with(config: &ClientConfig) -> Result<Self> {
        Self::connect(&config.server_addr, config.max_frame_size).await
    }

    /// Claims `name` and returns the server's acceptance frame.
    ///
    /// The name is trimmed and validated locally first. On
    /// `NameRejected` or `InvalidName` the connection stays open and
    /// `join` may be called again.
    pub async fn join(&mut self, name: &str) -> Result<String> {
        let name = Username::parse(name)?;
        self.writer.send(name.as_str()).await?;

        match self.reader.next_frame().await? {
            Some(reply) => match error_reason(&reply) {
                Some(reason) => {
                    debug!(name = %name, reason, "Name rejected");
                    Err(ClientError::NameRejected(reason.to_string()))
                }
                None => {
                    info!(name = %name, "Joined chat room");
                    self.name = Some(name);
                    Ok(reply)
                }
            },
            None => Err(ClientError::Closed),
        }
    }

    /// Name accepted by the server, once `join` has succeeded.
    pub fn name(&self) -> Option<&Username> {
        self.name.as_ref()
    }

    /// Sends one chat message. Newlines are carried inside the frame.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.writer.send(text).await
    }

    /// Next frame from the server, or `None` once the connection ends.
    pub async fn recv(&mut self) -> Option<String> {
        self.reader.recv().await
    }

    /// Sends `exit` and closes the connection.
    pub async fn exit(self) -> Result<()> {
        self.writer.exit().await
    }

    /// Splits into halves that can be driven from separate tasks.
    pub fn into_split(self) -> (ChatReader, ChatWriter) {
        (self.reader, self.writer)
    }
}

/// Receiving half of a `ChatClient`.
pub struct ChatReader {
    frames: FramedRead<OwnedReadHalf, FrameCodec>,
}

impl ChatReader {
    /// Next frame from the server, or `None` once the connection ends.
    ///
    /// A malformed frame also ends the stream; the cause is logged.
    pub async fn recv(&mut self) -> Option<String> {
        match self.next_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Stopped reading from server");
                None
            }
        }
    }

    async fn next_frame(&mut self) -> Result<Option<String>> {
        match self.frames.next().await {
            Some(Ok(text)) => Ok(Some(text)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// Sending half of a `ChatClient`.
pub struct ChatWriter {
    frames: FramedWrite<OwnedWriteHalf, FrameCodec>,
}

impl ChatWriter {
    /// Sends one frame.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.frames.send(text).await?;
        Ok(())
    }

    /// Sends `exit` and shuts down the write side.
    pub async fn exit(mut self) -> Result<()> {
        self.send(EXIT_COMMAND).await?;
        // The codec encodes any `AsRef<str>`, so the item type must be named
        SinkExt::<&str>::close(&mut self.frames).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_protocol::{read_frame, write_frame, FrameError};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const MAX: usize = 1024;
    const TEST_TIMEOUT: Duration = Duration::from_secs(2);

    /// Accepts one connection and answers join attempts: `taken` is
    /// rejected, anything else is welcomed. Afterwards echoes frames back
    /// until `exit`.
    async fn fake_server() -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();

            loop {
                let name = read_frame(&mut stream, MAX).await.unwrap();
                seen.push(name.clone());
                if name == "taken" {
                    write_frame(&mut stream, "ERROR: name 'taken' is already taken", MAX)
                        .await
                        .unwrap();
                    continue;
                }
                let welcome = format!("Welcome {name} to the chat room.");
                write_frame(&mut stream, &welcome, MAX).await.unwrap();
                break;
            }

            while let Ok(text) = read_frame(&mut stream, MAX).await {
                seen.push(text.clone());
                if text == "exit" {
                    break;
                }
                write_frame(&mut stream, &format!("echo:{text}"), MAX)
                    .await
                    .unwrap();
            }
            seen
        });

        (addr, task)
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = ChatClient::connect(&addr, MAX).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_join_retry_after_rejection() {
        let (addr, server) = fake_server().await;
        let mut client = ChatClient::connect(&addr, MAX).await.unwrap();

        let err = client.join("taken").await.unwrap_err();
        assert!(matches!(err, ClientError::NameRejected(ref r) if r.contains("already taken")));
        assert!(client.name().is_none());

        let welcome = client.join("  alice ").await.unwrap();
        assert_eq!(welcome, "Welcome alice to the chat room.");
        assert_eq!(client.name().unwrap().as_str(), "alice");

        client.exit().await.unwrap();
        let seen = timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
        assert_eq!(seen, vec!["taken", "alice", "exit"]);
    }

    #[tokio::test]
    async fn test_empty_name_not_sent() {
        let (addr, server) = fake_server().await;
        let mut client = ChatClient::connect(&addr, MAX).await.unwrap();

        let err = client.join("   ").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidName(_)));

        client.join("bob").await.unwrap();
        client.exit().await.unwrap();

        let seen = timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
        assert_eq!(seen, vec!["bob", "exit"]);
    }

    #[tokio::test]
    async fn test_send_and_recv_multiline() {
        let (addr, server) = fake_server().await;
        let mut client = ChatClient::connect(&addr, MAX).await.unwrap();
        client.join("alice").await.unwrap();

        client.send("hi\nthere").await.unwrap();
        let reply = timeout(TEST_TIMEOUT, client.recv()).await.unwrap();
        assert_eq!(reply.as_deref(), Some("echo:hi\nthere"));

        client.exit().await.unwrap();
        timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_split_halves() {
        let (addr, server) = fake_server().await;
        let mut client = ChatClient::connect(&addr, MAX).await.unwrap();
        client.join("alice").await.unwrap();

        let (mut reader, mut writer) = client.into_split();
        let reading = tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(frame) = reader.recv().await {
                got.push(frame);
            }
            got
        });

        writer.send("one").await.unwrap();
        writer.send("two").await.unwrap();
        writer.exit().await.unwrap();

        timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
        let got = timeout(TEST_TIMEOUT, reading).await.unwrap().unwrap();
        assert_eq!(got, vec!["echo:one", "echo:two"]);
    }

    #[tokio::test]
    async fn test_exit_sends_exit_then_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let first = read_frame(&mut stream, MAX).await.unwrap();
            let after = read_frame(&mut stream, MAX).await;
            (first, after)
        });

        let client = ChatClient::connect(&addr, MAX).await.unwrap();
        let (_reader, writer) = client.into_split();
        writer.exit().await.unwrap();

        let (first, after) = timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
        assert_eq!(first, "exit");
        assert!(matches!(after, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_join_when_server_hangs_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut stream, MAX).await;
        });

        let mut client = ChatClient::connect(&addr, MAX).await.unwrap();
        let err = client.join("alice").await.unwrap_err();
        assert!(matches!(err, ClientError::Closed | ClientError::Frame(_)));
    }

    #[tokio::test]
    async fn test_oversized_send_rejected_locally() {
        let (addr, _server) = fake_server().await;
        let mut client = ChatClient::connect(&addr, 8).await.unwrap();

        let err = client.send("more than eight bytes").await.unwrap_err();
        assert!(matches!(err, ClientError::Frame(_)));
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr, DEFAULT_SERVER_ADDR);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }
}
