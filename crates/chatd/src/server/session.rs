//! Per-connection session state machine.
//!
//! Each accepted connection gets its own `Session` that:
//! - Negotiates a unique display name with the registry
//! - Reads frames and routes `exit`, `all` and chat lines
//! - Records activity in the ranking store
//! - Leaves the registry and closes the connection exactly once
//!
//! ```text
//! Connecting ─▶ Negotiating ─▶ Active ─▶ Closing ─▶ Closed
//!                   │  ▲ ERROR:              ▲
//!                   └──┘                     │
//!                   └────────────────────────┘ (peer gone / bad frame)
//! ```
//!
//! Reading happens on the session task; writing happens on a separate
//! writer task fed by the session's bounded outbound queue. Replies meant
//! for this client only (name rejections, the ranking listing) go straight
//! onto that queue and bypass the dispatcher.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Errors local to this session never reach other sessions or the dispatcher

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use futures::StreamExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chat_core::{SessionState, Username};
use chat_protocol::{
    chat_line, encode, error_reply, joined_notice, left_notice, ranking_listing, ClientRequest,
    FrameCodec, FrameError,
};

use crate::dispatcher::OutboundMessage;
use crate::registry::{SessionHandle, SessionId};

use super::writer::run_writer;
use super::ServerContext;

/// Sent instead of a listing when the ranking store cannot be reached.
const RANKING_UNAVAILABLE: &str = "Ranking is currently unavailable.";

/// Why a session left the `Active` state.
#[derive(Debug)]
enum Departure {
    /// The client sent `exit`.
    Exit,

    /// The connection failed, a frame was malformed, or the session was evicted.
    Dropped(SessionError),
}

/// Server-side representative of one connected client.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    state: SessionState,
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
    outbound: mpsc::Sender<Bytes>,
    evict: CancellationToken,
    writer: JoinHandle<()>,
    context: ServerContext,
}

impl Session {
    /// Takes ownership of `stream` and starts its writer task.
    ///
    /// # Arguments
    ///
    /// * `stream` - The accepted connection
    /// * `peer` - Remote address, for logging
    /// * `id` - Connection number assigned by the acceptor
    /// * `context` - Shared server state
    pub fn new(stream: TcpStream, peer: SocketAddr, id: SessionId, context: ServerContext) -> Self {
        let config = &context.config;
        let (read_half, write_half) = stream.into_split();
        let (outbound, queue) = mpsc::channel(config.outbound_queue_capacity);
        let evict = CancellationToken::new();

        let writer = tokio::spawn(run_writer(
            write_half,
            queue,
            config.write_timeout(),
            evict.clone(),
            id,
        ));

        Self {
            id,
            peer,
            state: SessionState::Connecting,
            reader: FramedRead::new(read_half, FrameCodec::new(config.max_frame_size)),
            outbound,
            evict,
            writer,
            context,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to completion and returns its final state.
    pub async fn run(mut self) -> SessionState {
        debug!(session = self.id, peer = %self.peer, "New client connected");
        self.set_state(SessionState::Negotiating);

        match self.negotiate().await {
            Ok(handle) => {
                self.set_state(SessionState::Active);
                info!(session = self.id, name = %handle.name(), peer = %self.peer, "User joined");
                self.broadcast(OutboundMessage::to_all(joined_notice(handle.name())));

                let departure = self.process_messages(handle.name()).await;
                self.close(Some(handle), departure).await
            }
            Err(e) => {
                debug!(session = self.id, error = %e, "Client left before joining");
                self.close(None, Departure::Dropped(e)).await
            }
        }
    }

    /// Reads candidate names until one is registered.
    ///
    /// A rejected name gets an `ERROR: ` reply and the loop continues; only
    /// a transport or framing failure ends negotiation.
    async fn negotiate(&mut self) -> Result<SessionHandle, SessionError> {
        loop {
            let candidate = self.next_frame().await?;

            let name = match Username::parse(&candidate) {
                Ok(name) => name,
                Err(e) => {
                    debug!(session = self.id, error = %e, "Rejected candidate name");
                    self.reply(&error_reply(e)).await?;
                    continue;
                }
            };

            let handle =
                SessionHandle::new(self.id, name, self.outbound.clone(), self.evict.clone());

            match self.context.registry.try_register(handle.clone()).await {
                Ok(()) => return Ok(handle),
                Err(e) => {
                    debug!(session = self.id, error = %e, "Registration rejected");
                    self.reply(&error_reply(e)).await?;
                }
            }
        }
    }

    /// Main message loop for a joined user.
    async fn process_messages(&mut self, name: &Username) -> Departure {
        loop {
            let raw = match self.next_frame().await {
                Ok(raw) => raw,
                Err(e) => return Departure::Dropped(e),
            };

            match ClientRequest::parse(&raw) {
                ClientRequest::Exit => return Departure::Exit,
                ClientRequest::Ranking => {
                    if let Err(e) = self.send_ranking().await {
                        return Departure::Dropped(e);
                    }
                }
                ClientRequest::Chat(text) => {
                    debug!(session = self.id, name = %name, len = text.len(), "Chat message");
                    self.record_activity(name).await;
                    self.broadcast(OutboundMessage::from_sender(
                        chat_line(name, text),
                        name.clone(),
                    ));
                }
                ClientRequest::Empty => {}
            }
        }
    }

    /// Replies to this client alone with the full ranking listing.
    async fn send_ranking(&self) -> Result<(), SessionError> {
        match self.context.ranking.all_ranked().await {
            Ok(names) => self.reply(&ranking_listing(names)).await,
            Err(e) => {
                warn!(session = self.id, error = %e, "Failed to read ranking");
                self.reply(RANKING_UNAVAILABLE).await
            }
        }
    }

    /// Adds one activity point; store failures are logged and ignored.
    async fn record_activity(&self, name: &Username) {
        if let Err(e) = self.context.ranking.increment_score(name.as_str()).await {
            warn!(name = %name, error = %e, "Failed to update activity score");
        }
    }

    /// Leaves the registry, announces the departure and closes the connection.
    async fn close(mut self, handle: Option<SessionHandle>, departure: Departure) -> SessionState {
        self.set_state(SessionState::Closing);

        if let Some(handle) = handle {
            let name = handle.name().clone();

            // Unregister first so the leaver is absent from every later snapshot
            self.context.registry.unregister_session(&handle).await;
            drop(handle);
            self.broadcast(OutboundMessage::to_all(left_notice(&name)));

            match departure {
                Departure::Exit => {
                    info!(session = self.id, name = %name, "User left");
                    if let Err(e) = self.context.ranking.delete_entry(name.as_str()).await {
                        warn!(name = %name, error = %e, "Failed to delete activity score");
                    }
                }
                Departure::Dropped(SessionError::Frame(e)) if !e.is_connection() => {
                    warn!(session = self.id, name = %name, error = %e, "Dropping user after malformed frame");
                }
                Departure::Dropped(e) => {
                    info!(session = self.id, name = %name, reason = %e, "User disconnected");
                }
            }
        }

        self.set_state(SessionState::Closed);
        let Session {
            id,
            state,
            outbound,
            writer,
            context,
            ..
        } = self;

        // Dropping the last sender lets the writer drain what is queued and stop
        drop(outbound);
        let mut writer = writer;
        if timeout(context.config.write_timeout(), &mut writer).await.is_err() {
            warn!(session = id, "Writer did not finish in time, aborting");
            writer.abort();
        }

        debug!(session = id, "Session closed");
        state
    }

    /// Waits for the next frame, or for eviction.
    async fn next_frame(&mut self) -> Result<String, SessionError> {
        tokio::select! {
            _ = self.evict.cancelled() => Err(SessionError::Evicted),
            frame = self.reader.next() => match frame {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(SessionError::Frame(e)),
                None => Err(SessionError::Frame(FrameError::Closed)),
            },
        }
    }

    /// Queues `text` for this client only.
    ///
    /// An oversized reply is logged and skipped; it does not end the session.
    async fn reply(&self, text: &str) -> Result<(), SessionError> {
        let frame = match encode(text, self.context.config.max_frame_size) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session = self.id, error = %e, "Dropping oversized reply");
                return Ok(());
            }
        };

        self.outbound
            .send(frame)
            .await
            .map_err(|_| SessionError::WriterClosed)
    }

    fn broadcast(&self, message: OutboundMessage) {
        if let Err(e) = self.context.dispatcher.broadcast(message) {
            warn!(session = self.id, error = %e, "Failed to enqueue broadcast");
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if let Err(e) = self.state.transition(next) {
            warn!(session = self.id, error = %e, "Ignoring invalid state transition");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("evicted by the server")]
    Evicted,

    #[error("outbound writer closed")]
    WriterClosed,
}
