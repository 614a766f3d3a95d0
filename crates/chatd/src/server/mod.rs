//! TCP server for the chat room.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a `Session` for each client
//! - Owns the shared `ServerContext` every session is built from
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Session     │────▶│ SessionRegistry │
//! │  (per client)   │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │ enqueue
//!         ▼
//! ┌─────────────────┐
//! │   Dispatcher    │
//! │ (single task)   │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod session;
mod writer;

pub use session::{Session, SessionError};

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::dispatcher::{spawn_dispatcher, DispatchHandle};
use crate::ranking::RankingStore;
use crate::registry::SessionRegistry;

/// Everything a session needs, built once and shared by cloning.
#[derive(Clone)]
pub struct ServerContext {
    /// Resolved configuration
    pub config: Arc<ServerConfig>,

    /// Name → session mapping
    pub registry: SessionRegistry,

    /// Producer side of the broadcast queue
    pub dispatcher: DispatchHandle,

    /// Activity score store
    pub ranking: Arc<dyn RankingStore>,
}

impl ServerContext {
    /// Validates `config`, builds the registry and spawns the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Invalid` if `config` fails validation; nothing is spawned
    pub fn new(config: ServerConfig, ranking: Arc<dyn RankingStore>) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = SessionRegistry::new(config.max_sessions);
        let dispatcher = spawn_dispatcher(
            registry.clone(),
            config.slow_consumer_policy,
            config.max_frame_size,
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            dispatcher,
            ranking,
        })
    }
}

/// Connection acceptor.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Shared state handed to each session
    context: ServerContext,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for session IDs
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Binds to `context.config.listen_addr`.
    pub async fn bind(
        context: ServerContext,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = context.config.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;

        Ok(Self::from_listener(listener, context, cancel_token))
    }

    /// Wraps an already-bound listener.
    pub fn from_listener(
        listener: TcpListener,
        context: ServerContext,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            listener,
            context,
            cancel_token,
            connection_counter: AtomicU64::new(1),
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared server state.
    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered.
    /// Sessions already running are left to finish on their own.
    pub async fn run(&self) -> Result<(), ServerError> {
        if self.context.config.clear_ranking_on_startup {
            match self.context.ranking.clear_all().await {
                Ok(()) => debug!("Cleared activity ranking"),
                Err(e) => warn!(error = %e, "Failed to clear activity ranking"),
            }
        }

        match self.local_addr() {
            Ok(addr) => info!(addr = %addr, "Chat server listening"),
            Err(e) => warn!(error = %e, "Chat server listening on unknown address"),
        }

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let id = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, id);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        let online = self.context.registry.len().await;
        info!(online, "Chat server stopped accepting");
        Ok(())
    }

    /// Spawns a session task for a new connection.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, id: u64) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let session = Session::new(stream, peer, id, self.context.clone());
        tokio::spawn(session.run());
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::MemoryRankingStore;

    fn context() -> ServerContext {
        let config = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        ServerContext::new(config, Arc::new(MemoryRankingStore::new())).unwrap()
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:8081".to_string(),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("0.0.0.0:8081"));
        assert!(err.to_string().contains("address in use"));
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = ChatServer::bind(context(), CancellationToken::new())
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let mut ctx = context();
        ctx.config = Arc::new(ServerConfig {
            listen_addr: "not an address".to_string(),
            ..ServerConfig::default()
        });

        let err = ChatServer::bind(ctx, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_run_future_is_send() {
        let server = ChatServer::bind(context(), CancellationToken::new())
            .await
            .unwrap();
        assert_send(server.run());
    }

    #[tokio::test]
    async fn test_run_on_spawned_task() {
        let cancel = CancellationToken::new();
        let server = ChatServer::bind(context(), cancel.clone()).await.unwrap();

        let task = tokio::spawn(async move { server.run().await });
        cancel.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_context_rejects_invalid_config() {
        let config = ServerConfig {
            outbound_queue_capacity: 0,
            ..ServerConfig::default()
        };

        let err = ServerContext::new(config, Arc::new(MemoryRankingStore::new()))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "outbound_queue_capacity",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_run_returns_on_cancel() {
        let cancel = CancellationToken::new();
        let server = ChatServer::bind(context(), cancel.clone()).await.unwrap();

        cancel.cancel();
        assert!(server.run().await.is_ok());
    }
}
