//! Error types for the chat client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;

use chat_core::DomainError;
use chat_protocol::FrameError;
use thiserror::Error;

/// Chat client errors.
///
/// # Error Handling
///
/// Only `NameRejected` and `InvalidName` are recoverable: the caller may
/// retry `join` with another name on the same connection. Every other
/// variant means the connection is unusable.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to open the TCP connection.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialed.
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The name failed local validation and was never sent.
    #[error("Invalid name: {0}")]
    InvalidName(#[from] DomainError),

    /// The server answered the join with an `ERROR: ` reply.
    #[error("Name rejected by server: {0}")]
    NameRejected(String),

    /// Reading or writing a frame failed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The server closed the connection.
    #[error("Server closed the connection")]
    Closed,
}

impl ClientError {
    /// Returns true if `join` may be retried on the same connection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NameRejected(_) | Self::InvalidName(_))
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
