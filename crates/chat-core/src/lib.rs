//! Chat Core - Shared types for the chatroom server and client
//!
//! This crate provides the domain types shared between
//! the server (chatd) and the line client (chat).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod session;
pub mod username;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use session::SessionState;
pub use username::{Username, MAX_USERNAME_CHARS};
