//! Chat Client - Connection and messaging for the chat room
//!
//! This crate provides the client side used by the `chat` binary:
//! - `client` - `ChatClient` connection, name negotiation, split halves
//! - `error` - `ClientError` and the `Result` alias
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, or `todo!()` outside tests.

pub mod client;
pub mod error;

pub use client::{
    ChatClient, ChatReader, ChatWriter, ClientConfig, DEFAULT_SERVER_ADDR, SERVER_ADDR_ENV,
};
pub use error::{ClientError, Result};
