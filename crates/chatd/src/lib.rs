//! Chat Daemon - Session registry, broadcast dispatcher and rankings
//!
//! This crate provides the server side of the chat room:
//! - `config` - Server configuration (defaults, TOML file, overrides)
//! - `registry` - Name → session mapping with atomic name claims
//! - `dispatcher` - Single ordered fan-out of broadcast messages
//! - `ranking` - Activity score store interface and in-memory store
//! - `server` - TCP acceptor and the per-connection session state machine
//! - `console` - Operator commands over the registry and ranking store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          chatd                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   ChatServer    │────▶│      SessionRegistry        │    │
//! │  │  (TcpListener)  │     │   (name → SessionHandle)    │    │
//! │  └────────┬────────┘     └──────────────▲──────────────┘    │
//! │           │ spawn                       │ snapshot          │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐  enqueue  ┌────────┴────────────┐      │
//! │  │     Session     │──────────▶│     Dispatcher      │      │
//! │  │ (reader task)   │           │ (single consumer)   │      │
//! │  └────────┬────────┘           └────────┬────────────┘      │
//! │           │ own queue                   │ try_send          │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │      per-session bounded queue → writer task        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod console;
pub mod dispatcher;
pub mod ranking;
pub mod registry;
pub mod server;
