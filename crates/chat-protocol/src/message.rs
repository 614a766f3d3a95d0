//! Text grammar carried inside frames.
//!
//! Client to server:
//! - before joining: a candidate display name
//! - after joining: free text, or the reserved words `exit` and `all`
//!
//! Server to client:
//! - `ERROR: <reason>` rejects a candidate name
//! - `<sender>:<text>` for chat lines
//! - plain join/leave notices
//! - a ranking listing, one `<rank>. <name>\n` line per entry

use std::fmt::{Display, Write};

use chat_core::Username;

/// Prefix that marks a rejection reply.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Reserved word a client sends to leave.
pub const EXIT_COMMAND: &str = "exit";

/// Reserved word a client sends to request the full ranking.
pub const RANKING_COMMAND: &str = "all";

/// A decoded, trimmed request from a joined client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRequest<'a> {
    /// Leave the chat room.
    Exit,

    /// Send back the full activity ranking.
    Ranking,

    /// Broadcast this text to everyone else.
    Chat(&'a str),

    /// Nothing but whitespace; ignored.
    Empty,
}

impl<'a> ClientRequest<'a> {
    /// Classifies a raw frame payload. Surrounding whitespace is trimmed
    /// and the reserved words must match exactly.
    pub fn parse(raw: &'a str) -> Self {
        match raw.trim() {
            "" => Self::Empty,
            EXIT_COMMAND => Self::Exit,
            RANKING_COMMAND => Self::Ranking,
            text => Self::Chat(text),
        }
    }
}

/// Builds an `ERROR: <reason>` reply.
pub fn error_reply(reason: impl Display) -> String {
    format!("{ERROR_PREFIX}{reason}")
}

/// Returns true if `text` is a rejection reply.
pub fn is_error_reply(text: &str) -> bool {
    text.starts_with(ERROR_PREFIX)
}

/// Extracts the reason from a rejection reply.
pub fn error_reason(text: &str) -> Option<&str> {
    text.strip_prefix(ERROR_PREFIX)
}

/// Formats a broadcast chat line: `<sender>:<text>`.
pub fn chat_line(sender: &Username, text: &str) -> String {
    format!("{sender}:{text}")
}

/// Notice broadcast when a user finishes joining.
pub fn joined_notice(name: &Username) -> String {
    format!("Welcome {name} to the chat room.")
}

/// Notice broadcast when a user leaves or drops.
pub fn left_notice(name: &Username) -> String {
    format!("{name} left the chat room.")
}

/// Formats names (already in rank order) as a 1-indexed listing.
///
/// Every entry, including the last, ends with `\n`. An empty ranking
/// yields an empty string.
pub fn ranking_listing<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (index, name) in names.into_iter().enumerate() {
        // Writing to a String cannot fail
        let _ = writeln!(out, "{}. {}", index + 1, name.as_ref());
    }
    out
}
