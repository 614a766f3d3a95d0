//! Chat Protocol - Wire protocol for chatroom communication
//!
//! Every message in either direction is a single frame: a 4-byte
//! big-endian length followed by that many bytes of UTF-8 text.
//! Payloads carry no delimiter, so text may contain newlines.
//!
//! - `frame` - encoding, decoding and the `tokio_util` codec
//! - `message` - the text grammar carried inside frames

pub mod frame;
pub mod message;

pub use frame::{
    encode, read_frame, write_frame, FrameCodec, FrameError, DEFAULT_MAX_FRAME_SIZE,
    LENGTH_PREFIX_SIZE,
};
pub use message::{
    chat_line, error_reason, error_reply, is_error_reply, joined_notice, left_notice,
    ranking_listing, ClientRequest, ERROR_PREFIX, EXIT_COMMAND, RANKING_COMMAND,
};
