//! Length-prefixed frame codec.
//!
//! Wire format: `[4-byte big-endian length L][L bytes of UTF-8]`
//!
//! The length is checked against a configured maximum before any payload
//! is read or buffered, so a corrupt or hostile peer cannot force a large
//! allocation.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum payload size (1 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1_048_576;

/// Errors produced while framing or unframing text.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer advertised a length above the configured maximum.
    #[error("frame length {len} exceeds maximum of {max} bytes")]
    Protocol { len: usize, max: usize },

    /// Outgoing text is too large to fit in one frame.
    #[error("payload of {len} bytes exceeds maximum frame size of {max} bytes")]
    Encoding { len: usize, max: usize },

    /// Payload bytes were not valid UTF-8.
    #[error("frame payload is not valid UTF-8")]
    InvalidUtf8,

    /// The peer closed the stream cleanly between frames.
    #[error("connection closed by peer")]
    Closed,

    /// Short read, reset, or any other transport failure.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),
}

impl FrameError {
    /// Returns true if the failure came from the transport rather than
    /// from the content of a frame.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Closed | Self::Connection(_))
    }
}

/// Encodes `text` into a complete frame.
///
/// # Errors
///
/// Returns `FrameError::Encoding` if the UTF-8 length of `text` exceeds
/// `max_frame_size`.
pub fn encode(text: &str, max_frame_size: usize) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + text.len());
    FrameCodec::new(max_frame_size).encode(text, &mut buf)?;
    Ok(buf.freeze())
}

/// Reads exactly one frame from `reader`.
///
/// Returns `FrameError::Closed` if the stream ends before the first byte
/// of a new frame, and `FrameError::Connection` if it ends part-way
/// through one. No trimming is applied to the returned text.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<String, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while let Some(rest) = prefix.get_mut(filled..).filter(|rest| !rest.is_empty()) {
        let n = reader.read(rest).await?;
        if n == 0 {
            if filled == 0 {
                return Err(FrameError::Closed);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside length prefix",
            )
            .into());
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_frame_size {
        return Err(FrameError::Protocol {
            len,
            max: max_frame_size,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    String::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)
}

/// Encodes `text` and writes it to `writer`, flushing afterwards.
pub async fn write_frame<W>(
    writer: &mut W,
    text: &str,
    max_frame_size: usize,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(text, max_frame_size)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// `tokio_util` codec for use with `FramedRead` / `FramedWrite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Creates a codec that rejects payloads above `max_frame_size` bytes.
    pub const fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Returns the configured payload limit.
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        let Some(prefix) = src.get(..LENGTH_PREFIX_SIZE) else {
            return Ok(None);
        };

        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        len_bytes.copy_from_slice(prefix);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len > self.max_frame_size {
            return Err(FrameError::Protocol {
                len,
                max: self.max_frame_size,
            });
        }

        let total = LENGTH_PREFIX_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let payload = src.split_to(len);
        String::from_utf8(payload.to_vec())
            .map(Some)
            .map_err(|_| FrameError::InvalidUtf8)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "connection closed with {} bytes of a partial frame buffered",
                    src.len()
                ),
            )
            .into()),
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), FrameError> {
        let text = item.as_ref();
        let len = text.len();
        let too_large = FrameError::Encoding {
            len,
            max: self.max_frame_size,
        };

        if len > self.max_frame_size {
            return Err(too_large);
        }
        let prefix = u32::try_from(len).map_err(|_| too_large)?;

        dst.reserve(LENGTH_PREFIX_SIZE + len);
        dst.put_u32(prefix);
        dst.extend_from_slice(text.as_bytes());
        Ok(())
    }
}
