//! Per-session writer task.
//!
//! Owns the write half of one connection and drains that session's
//! outbound queue in order. Frames arrive already encoded. A failed or
//! timed-out write cancels the session's eviction token so the reader side
//! tears the session down; the write half is shut down exactly once, when
//! the queue closes or the first write fails.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::SessionId;

/// Drains `queue` into `writer` until the queue closes or a write fails.
pub(crate) async fn run_writer<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<Bytes>,
    write_timeout: Duration,
    evict: CancellationToken,
    session: SessionId,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        let result = timeout(write_timeout, async {
            writer.write_all(&frame).await?;
            writer.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(session, error = %e, "Write to client failed");
                evict.cancel();
                break;
            }
            Err(_) => {
                warn!(session, timeout = ?write_timeout, "Write to client timed out");
                evict.cancel();
                break;
            }
        }
    }

    // Nothing more can be sent; the peer sees EOF
    if let Err(e) = writer.shutdown().await {
        debug!(session, error = %e, "Failed to shut down write half");
    }
    debug!(session, "Writer task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_protocol::{encode, read_frame, FrameError};

    const MAX: usize = 1024;

    #[tokio::test]
    async fn test_writes_frames_in_order_then_closes() {
        let (client, mut server) = tokio::io::duplex(256);
        let (tx, rx) = mpsc::channel(8);
        let evict = CancellationToken::new();

        let task = tokio::spawn(run_writer(
            client,
            rx,
            Duration::from_secs(1),
            evict.clone(),
            1,
        ));

        tx.send(encode("first", MAX).unwrap()).await.unwrap();
        tx.send(encode("second\nline", MAX).unwrap()).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(read_frame(&mut server, MAX).await.unwrap(), "first");
        assert_eq!(read_frame(&mut server, MAX).await.unwrap(), "second\nline");
        assert!(matches!(
            read_frame(&mut server, MAX).await,
            Err(FrameError::Closed)
        ));
        assert!(!evict.is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_write_evicts_session() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);

        let (tx, rx) = mpsc::channel(8);
        let evict = CancellationToken::new();
        let task = tokio::spawn(run_writer(
            client,
            rx,
            Duration::from_secs(1),
            evict.clone(),
            2,
        ));

        tx.send(encode("nobody listening", MAX).unwrap()).await.unwrap();
        task.await.unwrap();

        assert!(evict.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        // A 4-byte pipe that nobody reads fills up immediately
        let (client, _server) = tokio::io::duplex(4);

        let (tx, rx) = mpsc::channel(8);
        let evict = CancellationToken::new();
        let task = tokio::spawn(run_writer(
            client,
            rx,
            Duration::from_millis(50),
            evict.clone(),
            3,
        ));

        tx.send(encode("far more than four bytes", MAX).unwrap())
            .await
            .unwrap();
        task.await.unwrap();

        assert!(evict.is_cancelled());
    }
}
