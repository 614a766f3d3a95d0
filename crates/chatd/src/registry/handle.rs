//! Handle to one registered session.
//!
//! A `SessionHandle` is what the registry stores and what the dispatcher
//! fans out to. It never touches the socket: it holds the sender side of
//! the session's bounded outbound queue, which the session's writer task
//! drains, plus a token the dispatcher cancels to evict the session.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use chat_core::Username;

/// Process-unique number assigned by the acceptor to each connection.
pub type SessionId = u64;

/// Cheap-to-clone handle to a registered session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    name: Username,
    joined_at: DateTime<Utc>,
    outbound: mpsc::Sender<Bytes>,
    evict: CancellationToken,
}

impl SessionHandle {
    /// Creates a handle stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `id` - Connection number, used to tell apart successive owners of a name
    /// * `name` - The claimed display name
    /// * `outbound` - Sender side of the session's outbound frame queue
    /// * `evict` - Token the session watches to learn it has been evicted
    pub fn new(
        id: SessionId,
        name: Username,
        outbound: mpsc::Sender<Bytes>,
        evict: CancellationToken,
    ) -> Self {
        Self {
            id,
            name,
            joined_at: Utc::now(),
            outbound,
            evict,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &Username {
        &self.name
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    /// Queues an encoded frame without waiting.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::Full` if the queue is at capacity
    /// - `DeliveryError::Closed` if the session's writer has gone away
    pub fn try_deliver(&self, frame: Bytes) -> Result<(), DeliveryError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Asks the session to shut down.
    pub fn evict(&self) {
        self.evict.cancel();
    }

    /// Returns true once the session has been asked to shut down.
    pub fn is_evicted(&self) -> bool {
        self.evict.is_cancelled()
    }
}

/// Why a frame could not be queued for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    Full,

    #[error("outbound queue is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(capacity: usize) -> (SessionHandle, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let name = Username::parse("alice").unwrap();
        (SessionHandle::new(7, name, tx, CancellationToken::new()), rx)
    }

    #[test]
    fn test_accessors() {
        let (handle, _rx) = handle(1);
        assert_eq!(handle.id(), 7);
        assert_eq!(handle.name().as_str(), "alice");
        assert!(handle.joined_at() <= Utc::now());
    }

    #[test]
    fn test_try_deliver_full() {
        let (handle, mut rx) = handle(1);

        assert_eq!(handle.try_deliver(Bytes::from_static(b"a")), Ok(()));
        assert_eq!(
            handle.try_deliver(Bytes::from_static(b"b")),
            Err(DeliveryError::Full)
        );
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"a"));
    }

    #[test]
    fn test_try_deliver_closed() {
        let (handle, rx) = handle(1);
        drop(rx);

        assert_eq!(
            handle.try_deliver(Bytes::from_static(b"a")),
            Err(DeliveryError::Closed)
        );
    }

    #[test]
    fn test_evict_is_shared_with_clones() {
        let (handle, _rx) = handle(1);
        let clone = handle.clone();

        assert!(!clone.is_evicted());
        handle.evict();
        assert!(clone.is_evicted());
    }
}
