//! Broadcast dispatcher.
//!
//! A single task drains one unbounded FIFO of outbound messages. For each
//! message it encodes one frame, takes a registry snapshot, and queues the
//! frame on every recipient's own bounded queue. It never waits on a
//! socket: each session's writer task does the actual write, so a slow
//! client cannot hold up delivery to anyone else.
//!
//! Because there is one consumer and every per-session queue is FIFO, two
//! messages enqueued as `M1` then `M2` reach every common recipient in that
//! order.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-recipient failures are logged and never abort a fan-out round

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chat_core::Username;
use chat_protocol::encode;

use crate::config::SlowConsumerPolicy;
use crate::registry::{DeliveryError, SessionRegistry};

/// One message waiting to be fanned out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Frame text.
    pub text: String,

    /// Session that must not receive this message (the sender).
    pub exclude: Option<Username>,
}

impl OutboundMessage {
    /// A message for every registered session.
    pub fn to_all(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exclude: None,
        }
    }

    /// A message for everyone except `sender`.
    pub fn from_sender(text: impl Into<String>, sender: Username) -> Self {
        Self {
            text: text.into(),
            exclude: Some(sender),
        }
    }

    fn is_excluded(&self, name: &Username) -> bool {
        self.exclude.as_ref() == Some(name)
    }
}

/// Outcome of one fan-out round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Recipients whose queue accepted the frame.
    pub delivered: usize,

    /// Recipients that missed the frame because their queue was full.
    pub dropped: usize,

    /// Recipients evicted because their queue was full.
    pub evicted: usize,

    /// Recipients whose queue had already closed.
    pub closed: usize,
}

/// Cloneable producer side of the dispatcher queue.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl DispatchHandle {
    pub fn new(sender: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { sender }
    }

    /// Appends `message` to the global broadcast order.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Closed` if the dispatcher task has stopped
    pub fn broadcast(&self, message: OutboundMessage) -> Result<(), DispatchError> {
        self.sender
            .send(message)
            .map_err(|_| DispatchError::Closed)
    }

    /// Returns true while the dispatcher is still consuming.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// The single consumer of the broadcast queue.
pub struct Dispatcher {
    receiver: mpsc::UnboundedReceiver<OutboundMessage>,
    registry: SessionRegistry,
    policy: SlowConsumerPolicy,
    max_frame_size: usize,
}

impl Dispatcher {
    /// Creates a dispatcher.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Consumer side of the broadcast queue
    /// * `registry` - Source of recipients for each round
    /// * `policy` - What to do when a recipient's queue is full
    /// * `max_frame_size` - Largest payload that may be encoded
    pub fn new(
        receiver: mpsc::UnboundedReceiver<OutboundMessage>,
        registry: SessionRegistry,
        policy: SlowConsumerPolicy,
        max_frame_size: usize,
    ) -> Self {
        Self {
            receiver,
            registry,
            policy,
            max_frame_size,
        }
    }

    /// Drains the queue until every `DispatchHandle` is dropped.
    pub async fn run(mut self) {
        info!("Broadcast dispatcher starting");

        while let Some(message) = self.receiver.recv().await {
            self.dispatch(&message).await;
        }

        info!("Broadcast dispatcher stopped");
    }

    /// Fans one message out to the current registry snapshot.
    pub async fn dispatch(&self, message: &OutboundMessage) -> FanOut {
        let mut outcome = FanOut::default();

        let frame = match encode(&message.text, self.max_frame_size) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, sender = ?message.exclude, "Dropping unencodable broadcast");
                return outcome;
            }
        };

        for recipient in self.registry.snapshot().await {
            if message.is_excluded(recipient.name()) {
                continue;
            }

            match recipient.try_deliver(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(DeliveryError::Full) => match self.policy {
                    SlowConsumerPolicy::Disconnect => {
                        warn!(name = %recipient.name(), "Outbound queue full, disconnecting slow client");
                        recipient.evict();
                        self.registry.unregister_session(&recipient).await;
                        outcome.evicted += 1;
                    }
                    SlowConsumerPolicy::Drop => {
                        warn!(name = %recipient.name(), "Outbound queue full, dropping message");
                        outcome.dropped += 1;
                    }
                },
                Err(DeliveryError::Closed) => {
                    debug!(name = %recipient.name(), "Recipient queue closed, skipping");
                    outcome.closed += 1;
                }
            }
        }

        debug!(
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            evicted = outcome.evicted,
            "Broadcast fan-out complete"
        );
        outcome
    }
}

/// Spawns the dispatcher task and returns a handle for enqueuing.
pub fn spawn_dispatcher(
    registry: SessionRegistry,
    policy: SlowConsumerPolicy,
    max_frame_size: usize,
) -> DispatchHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Dispatcher::new(rx, registry, policy, max_frame_size);
    tokio::spawn(dispatcher.run());
    DispatchHandle::new(tx)
}

/// Errors that can occur when enqueuing a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("broadcast dispatcher has stopped")]
    Closed,
}
