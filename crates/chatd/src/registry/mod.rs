//! Session registry: the authoritative name → session mapping.
//!
//! The registry is shared by every session and by the dispatcher. The map
//! itself is private; callers only get the atomic operations below, each of
//! which takes the lock once and releases it before returning. The lock is
//! never held across network I/O: `snapshot` hands out clones so the
//! dispatcher can iterate without it.
//!
//! # Uniqueness
//!
//! `try_register` is the only way in. It checks for the name and inserts in
//! the same critical section, so two concurrent joins with the same name can
//! never both succeed.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - `tokio::sync::Mutex` has no poisoning to handle

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use chat_core::Username;

mod handle;

pub use handle::{DeliveryError, SessionHandle, SessionId};

/// Concurrency-safe mapping of display name to session handle.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Username, SessionHandle>>>,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Creates an empty registry holding at most `max_sessions` sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            max_sessions,
        }
    }

    /// Claims `handle.name()` for `handle`.
    ///
    /// Leaves the registry untouched on failure.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameTaken` if a live session already holds the name
    /// - `RegistryError::RegistryFull` if the registry is at capacity
    pub async fn try_register(&self, handle: SessionHandle) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.lock().await;

        if sessions.contains_key(handle.name()) {
            debug!(name = %handle.name(), "Name already taken, rejecting registration");
            return Err(RegistryError::NameTaken(handle.name().clone()));
        }

        if sessions.len() >= self.max_sessions {
            warn!(
                name = %handle.name(),
                max = self.max_sessions,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_sessions,
            });
        }

        info!(
            name = %handle.name(),
            session = handle.id(),
            total_sessions = sessions.len() + 1,
            "Session registered"
        );
        sessions.insert(handle.name().clone(), handle);
        Ok(())
    }

    /// Removes whatever session holds `name`. Removing an absent name is a no-op.
    pub async fn unregister(&self, name: &str) -> Option<SessionHandle> {
        let removed = self.sessions.lock().await.remove(name);
        if let Some(ref handle) = removed {
            debug!(name = %handle.name(), session = handle.id(), "Session unregistered");
        }
        removed
    }

    /// Removes `handle` only if it still owns its name.
    ///
    /// Guards against removing a newer session that claimed the same name
    /// after `handle` was already gone.
    pub async fn unregister_session(&self, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.lock().await;
        let owned = sessions
            .get(handle.name())
            .is_some_and(|current| current.id() == handle.id());

        if owned {
            sessions.remove(handle.name());
            debug!(name = %handle.name(), session = handle.id(), "Session unregistered");
        }
        owned
    }

    /// Finds the session holding `name`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` if no session holds the name
    pub async fn lookup(&self, name: &str) -> Result<SessionHandle, RegistryError> {
        self.sessions
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Point-in-time copy of all sessions, ordered by name.
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<SessionHandle> =
            self.sessions.lock().await.values().cloned().collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    /// Names of all registered sessions, sorted.
    pub async fn names(&self) -> Vec<Username> {
        let mut names: Vec<Username> = self.sessions.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns true if no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Capacity this registry was created with.
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another live session already holds this name.
    #[error("name '{0}' is already taken")]
    NameTaken(Username),

    /// The registry has reached its maximum session capacity.
    #[error("chat room is full (max: {max} users)")]
    RegistryFull {
        /// Maximum number of sessions allowed
        max: usize,
    },

    /// No session holds the requested name.
    #[error("user not found: {0}")]
    NotFound(String),
}
