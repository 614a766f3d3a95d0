//! Domain-specific error types following panic-free policy.

use crate::SessionState;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Candidate name was empty after trimming
    #[error("name must not be empty")]
    EmptyName,

    /// Candidate name exceeds the display name limit
    #[error("name is too long: {len} characters (max: {max})")]
    NameTooLong { len: usize, max: usize },

    /// Session state machine was asked for an illegal move
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
