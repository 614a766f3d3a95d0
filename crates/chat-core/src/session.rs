//! Session lifecycle states.
//!
//! ```text
//! Connecting ──▶ Negotiating ──▶ Active ──▶ Closing ──▶ Closed
//!                     │                        ▲
//!                     └────────────────────────┘
//! ```
//!
//! A session may abandon negotiation (peer gone, malformed frame) and go
//! straight to `Closing` without ever having been registered.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{DomainError, DomainResult};

/// Where a connected client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connection accepted, nothing read yet.
    #[default]
    Connecting,

    /// Waiting for a unique display name.
    Negotiating,

    /// Registered under a name and exchanging messages.
    Active,

    /// Tearing down: leaving the registry and closing the connection.
    Closing,

    /// Terminal.
    Closed,
}

impl SessionState {
    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Negotiating)
                | (Connecting, Closing)
                | (Negotiating, Active)
                | (Negotiating, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }

    /// Moves to `next`, rejecting illegal transitions.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` and leaves `self` unchanged
    /// if the move is not allowed.
    pub fn transition(&mut self, next: SessionState) -> DomainResult<()> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        trace!(from = %self, to = %next, "session state transition");
        *self = next;
        Ok(())
    }

    /// Returns true once the session can no longer do anything.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }

    /// Lowercase label used in logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Negotiating => "negotiating",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_connecting() {
        assert_eq!(SessionState::default(), SessionState::Connecting);
    }

    #[test]
    fn test_happy_path() {
        let mut state = SessionState::Connecting;
        for next in [
            SessionState::Negotiating,
            SessionState::Active,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            state.transition(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_abandon_negotiation() {
        let mut state = SessionState::Negotiating;
        assert!(state.transition(SessionState::Closing).is_ok());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut state = SessionState::Closed;
        for next in [
            SessionState::Connecting,
            SessionState::Negotiating,
            SessionState::Active,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            assert!(state.transition(next).is_err());
        }
        assert_eq!(state, SessionState::Closed);
    }

    #[test]
    fn test_cannot_skip_negotiation() {
        let mut state = SessionState::Connecting;
        let err = state.transition(SessionState::Active).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: SessionState::Connecting,
                to: SessionState::Active,
            }
        );
        assert_eq!(state, SessionState::Connecting);
    }

    #[test]
    fn test_active_cannot_renegotiate() {
        assert!(!SessionState::Active.can_transition_to(SessionState::Negotiating));
    }

    #[test]
    fn test_serde_uses_snake_case_labels() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Snapshot {
            state: SessionState,
        }

        let text = toml::to_string(&Snapshot {
            state: SessionState::Negotiating,
        })
        .unwrap();
        assert_eq!(text.trim(), r#"state = "negotiating""#);

        let back: Snapshot = toml::from_str(r#"state = "closing""#).unwrap();
        assert_eq!(back.state, SessionState::Closing);
        assert!(toml::from_str::<Snapshot>(r#"state = "Closing""#).is_err());
    }
}
