//! Display names claimed by chat participants.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DomainError, DomainResult};

/// Maximum length of a display name, in characters.
pub const MAX_USERNAME_CHARS: usize = 32;

/// A validated display name.
///
/// Always trimmed of surrounding whitespace and never empty. Two sessions
/// can never hold the same `Username` at once; the server registry
/// enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Parses a candidate name as typed by a client.
    ///
    /// Surrounding whitespace is trimmed before validation.
    ///
    /// # Errors
    ///
    /// - `DomainError::EmptyName` if nothing remains after trimming
    /// - `DomainError::NameTooLong` if the name exceeds [`MAX_USERNAME_CHARS`]
    pub fn parse(candidate: &str) -> DomainResult<Self> {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyName);
        }

        let len = trimmed.chars().count();
        if len > MAX_USERNAME_CHARS {
            return Err(DomainError::NameTooLong {
                len,
                max: MAX_USERNAME_CHARS,
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Username {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Username {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(name: Username) -> Self {
        name.0
    }
}
