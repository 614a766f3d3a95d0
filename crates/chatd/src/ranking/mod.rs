//! Activity ranking store.
//!
//! The server records one point of activity per chat line and serves
//! leaderboards from it. The store sits behind the `RankingStore` trait so
//! the backing service can be swapped; every caller treats failures as
//! best-effort (log and carry on), so ranking never blocks chat delivery.

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis;

pub use self::redis::{RedisRankingStore, DEFAULT_RANKING_KEY};
pub use memory::MemoryRankingStore;

/// Number of entries in the short leaderboard.
pub const TOP_N: usize = 10;

/// Per-user activity scores with rank queries.
///
/// Rankings are ordered by descending score. Implementations must make
/// `increment_score` atomic with respect to concurrent callers.
#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Adds one to `name`'s score, creating the entry at 1 if absent.
    async fn increment_score(&self, name: &str) -> Result<(), RankingError>;

    /// The `n` highest-ranked names, best first.
    async fn top_n(&self, n: usize) -> Result<Vec<String>, RankingError>;

    /// Every ranked name, best first.
    async fn all_ranked(&self) -> Result<Vec<String>, RankingError>;

    /// 1-based position of `name`, or `None` if it has no entry.
    async fn rank_of(&self, name: &str) -> Result<Option<usize>, RankingError>;

    /// Removes `name`'s entry. Removing an absent entry is not an error.
    async fn delete_entry(&self, name: &str) -> Result<(), RankingError>;

    /// Removes every entry.
    async fn clear_all(&self) -> Result<(), RankingError>;
}

/// Errors returned by a ranking store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankingError {
    /// The backing store could not be reached or refused the request.
    #[error("ranking store unavailable: {0}")]
    Unavailable(String),
}

impl RankingError {
    /// Creates an unavailable error from any error type.
    pub fn unavailable<E: std::fmt::Display>(err: E) -> Self {
        Self::Unavailable(err.to_string())
    }
}
