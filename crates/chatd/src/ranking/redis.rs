//! Ranking store backed by a Redis sorted set.
//!
//! Every user is a member of one sorted set whose score is their activity
//! count. Redis orders equal scores by member name, so a reverse range
//! yields the same order as `MemoryRankingStore`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use super::{RankingError, RankingStore};

/// Sorted set key used when none is configured.
pub const DEFAULT_RANKING_KEY: &str = "chatroom:activity";

/// Ranking store that talks to Redis through a reconnecting connection.
#[derive(Clone)]
pub struct RedisRankingStore {
    conn: ConnectionManager,
    key: String,
}

impl RedisRankingStore {
    /// Connects to `url` and uses `key` as the sorted set.
    ///
    /// # Errors
    ///
    /// - `RankingError::Unavailable` if the URL is malformed or the server
    ///   cannot be reached
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self, RankingError> {
        let client = Client::open(url).map_err(RankingError::unavailable)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(RankingError::unavailable)?;

        let key = key.into();
        info!(key = %key, "Connected to Redis ranking store");
        Ok(Self { conn, key })
    }

    /// Name of the sorted set holding the scores.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Inclusive stop index for a reverse range of `n` members.
///
/// `None` when `n` is zero, since a stop of `-1` would mean "everything".
fn range_stop(n: usize) -> Option<isize> {
    let n = isize::try_from(n).unwrap_or(isize::MAX);
    (n > 0).then(|| n - 1)
}

#[async_trait]
impl RankingStore for RedisRankingStore {
    async fn increment_score(&self, name: &str) -> Result<(), RankingError> {
        let mut conn = self.conn.clone();
        let score: f64 = conn
            .zincr(&self.key, name, 1)
            .await
            .map_err(RankingError::unavailable)?;
        debug!(name = %name, score, "Activity score incremented");
        Ok(())
    }

    async fn top_n(&self, n: usize) -> Result<Vec<String>, RankingError> {
        let Some(stop) = range_stop(n) else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn.clone();
        conn.zrevrange(&self.key, 0, stop)
            .await
            .map_err(RankingError::unavailable)
    }

    async fn all_ranked(&self) -> Result<Vec<String>, RankingError> {
        let mut conn = self.conn.clone();
        conn.zrevrange(&self.key, 0, -1)
            .await
            .map_err(RankingError::unavailable)
    }

    async fn rank_of(&self, name: &str) -> Result<Option<usize>, RankingError> {
        let mut conn = self.conn.clone();
        let rank: Option<usize> = conn
            .zrevrank(&self.key, name)
            .await
            .map_err(RankingError::unavailable)?;
        Ok(rank.map(|zero_based| zero_based + 1))
    }

    async fn delete_entry(&self, name: &str) -> Result<(), RankingError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .zrem(&self.key, name)
            .await
            .map_err(RankingError::unavailable)?;
        debug!(name = %name, removed, "Activity score deleted");
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), RankingError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .zremrangebyrank(&self.key, 0, -1)
            .await
            .map_err(RankingError::unavailable)?;
        debug!(removed, "Activity ranking cleared");
        Ok(())
    }
}

impl std::fmt::Debug for RedisRankingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRankingStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Redis-backed tests run only when this points at a disposable server.
    const TEST_URL_ENV: &str = "CHATD_TEST_REDIS_URL";

    async fn test_store(suffix: &str) -> Option<RedisRankingStore> {
        let url = std::env::var(TEST_URL_ENV).ok()?;
        let key = format!("chatroom:test:{}:{suffix}", std::process::id());
        let store = RedisRankingStore::connect(&url, key).await.unwrap();
        store.clear_all().await.unwrap();
        Some(store)
    }

    #[test]
    fn test_range_stop() {
        assert_eq!(range_stop(0), None);
        assert_eq!(range_stop(1), Some(0));
        assert_eq!(range_stop(10), Some(9));
        assert_eq!(range_stop(usize::MAX), Some(isize::MAX - 1));
    }

    #[tokio::test]
    async fn test_connect_malformed_url() {
        let err = RedisRankingStore::connect("not-a-redis-url", DEFAULT_RANKING_KEY)
            .await
            .unwrap_err();
        assert!(matches!(err, RankingError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_connect_unreachable_server() {
        // Port 1 is reserved and refuses connections on loopback
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            RedisRankingStore::connect("redis://127.0.0.1:1/", DEFAULT_RANKING_KEY),
        )
        .await;

        if let Ok(connected) = result {
            assert!(matches!(connected, Err(RankingError::Unavailable(_))));
        }
    }

    #[tokio::test]
    async fn test_ordering_matches_memory_store() {
        let Some(store) = test_store("order").await else {
            return;
        };

        for name in ["alice", "bob", "bob", "carol", "carol", "carol", "dave"] {
            store.increment_score(name).await.unwrap();
        }

        assert_eq!(
            store.all_ranked().await.unwrap(),
            vec!["carol", "bob", "dave", "alice"]
        );
        assert_eq!(store.top_n(2).await.unwrap(), vec!["carol", "bob"]);
        assert!(store.top_n(0).await.unwrap().is_empty());
        assert_eq!(store.rank_of("carol").await.unwrap(), Some(1));
        assert_eq!(store.rank_of("alice").await.unwrap(), Some(4));
        assert_eq!(store.rank_of("nobody").await.unwrap(), None);

        store.clear_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let Some(store) = test_store("delete").await else {
            return;
        };

        store.increment_score("alice").await.unwrap();
        store.increment_score("bob").await.unwrap();

        store.delete_entry("alice").await.unwrap();
        store.delete_entry("alice").await.unwrap();
        assert_eq!(store.all_ranked().await.unwrap(), vec!["bob"]);

        store.clear_all().await.unwrap();
        assert!(store.all_ranked().await.unwrap().is_empty());
    }
}
