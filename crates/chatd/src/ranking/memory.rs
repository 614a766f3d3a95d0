//! In-process ranking store.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{RankingError, RankingStore};

/// Ranking store kept in memory for the lifetime of the process.
///
/// Ties on score are broken by name in descending order, matching a
/// reverse range over a sorted set.
#[derive(Debug, Default)]
pub struct MemoryRankingStore {
    scores: RwLock<HashMap<String, u64>>,
}

impl MemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `(name, score)` pairs.
    pub fn with_scores<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let scores = entries
            .into_iter()
            .map(|(name, score)| (name.into(), score))
            .collect();
        Self {
            scores: RwLock::new(scores),
        }
    }

    /// Current score for `name`, if any.
    pub async fn score_of(&self, name: &str) -> Option<u64> {
        self.scores.read().await.get(name).copied()
    }

    async fn ranked(&self) -> Vec<String> {
        let scores = self.scores.read().await;
        let mut entries: Vec<(&String, &u64)> = scores.iter().collect();
        entries.sort_by(|a, b| rank_order(a, b));
        entries.into_iter().map(|(name, _)| name.clone()).collect()
    }
}

fn rank_order(a: &(&String, &u64), b: &(&String, &u64)) -> Ordering {
    b.1.cmp(a.1).then_with(|| b.0.cmp(a.0))
}

#[async_trait]
impl RankingStore for MemoryRankingStore {
    async fn increment_score(&self, name: &str) -> Result<(), RankingError> {
        let mut scores = self.scores.write().await;
        let score = scores.entry(name.to_string()).or_insert(0);
        *score = score.saturating_add(1);
        debug!(name = %name, score = *score, "Activity score incremented");
        Ok(())
    }

    async fn top_n(&self, n: usize) -> Result<Vec<String>, RankingError> {
        let mut ranked = self.ranked().await;
        ranked.truncate(n);
        Ok(ranked)
    }

    async fn all_ranked(&self) -> Result<Vec<String>, RankingError> {
        Ok(self.ranked().await)
    }

    async fn rank_of(&self, name: &str) -> Result<Option<usize>, RankingError> {
        Ok(self
            .ranked()
            .await
            .iter()
            .position(|entry| entry == name)
            .map(|index| index + 1))
    }

    async fn delete_entry(&self, name: &str) -> Result<(), RankingError> {
        if self.scores.write().await.remove(name).is_some() {
            debug!(name = %name, "Activity score deleted");
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), RankingError> {
        self.scores.write().await.clear();
        Ok(())
    }
}
