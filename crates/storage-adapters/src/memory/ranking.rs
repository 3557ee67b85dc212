use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use domains::models::{PostId, RankingEntry};
use domains::traits::RankingIndex;

/// Position in the index: highest score first, then highest post id.
#[derive(Debug, Clone, Copy)]
struct RankKey {
    score: f64,
    post_id: PostId,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.post_id.cmp(&self.post_id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

#[derive(Default)]
struct Inner {
    scores: HashMap<PostId, f64>,
    order: BTreeSet<RankKey>,
}

impl Inner {
    fn upsert(&mut self, post_id: PostId, score: f64) {
        if let Some(previous) = self.scores.insert(post_id, score) {
            self.order.remove(&RankKey {
                score: previous,
                post_id,
            });
        }
        self.order.insert(RankKey { score, post_id });
    }
}

/// Process-local ranking index with the same ordering as a Redis sorted set.
#[derive(Default)]
pub struct InMemoryRankingIndex {
    inner: RwLock<Inner>,
}

impl InMemoryRankingIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_finite(post_id: PostId, score: f64) -> anyhow::Result<()> {
    if !score.is_finite() {
        bail!("refusing non-finite score {score} for post {post_id}");
    }
    Ok(())
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("ranking index lock poisoned")
}

#[async_trait]
impl RankingIndex for InMemoryRankingIndex {
    async fn upsert(&self, post_id: PostId, score: f64) -> anyhow::Result<()> {
        check_finite(post_id, score)?;
        self.inner.write().map_err(poisoned)?.upsert(post_id, score);
        Ok(())
    }

    async fn upsert_many(&self, entries: &[RankingEntry]) -> anyhow::Result<()> {
        for entry in entries {
            check_finite(entry.post_id, entry.score)?;
        }
        let mut inner = self.inner.write().map_err(poisoned)?;
        for entry in entries {
            inner.upsert(entry.post_id, entry.score);
        }
        Ok(())
    }

    async fn remove(&self, post_id: PostId) -> anyhow::Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if let Some(score) = inner.scores.remove(&post_id) {
            inner.order.remove(&RankKey { score, post_id });
        }
        Ok(())
    }

    async fn range_with_scores(&self, start: u64, end: u64) -> anyhow::Result<Vec<RankingEntry>> {
        if end < start {
            return Ok(Vec::new());
        }
        let skip = usize::try_from(start).unwrap_or(usize::MAX);
        let take = usize::try_from(end - start).unwrap_or(usize::MAX).saturating_add(1);
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .order
            .iter()
            .skip(skip)
            .take(take)
            .map(|key| RankingEntry {
                post_id: key.post_id,
                score: key.score,
            })
            .collect())
    }

    async fn cardinality(&self) -> anyhow::Result<u64> {
        Ok(self.inner.read().map_err(poisoned)?.scores.len() as u64)
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.scores.clear();
        inner.order.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn ids(index: &InMemoryRankingIndex, start: u64, end: u64) -> Vec<PostId> {
        index
            .range_with_scores(start, end)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.post_id)
            .collect()
    }

    #[tokio::test]
    async fn ranges_are_descending_and_inclusive() {
        let index = InMemoryRankingIndex::new();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        index.upsert(a, 1.0).await.unwrap();
        index.upsert(b, 3.0).await.unwrap();
        index.upsert(c, 2.0).await.unwrap();

        assert_eq!(ids(&index, 0, 1).await, vec![b, c]);
        assert_eq!(ids(&index, 2, 10).await, vec![a]);
        assert!(ids(&index, 5, 9).await.is_empty());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_moves_entries() {
        let index = InMemoryRankingIndex::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        index.upsert(a, 1.0).await.unwrap();
        index.upsert(b, 2.0).await.unwrap();
        index.upsert(a, 9.0).await.unwrap();
        index.upsert(a, 9.0).await.unwrap();

        assert_eq!(index.cardinality().await.unwrap(), 2);
        assert_eq!(ids(&index, 0, 1).await, vec![a, b]);
    }

    #[tokio::test]
    async fn equal_scores_order_by_id_descending() {
        let index = InMemoryRankingIndex::new();
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        index
            .upsert_many(&[
                RankingEntry { post_id: low, score: 5.0 },
                RankingEntry { post_id: high, score: 5.0 },
            ])
            .await
            .unwrap();
        assert_eq!(ids(&index, 0, 1).await, vec![high, low]);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let index = InMemoryRankingIndex::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        index.upsert(a, 1.0).await.unwrap();
        index.upsert(b, 2.0).await.unwrap();
        index.remove(a).await.unwrap();
        index.remove(a).await.unwrap();
        assert_eq!(ids(&index, 0, 10).await, vec![b]);

        index.clear().await.unwrap();
        assert_eq!(index.cardinality().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejects_nan_scores() {
        let index = InMemoryRankingIndex::new();
        assert!(index.upsert(Uuid::now_v7(), f64::NAN).await.is_err());
        assert_eq!(index.cardinality().await.unwrap(), 0);
    }
}
