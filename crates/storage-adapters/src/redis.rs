//! # Redis adapters
//!
//! The ranking index is one sorted set (`ZADD` / `ZREVRANGE ... WITHSCORES`),
//! members are hyphenated post ids. Snapshots are plain string keys written
//! with `SET ... EX`.
//!
//! Redis orders equal scores by member, so a reverse range yields ties by post
//! id descending.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Pool, Runtime};
use domains::models::{PostId, RankingEntry};
use domains::traits::{RankingIndex, SnapshotCache};
use tracing::warn;
use uuid::Uuid;

/// Builds a connection pool. Connections are opened lazily.
pub fn connect(url: &str) -> anyhow::Result<Pool> {
    Config::from_url(url)
        .create_pool(Some(Runtime::Tokio1))
        .context("creating redis pool")
}

#[derive(Clone)]
pub struct RedisRankingIndex {
    pool: Pool,
    key: String,
}

impl RedisRankingIndex {
    pub fn new(pool: Pool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }
}

#[async_trait]
impl RankingIndex for RedisRankingIndex {
    async fn upsert(&self, post_id: PostId, score: f64) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        cmd("ZADD")
            .arg(&self.key)
            .arg(score)
            .arg(post_id.to_string())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn upsert_many(&self, entries: &[RankingEntry]) -> anyhow::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut zadd = cmd("ZADD");
        zadd.arg(&self.key);
        for entry in entries {
            zadd.arg(entry.score).arg(entry.post_id.to_string());
        }
        let mut conn = self.pool.get().await?;
        zadd.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn remove(&self, post_id: PostId) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        cmd("ZREM")
            .arg(&self.key)
            .arg(post_id.to_string())
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn range_with_scores(&self, start: u64, end: u64) -> anyhow::Result<Vec<RankingEntry>> {
        let mut conn = self.pool.get().await?;
        let raw: Vec<(String, f64)> = cmd("ZREVRANGE")
            .arg(&self.key)
            .arg(start)
            .arg(end)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|(member, score)| match Uuid::parse_str(&member) {
                Ok(post_id) => Some(RankingEntry { post_id, score }),
                Err(_) => {
                    warn!(key = %self.key, %member, "ignoring non-uuid ranking member");
                    None
                }
            })
            .collect())
    }

    async fn cardinality(&self) -> anyhow::Result<u64> {
        let mut conn = self.pool.get().await?;
        let count: u64 = cmd("ZCARD").arg(&self.key).query_async(&mut conn).await?;
        Ok(count)
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        cmd("DEL").arg(&self.key).query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisSnapshotCache {
    pool: Pool,
}

impl RedisSnapshotCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        // EX rejects 0.
        let seconds = ttl.as_secs().max(1);
        cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        cmd("DEL").arg(key).query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
