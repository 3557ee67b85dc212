use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use domains::traits::SnapshotCache;
use tokio::time::Instant;

/// Process-local snapshot cache. Expired entries are dropped on read.
#[derive(Default)]
pub struct InMemorySnapshotCache {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for InMemorySnapshotCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemorySnapshotCache::new();
        cache
            .put("feed:top:20", "[]".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("feed:top:20").await.unwrap().as_deref(), Some("[]"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("feed:top:20").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_only_its_key() {
        let cache = InMemorySnapshotCache::new();
        let ttl = Duration::from_secs(60);
        cache.put("feed:top:5", "a".to_string(), ttl).await.unwrap();
        cache.put("feed:top:20", "b".to_string(), ttl).await.unwrap();
        cache.delete("feed:top:5").await.unwrap();

        assert_eq!(cache.get("feed:top:5").await.unwrap(), None);
        assert_eq!(cache.get("feed:top:20").await.unwrap().as_deref(), Some("b"));
    }
}
