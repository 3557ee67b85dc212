//! # Top-N Snapshot Cache
//!
//! Serves the public "top posts" list from a TTL snapshot keyed by limit
//! (`{prefix}:{limit}`). The snapshot holds fully denormalized posts, so a hit
//! costs one cache read.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domains::error::{AppError, Result};
use domains::models::{Post, RankingEntry, ScoredPost};
use domains::traits::{PostRepo, SnapshotCache};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::guard::guarded;
use crate::hydrate::{posts_in_ranking_order, Hydrator};
use crate::options::EngineOptions;
use crate::ranking::RankingService;
use crate::scoring;
use crate::visibility::is_visible;

const STORE: &str = "snapshot_cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopPosts {
    pub posts: Vec<ScoredPost>,
    pub cache: CacheStatus,
}

pub struct TopPostsCache {
    ranking: Arc<RankingService>,
    posts: Arc<dyn PostRepo>,
    cache: Arc<dyn SnapshotCache>,
    hydrator: Hydrator,
    key_prefix: String,
    ttl: Duration,
    store_timeout: Duration,
    candidate_multiplier: u32,
    scan_page_size: u32,
    default_limit: u32,
    max_limit: u32,
}

impl TopPostsCache {
    pub fn new(
        ranking: Arc<RankingService>,
        posts: Arc<dyn PostRepo>,
        cache: Arc<dyn SnapshotCache>,
        hydrator: Hydrator,
        options: &EngineOptions,
    ) -> Self {
        Self {
            ranking,
            posts,
            cache,
            hydrator,
            key_prefix: options.top_key_prefix.clone(),
            ttl: options.cache_ttl,
            store_timeout: options.store_timeout,
            candidate_multiplier: options.candidate_multiplier.max(1),
            scan_page_size: options.rebuild_page_size.max(1),
            default_limit: options.top_limit,
            max_limit: options.max_page_size,
        }
    }

    pub fn key(&self, limit: u32) -> String {
        format!("{}:{limit}", self.key_prefix)
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    /// Cached top posts, recomputed and stored on a miss.
    pub async fn get_top_posts_cached(&self, limit: u32) -> Result<TopPosts> {
        self.check_limit(limit)?;
        let key = self.key(limit);

        if let Some(Some(payload)) =
            guarded(STORE, "get", self.store_timeout, self.cache.get(&key)).await
        {
            match serde_json::from_str::<Vec<ScoredPost>>(&payload) {
                Ok(posts) => {
                    debug!(%key, posts = posts.len(), "top posts cache hit");
                    return Ok(TopPosts {
                        posts,
                        cache: CacheStatus::Hit,
                    });
                }
                Err(err) => warn!(%key, error = %err, "discarding malformed top posts snapshot"),
            }
        }

        let posts = self.compute_and_store(limit).await?;
        Ok(TopPosts {
            posts,
            cache: CacheStatus::Miss,
        })
    }

    /// Recomputes the snapshot for `limit` regardless of what is cached.
    pub async fn refresh_top_posts_cache(&self, limit: u32) -> Result<Vec<ScoredPost>> {
        self.check_limit(limit)?;
        self.compute_and_store(limit).await
    }

    /// Returns whether the delete reached the cache.
    pub async fn invalidate_top_posts_cache(&self, limit: u32) -> bool {
        let key = self.key(limit);
        let deleted = guarded(STORE, "delete", self.store_timeout, self.cache.delete(&key))
            .await
            .is_some();
        if deleted {
            debug!(%key, "top posts snapshot invalidated");
        }
        deleted
    }

    /// Refresh for the configured default limit; run by the scheduler.
    pub async fn scheduled_refresh(&self) -> Result<usize> {
        let posts = self.refresh_top_posts_cache(self.default_limit).await?;
        Ok(posts.len())
    }

    fn check_limit(&self, limit: u32) -> Result<()> {
        if limit == 0 || limit > self.max_limit {
            return Err(AppError::ValidationError(format!(
                "limit must be between 1 and {}, got {limit}",
                self.max_limit
            )));
        }
        Ok(())
    }

    async fn compute_and_store(&self, limit: u32) -> Result<Vec<ScoredPost>> {
        let posts = self.compute(limit).await?;
        let key = self.key(limit);
        match serde_json::to_string(&posts) {
            Ok(payload) => {
                let stored = guarded(
                    STORE,
                    "put",
                    self.store_timeout,
                    self.cache.put(&key, payload, self.ttl),
                )
                .await;
                if stored.is_some() {
                    debug!(%key, posts = posts.len(), ttl_secs = self.ttl.as_secs(), "top posts snapshot stored");
                }
            }
            Err(err) => warn!(%key, error = %err, "cannot serialize top posts snapshot"),
        }
        Ok(posts)
    }

    async fn compute(&self, limit: u32) -> Result<Vec<ScoredPost>> {
        let now = Utc::now();

        // 1. Over-fetch from the index; some candidates belong to hidden events.
        let need = u64::from(limit) * u64::from(self.candidate_multiplier);
        let entries = self.ranking.top_with_scores(need).await;
        let candidates = if entries.is_empty() {
            self.scan_all(now).await?
        } else {
            posts_in_ranking_order(self.posts.as_ref(), &entries).await?
        };

        // 2. Apply the anonymous visibility rule, then cut to size.
        let events = self.hydrator.load_events(&candidates).await?;
        let no_registrations = Default::default();
        let top: Vec<Post> = candidates
            .into_iter()
            .filter(|p| {
                let event = p.event_id.and_then(|id| events.get(&id));
                is_visible(p, event, None, &no_registrations)
            })
            .take(limit as usize)
            .collect();

        // 3. Denormalize.
        let authors = self.hydrator.load_authors(&top).await;
        Ok(top
            .into_iter()
            .map(|p| Hydrator::scored(p, now, &events, &authors, None))
            .collect())
    }

    /// Every post from the relational store, scored and sorted best first.
    /// Used when the index is empty or unreachable.
    async fn scan_all(&self, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let mut scored: Vec<(RankingEntry, Post)> = Vec::new();
        let mut page_number = 0u32;
        loop {
            let page = self
                .posts
                .find_all_posts_paged(self.scan_page_size, page_number)
                .await
                .map_err(|err| {
                    warn!(page_number, error = %err, "top posts scan failed");
                    AppError::unavailable(err)
                })?;
            let fetched = page.items.len();
            for post in page.items {
                match scoring::checked_total_score(&post, now) {
                    Ok(score) => scored.push((RankingEntry { post_id: post.id, score }, post)),
                    Err(err) => warn!(post_id = %post.id, error = %err, "skipping unscorable post"),
                }
            }
            page_number += 1;
            if fetched < self.scan_page_size as usize || u64::from(page_number) >= page.total_pages {
                break;
            }
        }

        scored.sort_by(|(a, _), (b, _)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.post_id.cmp(&a.post_id))
        });
        info!(posts = scored.len(), pages = page_number, "top posts computed by full scan");
        Ok(scored.into_iter().map(|(_, post)| post).collect())
    }
}
