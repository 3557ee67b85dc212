//! # Ranking Service
//!
//! Keeps the ranking index in step with the relational store and reads from it
//! without ever failing a request.
//!
//! # Developer Note
//! The index is a projection: every read degrades to "empty" when the backing
//! store errors or times out, and every write failure is only logged. The next
//! full rebuild repairs whatever was missed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use domains::error::{AppError, Result};
use domains::models::{PostId, RankingEntry};
use domains::traits::{PostRepo, RankingIndex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::guard::guarded;
use crate::options::EngineOptions;
use crate::scoring;

/// Time allowed for one bulk write during a rebuild.
const BULK_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const STORE: &str = "ranking_index";

/// Outcome of one full rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub indexed: u64,
    /// Posts that could not be scored.
    pub skipped: u64,
    /// Posts scored but not written because the index rejected the batch.
    pub failed: u64,
    pub pages: u32,
    pub elapsed_ms: u64,
}

pub struct RankingService {
    index: Arc<dyn RankingIndex>,
    posts: Arc<dyn PostRepo>,
    rebuild_page_size: u32,
    store_timeout: Duration,
}

impl RankingService {
    pub fn new(index: Arc<dyn RankingIndex>, posts: Arc<dyn PostRepo>, options: &EngineOptions) -> Self {
        Self {
            index,
            posts,
            rebuild_page_size: options.rebuild_page_size.max(1),
            store_timeout: options.store_timeout,
        }
    }

    /// Returns whether the write reached the index.
    pub async fn upsert(&self, post_id: PostId, score: f64) -> bool {
        guarded(STORE, "upsert", self.store_timeout, self.index.upsert(post_id, score))
            .await
            .is_some()
    }

    pub async fn remove(&self, post_id: PostId) -> bool {
        guarded(STORE, "remove", self.store_timeout, self.index.remove(post_id))
            .await
            .is_some()
    }

    pub async fn top_with_scores(&self, limit: u64) -> Vec<RankingEntry> {
        if limit == 0 {
            return Vec::new();
        }
        self.range_with_scores(0, limit - 1).await
    }

    pub async fn top_ids(&self, limit: u64) -> Vec<PostId> {
        ids(self.top_with_scores(limit).await)
    }

    /// Descending slice `[start, end]`, inclusive on both ends. `None` when
    /// the index failed or timed out, which is distinct from an empty slice.
    pub async fn read_range(&self, start: u64, end: u64) -> Option<Vec<RankingEntry>> {
        if end < start {
            return Some(Vec::new());
        }
        guarded(
            STORE,
            "range",
            self.store_timeout,
            self.index.range_with_scores(start, end),
        )
        .await
    }

    /// Like [`read_range`](Self::read_range), empty when the index is down.
    pub async fn range_with_scores(&self, start: u64, end: u64) -> Vec<RankingEntry> {
        self.read_range(start, end).await.unwrap_or_default()
    }

    /// Number of indexed posts, 0 when the index cannot be reached.
    pub async fn total(&self) -> u64 {
        guarded(STORE, "cardinality", self.store_timeout, self.index.cardinality())
            .await
            .unwrap_or(0)
    }

    /// Recomputes one post's score and writes it to the index.
    ///
    /// A post that no longer exists is dropped from the index and reported as
    /// not found.
    pub async fn update_score(&self, post_id: PostId) -> Result<f64> {
        let posts = self
            .posts
            .find_posts_by_ids(&[post_id])
            .await
            .map_err(AppError::unavailable)?;

        let Some(post) = posts.into_iter().find(|p| p.id == post_id) else {
            self.remove(post_id).await;
            return Err(AppError::NotFound("post".to_string(), post_id.to_string()));
        };

        let score = scoring::checked_total_score(&post, Utc::now())
            .map_err(|err| AppError::Internal(err.to_string()))?;
        if self.upsert(post_id, score).await {
            debug!(%post_id, score, "post score updated");
        }
        Ok(score)
    }

    /// Clears the index and re-scores every post, one page at a time.
    ///
    /// Posts that cannot be scored are skipped. Failing to read a page from
    /// the relational store ends the run with an error; the next run starts over.
    pub async fn rebuild_from_source(&self) -> Result<RebuildReport> {
        let started = Instant::now();
        let now = Utc::now();
        let mut report = RebuildReport::default();

        guarded(STORE, "clear", self.store_timeout, self.index.clear()).await;

        let mut page_number = 0u32;
        loop {
            let page = self
                .posts
                .find_all_posts_paged(self.rebuild_page_size, page_number)
                .await
                .map_err(|err| {
                    warn!(page_number, error = %err, "rebuild aborted: cannot read posts");
                    AppError::unavailable(err)
                })?;
            report.pages += 1;

            let mut entries = Vec::with_capacity(page.items.len());
            for post in &page.items {
                match scoring::checked_total_score(post, now) {
                    Ok(score) => entries.push(RankingEntry {
                        post_id: post.id,
                        score,
                    }),
                    Err(err) => {
                        report.skipped += 1;
                        warn!(post_id = %post.id, error = %err, "skipping post during rebuild");
                    }
                }
            }

            if !entries.is_empty() {
                let written = guarded(
                    STORE,
                    "upsert_many",
                    BULK_WRITE_TIMEOUT,
                    self.index.upsert_many(&entries),
                )
                .await;
                match written {
                    Some(()) => report.indexed += entries.len() as u64,
                    None => report.failed += entries.len() as u64,
                }
            }

            page_number += 1;
            let short_page = page.items.len() < self.rebuild_page_size as usize;
            if short_page || u64::from(page_number) >= page.total_pages {
                break;
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            failed = report.failed,
            pages = report.pages,
            elapsed_ms = report.elapsed_ms,
            "ranking index rebuilt"
        );
        Ok(report)
    }
}

fn ids(entries: Vec<RankingEntry>) -> Vec<PostId> {
    entries.into_iter().map(|e| e.post_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::models::{Page, Post};
    use domains::traits::{MockPostRepo, MockRankingIndex};
    use uuid::Uuid;

    fn post() -> Post {
        Post {
            id: Uuid::now_v7(),
            event_id: None,
            author_id: Uuid::now_v7(),
            content: "Shelter needs blankets".to_string(),
            created_at: Some(Utc::now()),
            reaction_count: 2,
            comment_count: 1,
            reaction_count_30d: 2,
            comment_count_30d: 1,
            like_count_30d: 2,
        }
    }

    fn service(index: MockRankingIndex, posts: MockPostRepo, page_size: u32) -> RankingService {
        let options = EngineOptions {
            rebuild_page_size: page_size,
            ..EngineOptions::default()
        };
        RankingService::new(Arc::new(index), Arc::new(posts), &options)
    }

    #[tokio::test]
    async fn reads_degrade_to_empty_when_store_is_down() {
        let mut index = MockRankingIndex::new();
        index
            .expect_range_with_scores()
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));
        index
            .expect_cardinality()
            .returning(|| Err(anyhow::anyhow!("connection refused")));

        let svc = service(index, MockPostRepo::new(), 10);
        assert!(svc.top_with_scores(10).await.is_empty());
        assert!(svc.range_with_scores(0, 9).await.is_empty());
        assert_eq!(svc.read_range(0, 9).await, None);
        assert_eq!(svc.total().await, 0);
    }

    #[tokio::test]
    async fn empty_range_is_not_a_failure() {
        let mut index = MockRankingIndex::new();
        index.expect_range_with_scores().returning(|_, _| Ok(Vec::new()));

        let svc = service(index, MockPostRepo::new(), 10);
        assert_eq!(svc.read_range(40, 49).await, Some(Vec::new()));
        assert_eq!(svc.read_range(5, 4).await, Some(Vec::new()));
    }

    #[tokio::test]
    async fn top_zero_never_touches_the_store() {
        let svc = service(MockRankingIndex::new(), MockPostRepo::new(), 10);
        assert!(svc.top_ids(0).await.is_empty());
    }

    #[tokio::test]
    async fn top_translates_limit_to_inclusive_range() {
        let mut index = MockRankingIndex::new();
        let id = Uuid::now_v7();
        index
            .expect_range_with_scores()
            .withf(|start, end| *start == 0 && *end == 4)
            .returning(move |_, _| Ok(vec![RankingEntry { post_id: id, score: 3.0 }]));

        let svc = service(index, MockPostRepo::new(), 10);
        assert_eq!(svc.top_ids(5).await, vec![id]);
    }

    #[tokio::test]
    async fn update_score_upserts_current_total() {
        let post = post();
        let id = post.id;
        let mut posts = MockPostRepo::new();
        posts
            .expect_find_posts_by_ids()
            .withf(move |ids| ids.len() == 1 && ids[0] == id)
            .returning(move |_| Ok(vec![post.clone()]));
        let mut index = MockRankingIndex::new();
        index
            .expect_upsert()
            .withf(move |post_id, score| *post_id == id && *score > 0.0)
            .times(1)
            .returning(|_, _| Ok(()));

        let svc = service(index, posts, 10);
        let score = svc.update_score(id).await.unwrap();
        // 1 comment * 5 + 2 likes * 2 + 2 reactions * 3 + edge weight 5 * recency 1
        assert!((score - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn update_score_swallows_index_write_failures() {
        let post = post();
        let id = post.id;
        let mut posts = MockPostRepo::new();
        posts
            .expect_find_posts_by_ids()
            .returning(move |_| Ok(vec![post.clone()]));
        let mut index = MockRankingIndex::new();
        index
            .expect_upsert()
            .returning(|_, _| Err(anyhow::anyhow!("READONLY replica")));

        let svc = service(index, posts, 10);
        assert!(svc.update_score(id).await.is_ok());
    }

    #[tokio::test]
    async fn update_score_removes_deleted_posts() {
        let id = Uuid::now_v7();
        let mut posts = MockPostRepo::new();
        posts.expect_find_posts_by_ids().returning(|_| Ok(Vec::new()));
        let mut index = MockRankingIndex::new();
        index
            .expect_remove()
            .withf(move |post_id| *post_id == id)
            .times(1)
            .returning(|_| Ok(()));

        let svc = service(index, posts, 10);
        let err = svc.update_score(id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_, _)));
    }

    #[tokio::test]
    async fn rebuild_pages_through_every_post() {
        let pages: Vec<Post> = (0..5).map(|_| post()).collect();
        let mut posts = MockPostRepo::new();
        posts
            .expect_find_all_posts_paged()
            .times(3)
            .returning(move |size, number| {
                let start = (size * number) as usize;
                let items: Vec<Post> = pages.iter().skip(start).take(size as usize).cloned().collect();
                Ok(Page::new(items, number, size, 5))
            });

        let mut index = MockRankingIndex::new();
        index.expect_clear().times(1).returning(|| Ok(()));
        index
            .expect_upsert_many()
            .times(3)
            .returning(|_| Ok(()));

        let svc = service(index, posts, 2);
        let report = svc.rebuild_from_source().await.unwrap();
        assert_eq!(report.indexed, 5);
        assert_eq!(report.pages, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn rebuild_keeps_going_when_a_batch_write_fails() {
        let all: Vec<Post> = (0..4).map(|_| post()).collect();
        let mut posts = MockPostRepo::new();
        posts.expect_find_all_posts_paged().returning(move |size, number| {
            let start = (size * number) as usize;
            let items: Vec<Post> = all.iter().skip(start).take(size as usize).cloned().collect();
            Ok(Page::new(items, number, size, 4))
        });

        let mut index = MockRankingIndex::new();
        index.expect_clear().returning(|| Err(anyhow::anyhow!("timeout")));
        let mut calls = 0;
        index.expect_upsert_many().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("OOM command not allowed"))
            } else {
                Ok(())
            }
        });

        let svc = service(index, posts, 2);
        let report = svc.rebuild_from_source().await.unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.indexed, 2);
    }

    #[tokio::test]
    async fn rebuild_aborts_when_source_is_unreachable() {
        let mut posts = MockPostRepo::new();
        posts
            .expect_find_all_posts_paged()
            .returning(|_, _| Err(anyhow::anyhow!("pool timed out")));
        let mut index = MockRankingIndex::new();
        index.expect_clear().returning(|| Ok(()));

        let svc = service(index, posts, 50);
        let err = svc.rebuild_from_source().await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }
}
