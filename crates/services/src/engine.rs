//! # Feed Engine
//!
//! The single entry point adapters call. Wires the ranking service, the top
//! posts cache and the feed assembler over one set of ports.

use std::sync::Arc;

use domains::error::Result;
use domains::models::{EventId, PostId, ScoredPost, UserId};
use domains::traits::{EngagementRepo, EventRepo, PostRepo, RankingIndex, SnapshotCache, UserRepo};
use tracing::{info, instrument};

use crate::feed::{FeedAssembler, FeedPage};
use crate::hydrate::Hydrator;
use crate::options::EngineOptions;
use crate::ranking::{RankingService, RebuildReport};
use crate::top_posts::{TopPosts, TopPostsCache};

/// Everything the engine reads from or writes to.
#[derive(Clone)]
pub struct Ports {
    pub posts: Arc<dyn PostRepo>,
    pub events: Arc<dyn EventRepo>,
    pub users: Arc<dyn UserRepo>,
    pub engagement: Arc<dyn EngagementRepo>,
    pub index: Arc<dyn RankingIndex>,
    pub cache: Arc<dyn SnapshotCache>,
}

pub struct FeedEngine {
    ranking: Arc<RankingService>,
    top: TopPostsCache,
    feed: FeedAssembler,
    options: EngineOptions,
}

impl FeedEngine {
    pub fn new(ports: Ports, options: EngineOptions) -> Self {
        let ranking = Arc::new(RankingService::new(
            ports.index.clone(),
            ports.posts.clone(),
            &options,
        ));
        let hydrator = Hydrator::new(ports.users.clone(), ports.events.clone());
        let top = TopPostsCache::new(
            ranking.clone(),
            ports.posts.clone(),
            ports.cache.clone(),
            hydrator.clone(),
            &options,
        );
        let feed = FeedAssembler::new(
            ranking.clone(),
            ports.posts,
            ports.events,
            ports.engagement,
            hydrator,
            &options,
        );
        Self {
            ranking,
            top,
            feed,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn ranking(&self) -> &RankingService {
        &self.ranking
    }

    /// Re-scores one post after a reaction or comment changed.
    #[instrument(skip(self))]
    pub async fn update_post_score(&self, post_id: PostId) -> Result<f64> {
        self.ranking.update_score(post_id).await
    }

    /// Drops a deleted post from the index. Returns whether the index was reached.
    #[instrument(skip(self))]
    pub async fn remove_post(&self, post_id: PostId) -> bool {
        self.ranking.remove(post_id).await
    }

    pub async fn rebuild_ranking_from_source(&self) -> Result<RebuildReport> {
        self.ranking.rebuild_from_source().await
    }

    pub async fn refresh_top_posts_cache(&self, limit: u32) -> Result<Vec<ScoredPost>> {
        self.top.refresh_top_posts_cache(limit).await
    }

    pub async fn invalidate_top_posts_cache(&self, limit: u32) -> bool {
        self.top.invalidate_top_posts_cache(limit).await
    }

    pub async fn get_top_posts_cached(&self, limit: u32) -> Result<TopPosts> {
        self.top.get_top_posts_cached(limit).await
    }

    /// Refresh of the default-limit snapshot, as run by the scheduler.
    pub async fn scheduled_top_refresh(&self) -> Result<usize> {
        self.top.scheduled_refresh().await
    }

    pub async fn get_visible_posts(
        &self,
        viewer: Option<UserId>,
        page: u32,
        size: u32,
    ) -> Result<FeedPage> {
        self.feed.get_visible_posts(viewer, page, size).await
    }

    /// An event was approved or rejected: every score is recomputed and the
    /// default public snapshot is dropped so it cannot show stale visibility.
    #[instrument(skip(self))]
    pub async fn on_event_status_changed(&self, event_id: EventId) -> Result<RebuildReport> {
        let report = self.ranking.rebuild_from_source().await?;
        self.top.invalidate_top_posts_cache(self.top.default_limit()).await;
        info!(%event_id, indexed = report.indexed, "event status change applied");
        Ok(report)
    }
}
