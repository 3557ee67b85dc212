//! # Core Traits (Ports)
//!
//! Every store the feed engine talks to is reached through one of these traits.
//! Adapters live in `storage-adapters` and `auth-adapters`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::models::{
    AuthContext, AuthorSummary, Event, EventId, Page, Post, PostId, RankingEntry, Registration,
    UserId, ViewerEngagement,
};

/// Read access to posts in the relational store.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Batch lookup. No ordering guarantee; callers re-order.
    async fn find_posts_by_ids(&self, ids: &[PostId]) -> anyhow::Result<Vec<Post>>;

    /// Full scan in fixed-size pages, `page_number` is 0-based.
    async fn find_all_posts_paged(&self, page_size: u32, page_number: u32)
        -> anyhow::Result<Page<Post>>;

    /// Visibility-aware page of posts, newest first. Used when the ranking
    /// index cannot serve a feed.
    async fn find_visible_posts_paged(
        &self,
        viewer: Option<UserId>,
        page: u32,
        size: u32,
    ) -> anyhow::Result<Page<Post>>;
}

/// Read access to events and volunteer registrations.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn find_events_by_ids(&self, ids: &[EventId]) -> anyhow::Result<Vec<Event>>;

    async fn find_registrations_by_event_ids_and_volunteer(
        &self,
        event_ids: &[EventId],
        volunteer_id: UserId,
    ) -> anyhow::Result<Vec<Registration>>;
}

/// Read access to author summaries.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_authors_by_ids(&self, ids: &[UserId]) -> anyhow::Result<Vec<AuthorSummary>>;
}

/// Per-viewer engagement counts used for personalization.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait EngagementRepo: Send + Sync {
    /// Reactions since `since` and all comments left by `viewer` on each post.
    /// Posts without engagement may be absent from the map.
    async fn viewer_engagement(
        &self,
        post_ids: &[PostId],
        viewer: UserId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<HashMap<PostId, ViewerEngagement>>;
}

/// Sorted-set projection of post id -> total score.
///
/// Ranges are 0-based, inclusive and in descending score order. Equal scores
/// order by post id descending.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RankingIndex: Send + Sync {
    async fn upsert(&self, post_id: PostId, score: f64) -> anyhow::Result<()>;

    async fn upsert_many(&self, entries: &[RankingEntry]) -> anyhow::Result<()>;

    async fn remove(&self, post_id: PostId) -> anyhow::Result<()>;

    async fn range_with_scores(&self, start: u64, end: u64) -> anyhow::Result<Vec<RankingEntry>>;

    async fn cardinality(&self) -> anyhow::Result<u64>;

    async fn clear(&self) -> anyhow::Result<()>;
}

/// Key/value store with expiry holding serialized snapshots.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Identity contract: turns request credentials into an optional user id.
///
/// Never fails; anything unverifiable is an anonymous viewer.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait ViewerResolver: Send + Sync {
    fn resolve_viewer_id(&self, ctx: &AuthContext) -> Option<UserId>;
}
