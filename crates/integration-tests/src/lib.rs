//! Shared fixtures for the end-to-end suites: an engine wired over the
//! in-memory adapters plus builders for posts, events and registrations.

use std::sync::Arc;

use chrono::{Duration, Utc};
use domains::models::{
    ApprovalStatus, AuthorSummary, Event, EventId, Post, PostId, Registration,
    RegistrationStatus, UserId,
};
use domains::traits::{RankingIndex, SnapshotCache};
use services::{EngineOptions, FeedEngine, Ports};
use storage_adapters::memory::{InMemoryFeedStore, InMemoryRankingIndex, InMemorySnapshotCache};
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<InMemoryFeedStore>,
    pub index: Arc<InMemoryRankingIndex>,
    pub cache: Arc<InMemorySnapshotCache>,
    pub engine: Arc<FeedEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let store = Arc::new(InMemoryFeedStore::new());
        let index = Arc::new(InMemoryRankingIndex::new());
        let cache = Arc::new(InMemorySnapshotCache::new());
        let engine = Arc::new(FeedEngine::new(
            ports(store.clone(), index.clone(), cache.clone()),
            options,
        ));
        Self {
            store,
            index,
            cache,
            engine,
        }
    }

    /// Adds a post by a fresh author, `minutes_ago` old.
    pub fn post(&self, event_id: Option<EventId>, minutes_ago: i64) -> Post {
        self.post_by(Uuid::now_v7(), event_id, minutes_ago)
    }

    pub fn post_by(&self, author_id: UserId, event_id: Option<EventId>, minutes_ago: i64) -> Post {
        let post = post(author_id, event_id, minutes_ago);
        self.store.insert_author(AuthorSummary {
            id: author_id,
            display_name: format!("volunteer-{}", &author_id.to_string()[..8]),
            avatar_url: None,
        });
        self.store.insert_post(post.clone());
        post
    }

    /// Adds a post with `comments_30d` comments already counted.
    pub fn popular_post(&self, comments_30d: i64, minutes_ago: i64) -> Post {
        let mut post = post(Uuid::now_v7(), None, minutes_ago);
        post.comment_count = comments_30d;
        post.comment_count_30d = comments_30d;
        self.store.insert_post(post.clone());
        post
    }

    pub fn event(&self, status: ApprovalStatus) -> EventId {
        let event = Event {
            id: Uuid::now_v7(),
            title: format!("{status} event"),
            status,
        };
        let id = event.id;
        self.store.insert_event(event);
        id
    }

    pub fn register(&self, event_id: EventId, volunteer_id: UserId, status: RegistrationStatus) {
        self.store.insert_registration(Registration {
            event_id,
            volunteer_id,
            status,
        });
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn ports(
    store: Arc<InMemoryFeedStore>,
    index: Arc<dyn RankingIndex>,
    cache: Arc<dyn SnapshotCache>,
) -> Ports {
    Ports {
        posts: store.clone(),
        events: store.clone(),
        users: store.clone(),
        engagement: store,
        index,
        cache,
    }
}

pub fn post(author_id: UserId, event_id: Option<EventId>, minutes_ago: i64) -> Post {
    Post {
        id: Uuid::now_v7(),
        event_id,
        author_id,
        content: "Thanks to everyone who showed up today".to_string(),
        created_at: Some(Utc::now() - Duration::minutes(minutes_ago)),
        reaction_count: 0,
        comment_count: 0,
        reaction_count_30d: 0,
        comment_count_30d: 0,
        like_count_30d: 0,
    }
}

pub fn ids(posts: &[domains::models::ScoredPost]) -> Vec<PostId> {
    posts.iter().map(|p| p.post.id).collect()
}
