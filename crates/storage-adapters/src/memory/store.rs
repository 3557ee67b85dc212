//! # In-Memory Feed Store
//!
//! A relational-store stand-in for local runs and tests. Implements every read
//! port the engine consumes over a handful of `DashMap`s.
//!
//! # Developer Note
//! Seeded posts carry their own counters. Reactions and comments recorded
//! through [`InMemoryFeedStore::record_reaction`] and
//! [`InMemoryFeedStore::record_comment`] are added on top at read time, with
//! the 30-day window evaluated against the current clock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use domains::models::{
    ApprovalStatus, AuthorSummary, Event, EventId, Page, Post, PostId, ReactionKind,
    Registration, RegistrationStatus, UserId, ViewerEngagement,
};
use domains::traits::{EngagementRepo, EventRepo, PostRepo, UserRepo};

const WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone)]
struct Reaction {
    user_id: UserId,
    kind: ReactionKind,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Comment {
    user_id: UserId,
    at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryFeedStore {
    posts: DashMap<PostId, Post>,
    events: DashMap<EventId, Event>,
    registrations: DashMap<(EventId, UserId), RegistrationStatus>,
    authors: DashMap<UserId, AuthorSummary>,
    reactions: DashMap<PostId, Vec<Reaction>>,
    comments: DashMap<PostId, Vec<Comment>>,
}

impl InMemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_post(&self, post: Post) {
        self.posts.insert(post.id, post);
    }

    /// Deletes the post and its recorded activity. Returns whether it existed.
    pub fn delete_post(&self, post_id: PostId) -> bool {
        self.reactions.remove(&post_id);
        self.comments.remove(&post_id);
        self.posts.remove(&post_id).is_some()
    }

    pub fn insert_event(&self, event: Event) {
        self.events.insert(event.id, event);
    }

    /// Returns whether the event exists.
    pub fn set_event_status(&self, event_id: EventId, status: ApprovalStatus) -> bool {
        match self.events.get_mut(&event_id) {
            Some(mut event) => {
                event.status = status;
                true
            }
            None => false,
        }
    }

    pub fn insert_registration(&self, registration: Registration) {
        self.registrations.insert(
            (registration.event_id, registration.volunteer_id),
            registration.status,
        );
    }

    pub fn insert_author(&self, author: AuthorSummary) {
        self.authors.insert(author.id, author);
    }

    pub fn record_reaction(&self, post_id: PostId, user_id: UserId, kind: ReactionKind, at: DateTime<Utc>) {
        self.reactions
            .entry(post_id)
            .or_default()
            .push(Reaction { user_id, kind, at });
    }

    pub fn record_comment(&self, post_id: PostId, user_id: UserId, at: DateTime<Utc>) {
        self.comments
            .entry(post_id)
            .or_default()
            .push(Comment { user_id, at });
    }

    /// The post with recorded activity folded into its counters.
    fn materialize(&self, post: &Post, since: DateTime<Utc>) -> Post {
        let mut post = post.clone();
        if let Some(reactions) = self.reactions.get(&post.id) {
            for reaction in reactions.iter() {
                post.reaction_count += 1;
                if reaction.at >= since {
                    post.reaction_count_30d += 1;
                    if reaction.kind.is_positive() {
                        post.like_count_30d += 1;
                    }
                }
            }
        }
        if let Some(comments) = self.comments.get(&post.id) {
            for comment in comments.iter() {
                post.comment_count += 1;
                if comment.at >= since {
                    post.comment_count_30d += 1;
                }
            }
        }
        post
    }

    fn snapshot(&self) -> Vec<Post> {
        let since = Utc::now() - Duration::days(WINDOW_DAYS);
        self.posts
            .iter()
            .map(|entry| self.materialize(entry.value(), since))
            .collect()
    }

    fn visible_to(&self, post: &Post, viewer: Option<UserId>) -> bool {
        let Some(event_id) = post.event_id else {
            return true;
        };
        let approved = self
            .events
            .get(&event_id)
            .is_some_and(|e| e.status == ApprovalStatus::Approved);
        if approved {
            return true;
        }
        let Some(viewer) = viewer else {
            return false;
        };
        post.author_id == viewer
            || self
                .registrations
                .get(&(event_id, viewer))
                .is_some_and(|status| status.grants_visibility())
    }
}

fn page_of(mut posts: Vec<Post>, page: u32, size: u32) -> Page<Post> {
    let total = posts.len() as u64;
    let from = (page as usize).saturating_mul(size as usize).min(posts.len());
    let to = from.saturating_add(size as usize).min(posts.len());
    Page::new(posts.drain(from..to).collect(), page, size, total)
}

#[async_trait]
impl PostRepo for InMemoryFeedStore {
    async fn find_posts_by_ids(&self, ids: &[PostId]) -> anyhow::Result<Vec<Post>> {
        let since = Utc::now() - Duration::days(WINDOW_DAYS);
        Ok(ids
            .iter()
            .filter_map(|id| self.posts.get(id).map(|p| self.materialize(p.value(), since)))
            .collect())
    }

    async fn find_all_posts_paged(&self, page_size: u32, page_number: u32) -> anyhow::Result<Page<Post>> {
        let mut posts = self.snapshot();
        posts.sort_by_key(|p| p.id);
        Ok(page_of(posts, page_number, page_size))
    }

    async fn find_visible_posts_paged(
        &self,
        viewer: Option<UserId>,
        page: u32,
        size: u32,
    ) -> anyhow::Result<Page<Post>> {
        let mut posts: Vec<Post> = self
            .snapshot()
            .into_iter()
            .filter(|p| self.visible_to(p, viewer))
            .collect();
        // Newest first; undated rows last.
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(page_of(posts, page, size))
    }
}

#[async_trait]
impl EventRepo for InMemoryFeedStore {
    async fn find_events_by_ids(&self, ids: &[EventId]) -> anyhow::Result<Vec<Event>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.events.get(id).map(|e| e.value().clone()))
            .collect())
    }

    async fn find_registrations_by_event_ids_and_volunteer(
        &self,
        event_ids: &[EventId],
        volunteer_id: UserId,
    ) -> anyhow::Result<Vec<Registration>> {
        Ok(event_ids
            .iter()
            .filter_map(|event_id| {
                self.registrations
                    .get(&(*event_id, volunteer_id))
                    .map(|status| Registration {
                        event_id: *event_id,
                        volunteer_id,
                        status: *status,
                    })
            })
            .collect())
    }
}

#[async_trait]
impl UserRepo for InMemoryFeedStore {
    async fn find_authors_by_ids(&self, ids: &[UserId]) -> anyhow::Result<Vec<AuthorSummary>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.authors.get(id).map(|a| a.value().clone()))
            .collect())
    }
}

#[async_trait]
impl EngagementRepo for InMemoryFeedStore {
    async fn viewer_engagement(
        &self,
        post_ids: &[PostId],
        viewer: UserId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<HashMap<PostId, ViewerEngagement>> {
        let mut out = HashMap::new();
        for post_id in post_ids {
            let reactions_30d = self.reactions.get(post_id).map_or(0, |list| {
                list.iter()
                    .filter(|r| r.user_id == viewer && r.at >= since)
                    .count() as i64
            });
            let comments = self.comments.get(post_id).map_or(0, |list| {
                list.iter().filter(|c| c.user_id == viewer).count() as i64
            });
            if reactions_30d > 0 || comments > 0 {
                out.insert(
                    *post_id,
                    ViewerEngagement {
                        reactions_30d,
                        comments,
                    },
                );
            }
        }
        Ok(out)
    }
}
