//! Batch loading of the author and event data shown next to posts.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::error::{AppError, Result};
use domains::models::{
    AuthorSummary, Event, EventId, EventSummary, Post, PostId, RankingEntry, ScoredPost, UserId,
};
use domains::traits::{EventRepo, PostRepo, UserRepo};
use tracing::warn;

use crate::scoring;

#[derive(Clone)]
pub struct Hydrator {
    users: Arc<dyn UserRepo>,
    events: Arc<dyn EventRepo>,
}

impl Hydrator {
    pub fn new(users: Arc<dyn UserRepo>, events: Arc<dyn EventRepo>) -> Self {
        Self { users, events }
    }

    /// Events referenced by `posts`, in one query.
    ///
    /// Errors propagate: visibility cannot be decided without events.
    pub async fn load_events(&self, posts: &[Post]) -> Result<HashMap<EventId, Event>> {
        let ids = distinct(posts.iter().filter_map(|p| p.event_id));
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let events = self
            .events
            .find_events_by_ids(&ids)
            .await
            .map_err(AppError::unavailable)?;
        Ok(events.into_iter().map(|e| (e.id, e)).collect())
    }

    /// Author summaries for `posts`, in one query. A failed lookup only costs
    /// the summaries.
    pub async fn load_authors(&self, posts: &[Post]) -> HashMap<UserId, AuthorSummary> {
        let ids = distinct(posts.iter().map(|p| p.author_id));
        if ids.is_empty() {
            return HashMap::new();
        }
        match self.users.find_authors_by_ids(&ids).await {
            Ok(authors) => authors.into_iter().map(|a| (a.id, a)).collect(),
            Err(err) => {
                warn!(error = %err, authors = ids.len(), "author lookup failed, serving without summaries");
                HashMap::new()
            }
        }
    }

    pub fn scored(
        post: Post,
        now: DateTime<Utc>,
        events: &HashMap<EventId, Event>,
        authors: &HashMap<UserId, AuthorSummary>,
        personalized_score: Option<f64>,
    ) -> ScoredPost {
        let breakdown = scoring::score(&post, now);
        let author = authors.get(&post.author_id).cloned();
        let event = post
            .event_id
            .and_then(|id| events.get(&id))
            .map(EventSummary::from);
        ScoredPost {
            post,
            affinity_score: breakdown.affinity,
            recency_factor: breakdown.recency,
            total_score: breakdown.total,
            personalized_score,
            author,
            event,
        }
    }
}

/// Posts for `entries` in ranking order. Ids missing from the store (deleted
/// since the last rebuild) are dropped.
pub(crate) async fn posts_in_ranking_order(
    posts: &dyn PostRepo,
    entries: &[RankingEntry],
) -> Result<Vec<Post>> {
    let ids: Vec<PostId> = entries.iter().map(|e| e.post_id).collect();
    let mut by_id: HashMap<PostId, Post> = posts
        .find_posts_by_ids(&ids)
        .await
        .map_err(AppError::unavailable)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Distinct values in first-seen order.
pub(crate) fn distinct<T: Eq + Hash + Copy>(values: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(*v)).collect()
}
