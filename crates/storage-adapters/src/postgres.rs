//! # Postgres Feed Repository
//!
//! Maps the relational model onto the domain models. Engagement counters are
//! aggregated in SQL at read time, so the engine never counts rows itself.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE users  (id UUID PRIMARY KEY, display_name TEXT NOT NULL, avatar_url TEXT);
//! CREATE TABLE events (id UUID PRIMARY KEY, title TEXT NOT NULL, status TEXT NOT NULL);
//! CREATE TABLE event_registrations (
//!     event_id UUID NOT NULL REFERENCES events(id),
//!     volunteer_id UUID NOT NULL REFERENCES users(id),
//!     status TEXT NOT NULL
//! );
//! CREATE TABLE posts (
//!     id UUID PRIMARY KEY,
//!     event_id UUID REFERENCES events(id),
//!     author_id UUID NOT NULL REFERENCES users(id),
//!     content TEXT NOT NULL,
//!     created_at TIMESTAMPTZ
//! );
//! CREATE TABLE reactions (post_id UUID NOT NULL, user_id UUID NOT NULL, kind TEXT NOT NULL, created_at TIMESTAMPTZ NOT NULL);
//! CREATE TABLE comments  (post_id UUID NOT NULL, user_id UUID NOT NULL, created_at TIMESTAMPTZ NOT NULL);
//! ```

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domains::models::{
    ApprovalStatus, AuthorSummary, Event, EventId, Page, Post, PostId, Registration,
    RegistrationStatus, UserId, ViewerEngagement,
};
use domains::traits::{EngagementRepo, EventRepo, PostRepo, UserRepo};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

const WINDOW_DAYS: i64 = 30;

/// Post columns plus aggregated counters. `$1` is the start of the 30-day window.
const POST_SELECT: &str = "
    SELECT p.id, p.event_id, p.author_id, p.content, p.created_at,
        (SELECT COUNT(*) FROM reactions r WHERE r.post_id = p.id) AS reaction_count,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
        (SELECT COUNT(*) FROM reactions r WHERE r.post_id = p.id AND r.created_at >= $1) AS reaction_count_30d,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id AND c.created_at >= $1) AS comment_count_30d,
        (SELECT COUNT(*) FROM reactions r WHERE r.post_id = p.id AND r.created_at >= $1
            AND r.kind IN ('LIKE', 'LOVE')) AS like_count_30d
    FROM posts p";

/// Visibility rule for the fallback query; `viewer` names the bind holding
/// the optional viewer id.
fn visible_predicate(viewer: &str) -> String {
    format!(
        "(p.event_id IS NULL
          OR EXISTS (SELECT 1 FROM events e WHERE e.id = p.event_id AND e.status = 'APPROVED')
          OR ({viewer}::uuid IS NOT NULL AND (
                p.author_id = {viewer}::uuid
                OR EXISTS (SELECT 1 FROM event_registrations er
                           WHERE er.event_id = p.event_id AND er.volunteer_id = {viewer}::uuid
                             AND er.status IN ('APPROVED', 'CHECKED_IN', 'COMPLETED')))))"
    )
}

pub struct PgFeedRepository {
    pool: PgPool,
}

impl PgFeedRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("connecting to postgres")?;
        Ok(Self::new(pool))
    }
}

fn window_start() -> DateTime<Utc> {
    Utc::now() - Duration::days(WINDOW_DAYS)
}

fn offset(page: u32, size: u32) -> i64 {
    i64::from(page).saturating_mul(i64::from(size))
}

fn map_post(row: &PgRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        author_id: row.try_get("author_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        reaction_count: row.try_get("reaction_count")?,
        comment_count: row.try_get("comment_count")?,
        reaction_count_30d: row.try_get("reaction_count_30d")?,
        comment_count_30d: row.try_get("comment_count_30d")?,
        like_count_30d: row.try_get("like_count_30d")?,
    })
}

fn map_posts(rows: Vec<PgRow>) -> anyhow::Result<Vec<Post>> {
    rows.iter().map(map_post).collect()
}

#[async_trait]
impl PostRepo for PgFeedRepository {
    async fn find_posts_by_ids(&self, ids: &[PostId]) -> anyhow::Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{POST_SELECT} WHERE p.id = ANY($2)");
        let rows = sqlx::query(&sql)
            .bind(window_start())
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        map_posts(rows)
    }

    async fn find_all_posts_paged(&self, page_size: u32, page_number: u32) -> anyhow::Result<Page<Post>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        // Ordered by id so pages stay stable while the scan runs.
        let sql = format!("{POST_SELECT} ORDER BY p.id LIMIT $2 OFFSET $3");
        let rows = sqlx::query(&sql)
            .bind(window_start())
            .bind(i64::from(page_size))
            .bind(offset(page_number, page_size))
            .fetch_all(&self.pool)
            .await?;
        Ok(Page::new(map_posts(rows)?, page_number, page_size, total.max(0) as u64))
    }

    async fn find_visible_posts_paged(
        &self,
        viewer: Option<UserId>,
        page: u32,
        size: u32,
    ) -> anyhow::Result<Page<Post>> {
        let count_sql = format!("SELECT COUNT(*) FROM posts p WHERE {}", visible_predicate("$1"));
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(viewer)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "{POST_SELECT} WHERE {} ORDER BY p.created_at DESC NULLS LAST, p.id DESC LIMIT $3 OFFSET $4",
            visible_predicate("$2")
        );
        let rows = sqlx::query(&sql)
            .bind(window_start())
            .bind(viewer)
            .bind(i64::from(size))
            .bind(offset(page, size))
            .fetch_all(&self.pool)
            .await?;
        Ok(Page::new(map_posts(rows)?, page, size, total.max(0) as u64))
    }
}

#[async_trait]
impl EventRepo for PgFeedRepository {
    async fn find_events_by_ids(&self, ids: &[EventId]) -> anyhow::Result<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT id, title, status FROM events WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> anyhow::Result<Event> {
                Ok(Event {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    status: row.try_get::<String, _>("status")?.parse::<ApprovalStatus>()?,
                })
            })
            .collect()
    }

    async fn find_registrations_by_event_ids_and_volunteer(
        &self,
        event_ids: &[EventId],
        volunteer_id: UserId,
    ) -> anyhow::Result<Vec<Registration>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT event_id, volunteer_id, status FROM event_registrations
             WHERE event_id = ANY($1) AND volunteer_id = $2",
        )
        .bind(event_ids)
        .bind(volunteer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> anyhow::Result<Registration> {
                Ok(Registration {
                    event_id: row.try_get("event_id")?,
                    volunteer_id: row.try_get("volunteer_id")?,
                    status: row
                        .try_get::<String, _>("status")?
                        .parse::<RegistrationStatus>()?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl UserRepo for PgFeedRepository {
    async fn find_authors_by_ids(&self, ids: &[UserId]) -> anyhow::Result<Vec<AuthorSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT id, display_name, avatar_url FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> anyhow::Result<AuthorSummary> {
                Ok(AuthorSummary {
                    id: row.try_get("id")?,
                    display_name: row.try_get("display_name")?,
                    avatar_url: row.try_get("avatar_url")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl EngagementRepo for PgFeedRepository {
    async fn viewer_engagement(
        &self,
        post_ids: &[PostId],
        viewer: UserId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<HashMap<PostId, ViewerEngagement>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT p.id,
                (SELECT COUNT(*) FROM reactions r
                 WHERE r.post_id = p.id AND r.user_id = $2 AND r.created_at >= $3) AS reactions_30d,
                (SELECT COUNT(*) FROM comments c
                 WHERE c.post_id = p.id AND c.user_id = $2) AS comments
             FROM posts p WHERE p.id = ANY($1)",
        )
        .bind(post_ids)
        .bind(viewer)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let engagement = ViewerEngagement {
                reactions_30d: row.try_get("reactions_30d")?,
                comments: row.try_get("comments")?,
            };
            if engagement != ViewerEngagement::default() {
                out.insert(row.try_get::<PostId, _>("id")?, engagement);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_binds_the_requested_parameter() {
        let predicate = visible_predicate("$2");
        assert!(predicate.contains("$2::uuid IS NOT NULL"));
        assert!(!predicate.contains("$1"));
    }

    #[test]
    fn offsets_do_not_overflow() {
        assert_eq!(offset(2, 20), 40);
        assert_eq!(offset(u32::MAX, u32::MAX), i64::MAX);
    }
}
