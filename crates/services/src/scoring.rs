//! # Scoring
//!
//! Pure scoring of posts. Nothing in here touches a store and "now" is always
//! passed in, so every function is deterministic for a given input.
//!
//! ```text
//! affinity   = comments_30d * 5 + likes_30d * 2 + reactions_30d * 3
//! total      = affinity + average_edge_weight * recency_factor
//! personal   = total + viewer boosts
//! ```

use chrono::{DateTime, Duration, Utc};
use domains::models::{Post, ViewerEngagement};
use thiserror::Error;

pub const COMMENT_WEIGHT: f64 = 5.0;
pub const LIKE_WEIGHT: f64 = 2.0;
pub const REACTION_WEIGHT: f64 = 3.0;

/// Edge weight used when a post has no reactions in the window.
pub const DEFAULT_EDGE_WEIGHT: f64 = 5.0;
pub const POSITIVE_EDGE_WEIGHT: f64 = 5.0;
pub const OTHER_EDGE_WEIGHT: f64 = 8.0;

pub const VIEWER_REACTION_BOOST: f64 = 10.0;
pub const VIEWER_COMMENT_BOOST: f64 = 20.0;
pub const REGISTERED_BOOST: f64 = 50.0;
pub const AUTHOR_BOOST: f64 = 200.0;

/// Length of the trailing engagement window.
pub const ENGAGEMENT_WINDOW_DAYS: i64 = 30;

/// Start of the engagement window relative to `now`.
pub fn engagement_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(ENGAGEMENT_WINDOW_DAYS)
}

/// Score components for one post at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub affinity: f64,
    pub recency: f64,
    pub total: f64,
}

/// What we know about one viewer's relation to one post.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewerSignals {
    pub engagement: ViewerEngagement,
    /// Holds an APPROVED / CHECKED_IN / COMPLETED registration for the post's event.
    pub registered: bool,
    pub is_author: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    #[error("post {0} produced a non-finite score")]
    NonFinite(uuid::Uuid),
}

pub fn affinity_score(post: &Post) -> f64 {
    count(post.comment_count_30d) * COMMENT_WEIGHT
        + count(post.like_count_30d) * LIKE_WEIGHT
        + count(post.reaction_count_30d) * REACTION_WEIGHT
}

/// Piecewise-linear decay over the post's age in minutes, bounded in [0, 1].
pub fn recency_factor(post: &Post, now: DateTime<Utc>) -> f64 {
    let Some(created_at) = post.created_at else {
        return 0.0;
    };
    // Clock skew can put created_at in the future; treat that as brand new.
    let age = ((now - created_at).num_seconds() as f64 / 60.0).max(0.0);

    if age <= 15.0 {
        1.0
    } else if age <= 180.0 {
        1.0 - ((age - 15.0) / 165.0) * 0.3
    } else if age <= 1440.0 {
        0.7 - ((age - 180.0) / 1260.0) * 0.5
    } else {
        0.0
    }
}

/// Mean edge weight over the reactions in the window.
pub fn average_edge_weight(post: &Post) -> f64 {
    let reactions = post.reaction_count_30d.max(0);
    if reactions == 0 {
        return DEFAULT_EDGE_WEIGHT;
    }
    let positive = post.like_count_30d.clamp(0, reactions);
    let other = reactions - positive;
    (positive as f64 * POSITIVE_EDGE_WEIGHT + other as f64 * OTHER_EDGE_WEIGHT) / reactions as f64
}

pub fn score(post: &Post, now: DateTime<Utc>) -> ScoreBreakdown {
    let affinity = affinity_score(post);
    let recency = recency_factor(post, now);
    ScoreBreakdown {
        affinity,
        recency,
        total: affinity + average_edge_weight(post) * recency,
    }
}

pub fn total_score(post: &Post, now: DateTime<Utc>) -> f64 {
    score(post, now).total
}

/// Total score, rejecting values a sorted set cannot order.
pub fn checked_total_score(post: &Post, now: DateTime<Utc>) -> Result<f64, ScoreError> {
    let total = total_score(post, now);
    if total.is_finite() {
        Ok(total)
    } else {
        Err(ScoreError::NonFinite(post.id))
    }
}

pub fn personalization_boost(signals: &ViewerSignals) -> f64 {
    let mut boost = count(signals.engagement.reactions_30d) * VIEWER_REACTION_BOOST
        + count(signals.engagement.comments) * VIEWER_COMMENT_BOOST;
    if signals.registered {
        boost += REGISTERED_BOOST;
    }
    if signals.is_author {
        boost += AUTHOR_BOOST;
    }
    boost
}

/// Total score plus viewer boosts. Without signals (anonymous viewer or a
/// failed lookup) this is the total score.
pub fn personalized_score(post: &Post, signals: Option<&ViewerSignals>, now: DateTime<Utc>) -> f64 {
    let total = total_score(post, now);
    match signals {
        Some(signals) => total + personalization_boost(signals),
        None => total,
    }
}

fn count(value: i64) -> f64 {
    value.max(0) as f64
}
