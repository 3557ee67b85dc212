//! # Domain Models
//!
//! These structs represent the entities the feed engine reads and produces.
//! Posts, events, registrations and users are owned by the relational store;
//! the engine only ever sees them as plain records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PostId = Uuid;
pub type UserId = Uuid;
pub type EventId = Uuid;

/// Moderation state of an event. Only `Approved` events are public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// State of a volunteer's registration for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    CheckedIn,
    Completed,
    Rejected,
    Withdrawn,
}

impl RegistrationStatus {
    /// Whether this registration lets the volunteer see posts of a
    /// not-yet-approved event.
    pub fn grants_visibility(self) -> bool {
        matches!(
            self,
            RegistrationStatus::Approved
                | RegistrationStatus::CheckedIn
                | RegistrationStatus::Completed
        )
    }
}

impl FromStr for RegistrationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(RegistrationStatus::Pending),
            "APPROVED" => Ok(RegistrationStatus::Approved),
            "CHECKED_IN" => Ok(RegistrationStatus::CheckedIn),
            "COMPLETED" => Ok(RegistrationStatus::Completed),
            "REJECTED" => Ok(RegistrationStatus::Rejected),
            "WITHDRAWN" => Ok(RegistrationStatus::Withdrawn),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Returned when a stored status string matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

/// Reaction types a user can leave on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionKind {
    Like,
    Love,
    Haha,
    Wow,
    Sad,
    Angry,
}

impl ReactionKind {
    /// LIKE and LOVE count as "positive" engagement.
    pub fn is_positive(self) -> bool {
        matches!(self, ReactionKind::Like | ReactionKind::Love)
    }
}

/// A user-generated post together with its pre-aggregated engagement counters.
///
/// The `*_30d` counters cover the trailing 30-day window and are maintained by
/// the persistence layer; the engine never counts reactions itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    /// Parent event. `None` for posts outside any event.
    pub event_id: Option<EventId>,
    pub author_id: UserId,
    pub content: String,
    /// May be missing for rows imported without a timestamp.
    pub created_at: Option<DateTime<Utc>>,
    pub reaction_count: i64,
    pub comment_count: i64,
    pub reaction_count_30d: i64,
    pub comment_count_30d: i64,
    /// Positive (LIKE/LOVE) reactions within the 30-day window.
    pub like_count_30d: i64,
}

/// Read-only view of a volunteer event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub status: ApprovalStatus,
}

/// Links a volunteer to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub event_id: EventId,
    pub volunteer_id: UserId,
    pub status: RegistrationStatus,
}

/// Denormalized author data shown next to a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Denormalized event data shown next to a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: EventId,
    pub title: String,
    pub status: ApprovalStatus,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            status: event.status,
        }
    }
}

/// What one viewer has done on one post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerEngagement {
    /// Reactions left by the viewer within the last 30 days.
    pub reactions_30d: i64,
    /// All comments left by the viewer.
    pub comments: i64,
}

/// A single (post id, score) pair held in the ranking index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub post_id: PostId,
    pub score: f64,
}

/// A post as served to a viewer, with its score breakdown and summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPost {
    pub post: Post,
    pub affinity_score: f64,
    pub recency_factor: f64,
    pub total_score: f64,
    pub personalized_score: Option<f64>,
    pub author: Option<AuthorSummary>,
    pub event: Option<EventSummary>,
}

impl ScoredPost {
    /// The score the feed sorts on: personalized when present, global otherwise.
    pub fn effective_score(&self) -> f64 {
        self.personalized_score.unwrap_or(self.total_score)
    }
}

/// One page of results plus the metadata a client needs to paginate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, size: u32, total_elements: u64) -> Self {
        let total_pages = if size == 0 {
            0
        } else {
            total_elements.div_ceil(u64::from(size))
        };
        Self {
            items,
            page,
            size,
            total_elements,
            total_pages,
        }
    }
}

/// Raw authentication material attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub bearer_token: Option<String>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Extracts the token from an `Authorization: Bearer <token>` header value.
    pub fn from_authorization_header(value: Option<&str>) -> Self {
        let bearer_token = value
            .and_then(|v| {
                let (scheme, token) = v.trim().split_once(' ')?;
                scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
            })
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        Self { bearer_token }
    }
}
