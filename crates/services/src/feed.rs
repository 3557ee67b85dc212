//! # Feed Assembler
//!
//! Builds one page of the feed for a viewer.
//!
//! Anonymous viewers get a direct slice of the global ranking. Signed-in
//! viewers get a larger candidate pool drawn from the top of the ranking, which
//! is then filtered by visibility, re-scored for the viewer and paged. Either
//! path falls back to a direct relational query when the ranking index is
//! empty, failing or too slow.
//!
//! For signed-in viewers `total_elements` counts the visible posts inside the
//! candidate pool of `(page + 1) * size * candidate_multiplier` entries, not
//! the whole index. Deeper pages widen the pool, so the reported total can
//! grow as a client pages forward.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::error::{AppError, Result};
use domains::models::{
    Event, EventId, Page, Post, PostId, RegistrationStatus, ScoredPost, UserId,
};
use domains::traits::{EngagementRepo, EventRepo, PostRepo};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::hydrate::{distinct, posts_in_ranking_order, Hydrator};
use crate::options::EngineOptions;
use crate::ranking::RankingService;
use crate::scoring::{self, ViewerSignals};
use crate::visibility::{is_visible, registration_map};

/// Where a page was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    Ranked,
    Fallback,
}

impl FeedSource {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedSource::Ranked => "ranked",
            FeedSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub page: Page<ScoredPost>,
    pub source: FeedSource,
}

pub struct FeedAssembler {
    ranking: Arc<RankingService>,
    posts: Arc<dyn PostRepo>,
    events: Arc<dyn EventRepo>,
    engagement: Arc<dyn EngagementRepo>,
    hydrator: Hydrator,
    candidate_multiplier: u32,
    max_page_size: u32,
    max_page: u32,
}

impl FeedAssembler {
    pub fn new(
        ranking: Arc<RankingService>,
        posts: Arc<dyn PostRepo>,
        events: Arc<dyn EventRepo>,
        engagement: Arc<dyn EngagementRepo>,
        hydrator: Hydrator,
        options: &EngineOptions,
    ) -> Self {
        Self {
            ranking,
            posts,
            events,
            engagement,
            hydrator,
            candidate_multiplier: options.candidate_multiplier.max(1),
            max_page_size: options.max_page_size,
            max_page: options.max_page,
        }
    }

    /// One page of posts `viewer` may see, best first. `page` is 0-based and
    /// capped at `max_page`.
    pub async fn get_visible_posts(
        &self,
        viewer: Option<UserId>,
        page: u32,
        size: u32,
    ) -> Result<FeedPage> {
        if size == 0 || size > self.max_page_size {
            return Err(AppError::ValidationError(format!(
                "page size must be between 1 and {}, got {size}",
                self.max_page_size
            )));
        }
        if page > self.max_page {
            return Err(AppError::ValidationError(format!(
                "page must be at most {}, got {page}",
                self.max_page
            )));
        }
        let now = Utc::now();
        match viewer {
            None => self.anonymous_feed(page, size, now).await,
            Some(viewer) => self.personalized_feed(viewer, page, size, now).await,
        }
    }

    async fn anonymous_feed(&self, page: u32, size: u32, now: DateTime<Utc>) -> Result<FeedPage> {
        // 1. Read exactly the requested slice of the global ranking.
        let start = u64::from(page) * u64::from(size);
        let end = start + u64::from(size) - 1;
        let Some(entries) = self.ranking.read_range(start, end).await else {
            return self.fallback_feed(None, page, size, now).await;
        };
        let indexed = self.ranking.total().await;

        if entries.is_empty() {
            if indexed == 0 {
                return self.fallback_feed(None, page, size, now).await;
            }
            // Past the end of a populated index.
            return Ok(FeedPage {
                page: Page::new(Vec::new(), page, size, indexed),
                source: FeedSource::Ranked,
            });
        }
        let total = indexed.max(start + entries.len() as u64);

        // 2. Load the posts, keeping ranking order.
        let posts = posts_in_ranking_order(self.posts.as_ref(), &entries).await?;

        // 3. Anonymous viewers only see public posts.
        let events = self.hydrator.load_events(&posts).await?;
        let no_registrations = HashMap::new();
        let visible: Vec<Post> = posts
            .into_iter()
            .filter(|p| is_visible(p, event_of(p, &events), None, &no_registrations))
            .collect();

        let authors = self.hydrator.load_authors(&visible).await;
        let items = visible
            .into_iter()
            .map(|p| Hydrator::scored(p, now, &events, &authors, None))
            .collect();

        Ok(FeedPage {
            page: Page::new(items, page, size, total),
            source: FeedSource::Ranked,
        })
    }

    async fn personalized_feed(
        &self,
        viewer: UserId,
        page: u32,
        size: u32,
        now: DateTime<Utc>,
    ) -> Result<FeedPage> {
        // 1. Over-fetch: ranking is global, visibility is personal.
        let need = (u64::from(page) + 1)
            .saturating_mul(u64::from(size))
            .saturating_mul(u64::from(self.candidate_multiplier));
        let entries = self.ranking.top_with_scores(need).await;
        if entries.is_empty() {
            return self.fallback_feed(Some(viewer), page, size, now).await;
        }

        // 2. Load candidates and everything visibility depends on, batched.
        let candidates = posts_in_ranking_order(self.posts.as_ref(), &entries).await?;
        let events = self.hydrator.load_events(&candidates).await?;
        let registrations = self.registrations(viewer, &candidates).await;

        // 3. Prune what this viewer may not see. A failed registration lookup
        //    only hides non-approved events.
        let no_registrations = HashMap::new();
        let known = registrations.as_ref().unwrap_or(&no_registrations);
        let visible: Vec<Post> = candidates
            .into_iter()
            .filter(|p| is_visible(p, event_of(p, &events), Some(viewer), known))
            .collect();

        // 4. Personalize and re-sort.
        let signals = self
            .viewer_signals(viewer, &visible, registrations.as_ref(), now)
            .await;
        let authors = self.hydrator.load_authors(&visible).await;
        let mut scored: Vec<ScoredPost> = visible
            .into_iter()
            .map(|p| {
                let personalized = personalize(&p, signals.as_ref(), now);
                Hydrator::scored(p, now, &events, &authors, personalized)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.effective_score()
                .total_cmp(&a.effective_score())
                .then_with(|| b.post.id.cmp(&a.post.id))
        });

        // 5. Cut the requested page out of the filtered list. The total only
        //    covers the candidate pool.
        let total = scored.len();
        let from = (page as usize).saturating_mul(size as usize).min(total);
        let to = from.saturating_add(size as usize).min(total);
        debug!(%viewer, need, candidates = entries.len(), visible = total, from, to, "personalized feed assembled");
        let items = scored.drain(from..to).collect();

        Ok(FeedPage {
            page: Page::new(items, page, size, total as u64),
            source: FeedSource::Ranked,
        })
    }

    /// Direct relational query, used when the ranking index is empty or down.
    async fn fallback_feed(
        &self,
        viewer: Option<UserId>,
        page: u32,
        size: u32,
        now: DateTime<Utc>,
    ) -> Result<FeedPage> {
        let fetched = self
            .posts
            .find_visible_posts_paged(viewer, page, size)
            .await
            .map_err(|err| {
                warn!(error = %err, "relational fallback failed");
                AppError::unavailable(err)
            })?;
        let total = fetched.total_elements;
        let posts = fetched.items;

        let events = self.hydrator.load_events(&posts).await?;
        let signals = match viewer {
            Some(viewer) => {
                let registrations = self.registrations(viewer, &posts).await;
                self.viewer_signals(viewer, &posts, registrations.as_ref(), now)
                    .await
            }
            None => None,
        };
        let authors = self.hydrator.load_authors(&posts).await;
        let items = posts
            .into_iter()
            .map(|p| {
                let personalized = personalize(&p, signals.as_ref(), now);
                Hydrator::scored(p, now, &events, &authors, personalized)
            })
            .collect();

        info!(anonymous = viewer.is_none(), page, size, "feed served from relational fallback");
        Ok(FeedPage {
            page: Page::new(items, page, size, total),
            source: FeedSource::Fallback,
        })
    }

    /// The viewer's registrations for every event among `posts`, in one query.
    async fn registrations(
        &self,
        viewer: UserId,
        posts: &[Post],
    ) -> Option<HashMap<EventId, RegistrationStatus>> {
        let event_ids = distinct(posts.iter().filter_map(|p| p.event_id));
        if event_ids.is_empty() {
            return Some(HashMap::new());
        }
        match self
            .events
            .find_registrations_by_event_ids_and_volunteer(&event_ids, viewer)
            .await
        {
            Ok(registrations) => Some(registration_map(&registrations)),
            Err(err) => {
                warn!(%viewer, error = %err, "registration lookup failed");
                None
            }
        }
    }

    /// Per-post signals for `viewer`, or `None` when any lookup failed so that
    /// every post falls back to its total score.
    async fn viewer_signals(
        &self,
        viewer: UserId,
        posts: &[Post],
        registrations: Option<&HashMap<EventId, RegistrationStatus>>,
        now: DateTime<Utc>,
    ) -> Option<HashMap<PostId, ViewerSignals>> {
        let registrations = registrations?;
        if posts.is_empty() {
            return Some(HashMap::new());
        }
        let ids: Vec<PostId> = posts.iter().map(|p| p.id).collect();
        let engagement = match self
            .engagement
            .viewer_engagement(&ids, viewer, scoring::engagement_window_start(now))
            .await
        {
            Ok(engagement) => engagement,
            Err(err) => {
                warn!(%viewer, error = %err, "engagement lookup failed, personalization disabled");
                return None;
            }
        };

        let signals = posts
            .iter()
            .map(|p| {
                let registered = p
                    .event_id
                    .and_then(|id| registrations.get(&id))
                    .is_some_and(|status| status.grants_visibility());
                let signals = ViewerSignals {
                    engagement: engagement.get(&p.id).copied().unwrap_or_default(),
                    registered,
                    is_author: p.author_id == viewer,
                };
                (p.id, signals)
            })
            .collect();
        Some(signals)
    }
}

fn event_of<'a>(
    post: &Post,
    events: &'a HashMap<EventId, Event>,
) -> Option<&'a Event> {
    post.event_id.and_then(|id| events.get(&id))
}

fn personalize(
    post: &Post,
    signals: Option<&HashMap<PostId, ViewerSignals>>,
    now: DateTime<Utc>,
) -> Option<f64> {
    let signals = signals?.get(&post.id)?;
    Some(scoring::personalized_score(post, Some(signals), now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::models::{ApprovalStatus, RankingEntry, ViewerEngagement};
    use domains::traits::{
        MockEngagementRepo, MockEventRepo, MockPostRepo, MockRankingIndex, MockUserRepo,
    };
    use uuid::Uuid;

    fn post(author_id: UserId, event_id: Option<EventId>) -> Post {
        Post {
            id: Uuid::now_v7(),
            event_id,
            author_id,
            content: "Volunteers needed for Sunday".to_string(),
            created_at: Some(Utc::now()),
            reaction_count: 0,
            comment_count: 0,
            reaction_count_30d: 0,
            comment_count_30d: 0,
            like_count_30d: 0,
        }
    }

    struct Mocks {
        index: MockRankingIndex,
        posts: MockPostRepo,
        events: MockEventRepo,
        users: MockUserRepo,
        engagement: MockEngagementRepo,
    }

    impl Mocks {
        fn new() -> Self {
            let mut users = MockUserRepo::new();
            users.expect_find_authors_by_ids().returning(|_| Ok(Vec::new()));
            Self {
                index: MockRankingIndex::new(),
                posts: MockPostRepo::new(),
                events: MockEventRepo::new(),
                users,
                engagement: MockEngagementRepo::new(),
            }
        }

        fn assemble(self) -> FeedAssembler {
            let options = EngineOptions::default();
            let posts: Arc<dyn PostRepo> = Arc::new(self.posts);
            let events: Arc<dyn EventRepo> = Arc::new(self.events);
            let ranking = Arc::new(RankingService::new(Arc::new(self.index), posts.clone(), &options));
            let hydrator = Hydrator::new(Arc::new(self.users), events.clone());
            FeedAssembler::new(ranking, posts, events, Arc::new(self.engagement), hydrator, &options)
        }
    }

    #[tokio::test]
    async fn rejects_out_of_range_page_sizes() {
        let feed = Mocks::new().assemble();
        for size in [0, 101] {
            let err = feed.get_visible_posts(None, 0, size).await.unwrap_err();
            assert!(matches!(err, AppError::ValidationError(_)));
        }
    }

    #[tokio::test]
    async fn anonymous_feed_falls_back_when_index_is_down() {
        let mut mocks = Mocks::new();
        mocks
            .index
            .expect_range_with_scores()
            .returning(|_, _| Err(anyhow::anyhow!("connection reset")));
        mocks
            .index
            .expect_cardinality()
            .returning(|| Err(anyhow::anyhow!("connection reset")));
        let public = post(Uuid::now_v7(), None);
        let expected = public.id;
        mocks
            .posts
            .expect_find_visible_posts_paged()
            .withf(|viewer, page, size| viewer.is_none() && *page == 0 && *size == 10)
            .times(1)
            .returning(move |_, page, size| Ok(Page::new(vec![public.clone()], page, size, 1)));

        let feed = mocks.assemble();
        let result = feed.get_visible_posts(None, 0, 10).await.unwrap();
        assert_eq!(result.source, FeedSource::Fallback);
        assert_eq!(result.page.items.len(), 1);
        assert_eq!(result.page.items[0].post.id, expected);
        assert_eq!(result.page.items[0].personalized_score, None);
    }

    #[tokio::test]
    async fn rejects_pages_beyond_the_cap() {
        let feed = Mocks::new().assemble();
        let err = feed
            .get_visible_posts(Some(Uuid::now_v7()), 4_000_000_000, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        let err = feed.get_visible_posts(None, 101, 10).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn anonymous_feed_falls_back_when_range_fails_on_a_populated_index() {
        let mut mocks = Mocks::new();
        mocks
            .index
            .expect_range_with_scores()
            .returning(|_, _| Err(anyhow::anyhow!("timeout")));
        mocks.index.expect_cardinality().returning(|| Ok(3));
        let public = post(Uuid::now_v7(), None);
        let expected = public.id;
        mocks
            .posts
            .expect_find_visible_posts_paged()
            .times(1)
            .returning(move |_, page, size| Ok(Page::new(vec![public.clone()], page, size, 1)));

        let feed = mocks.assemble();
        let result = feed.get_visible_posts(None, 0, 10).await.unwrap();
        assert_eq!(result.source, FeedSource::Fallback);
        assert_eq!(result.page.items.len(), 1);
        assert_eq!(result.page.items[0].post.id, expected);
        assert_eq!(result.page.total_elements, 1);
    }

    #[tokio::test]
    async fn personalized_total_counts_only_the_candidate_pool() {
        let viewer = Uuid::now_v7();
        let pool: Vec<Post> = (0..5).map(|_| post(Uuid::now_v7(), None)).collect();
        let entries: Vec<RankingEntry> = pool
            .iter()
            .map(|p| RankingEntry { post_id: p.id, score: 5.0 })
            .collect();

        let mut mocks = Mocks::new();
        // size 1 * multiplier 5 on page 0 reads entries 0..=4 only.
        mocks
            .index
            .expect_range_with_scores()
            .withf(|start, end| *start == 0 && *end == 4)
            .returning(move |_, _| Ok(entries.clone()));
        mocks.index.expect_cardinality().never();
        mocks
            .posts
            .expect_find_posts_by_ids()
            .returning(move |_| Ok(pool.clone()));
        mocks
            .engagement
            .expect_viewer_engagement()
            .returning(|_, _, _| Ok(HashMap::new()));

        let feed = mocks.assemble();
        let result = feed.get_visible_posts(Some(viewer), 0, 1).await.unwrap();
        assert_eq!(result.page.items.len(), 1);
        assert_eq!(result.page.total_elements, 5);
    }

    #[tokio::test]
    async fn fallback_failure_surfaces_as_unavailable() {
        let mut mocks = Mocks::new();
        mocks.index.expect_range_with_scores().returning(|_, _| Ok(Vec::new()));
        mocks.index.expect_cardinality().returning(|| Ok(0));
        mocks
            .posts
            .expect_find_visible_posts_paged()
            .returning(|_, _, _| Err(anyhow::anyhow!("database is down")));

        let feed = mocks.assemble();
        let err = feed.get_visible_posts(None, 0, 10).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn failed_engagement_lookup_degrades_to_total_score() {
        let viewer = Uuid::now_v7();
        let own = post(viewer, None);
        let other = post(Uuid::now_v7(), None);
        let entries = vec![
            RankingEntry { post_id: other.id, score: 9.0 },
            RankingEntry { post_id: own.id, score: 5.0 },
        ];
        let stored = vec![own.clone(), other.clone()];

        let mut mocks = Mocks::new();
        mocks
            .index
            .expect_range_with_scores()
            .returning(move |_, _| Ok(entries.clone()));
        mocks
            .posts
            .expect_find_posts_by_ids()
            .returning(move |_| Ok(stored.clone()));
        mocks
            .engagement
            .expect_viewer_engagement()
            .returning(|_, _, _| Err(anyhow::anyhow!("statement timeout")));

        let feed = mocks.assemble();
        let result = feed.get_visible_posts(Some(viewer), 0, 10).await.unwrap();
        assert_eq!(result.page.items.len(), 2);
        assert!(result.page.items.iter().all(|p| p.personalized_score.is_none()));
    }

    #[tokio::test]
    async fn personalization_reorders_candidates() {
        let viewer = Uuid::now_v7();
        let event = Event {
            id: Uuid::now_v7(),
            title: "Tree planting".to_string(),
            status: ApprovalStatus::Approved,
        };
        let event_id = event.id;
        let mut popular = post(Uuid::now_v7(), None);
        popular.comment_count_30d = 10;
        let popular_id = popular.id;
        let engaged = post(Uuid::now_v7(), Some(event_id));
        let engaged_id = engaged.id;
        let entries = vec![
            RankingEntry { post_id: popular.id, score: 55.0 },
            RankingEntry { post_id: engaged.id, score: 5.0 },
        ];
        let stored = vec![popular.clone(), engaged.clone()];

        let mut mocks = Mocks::new();
        mocks
            .index
            .expect_range_with_scores()
            .withf(|start, end| *start == 0 && *end == 49)
            .returning(move |_, _| Ok(entries.clone()));
        mocks
            .posts
            .expect_find_posts_by_ids()
            .returning(move |_| Ok(stored.clone()));
        mocks
            .events
            .expect_find_events_by_ids()
            .returning(move |_| Ok(vec![event.clone()]));
        mocks
            .events
            .expect_find_registrations_by_event_ids_and_volunteer()
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        mocks
            .engagement
            .expect_viewer_engagement()
            .returning(move |_, _, _| {
                Ok(HashMap::from([(
                    engaged_id,
                    ViewerEngagement {
                        reactions_30d: 1,
                        comments: 3,
                    },
                )]))
            });

        let feed = mocks.assemble();
        let result = feed.get_visible_posts(Some(viewer), 0, 10).await.unwrap();
        let ids: Vec<PostId> = result.page.items.iter().map(|p| p.post.id).collect();
        // 5 + 10 + 3 * 20 = 75 beats the popular post's 55.
        assert_eq!(ids, vec![engaged_id, popular_id]);
        assert_eq!(result.page.items[0].personalized_score, Some(75.0));
        assert_eq!(result.page.items[1].personalized_score, Some(55.0));
        assert_eq!(result.source, FeedSource::Ranked);
    }
}
