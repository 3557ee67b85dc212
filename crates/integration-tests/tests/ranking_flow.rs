use chrono::Utc;
use domains::error::AppError;
use domains::models::{ApprovalStatus, PostId, ReactionKind};
use domains::traits::RankingIndex;
use integration_tests::Harness;
use services::scoring;
use uuid::Uuid;

#[tokio::test]
async fn rebuild_reproduces_direct_score_order() {
    let h = Harness::new();
    let mut posts = vec![
        h.popular_post(4, 5),
        h.popular_post(1, 60),
        h.popular_post(0, 2000),
        h.popular_post(9, 600),
        h.post(None, 1),
    ];
    let fan = Uuid::now_v7();
    h.store.record_reaction(posts[4].id, fan, ReactionKind::Angry, Utc::now());

    let report = h.engine.rebuild_ranking_from_source().await.unwrap();
    assert_eq!(report.indexed, 5);
    assert_eq!(report.skipped, 0);

    // Refresh counters the way the store reports them, then sort directly.
    let now = Utc::now();
    let ids: Vec<PostId> = posts.iter().map(|p| p.id).collect();
    posts = domains::traits::PostRepo::find_posts_by_ids(h.store.as_ref(), &ids)
        .await
        .unwrap();
    posts.sort_by(|a, b| {
        scoring::total_score(b, now)
            .total_cmp(&scoring::total_score(a, now))
            .then_with(|| b.id.cmp(&a.id))
    });
    let expected: Vec<PostId> = posts.iter().map(|p| p.id).collect();

    assert_eq!(h.engine.ranking().top_ids(5).await, expected);
}

#[tokio::test]
async fn rebuild_pages_through_large_stores() {
    let h = Harness::with_options(services::EngineOptions {
        rebuild_page_size: 3,
        ..Default::default()
    });
    for minutes in 0..10 {
        h.post(None, minutes);
    }
    let report = h.engine.rebuild_ranking_from_source().await.unwrap();
    assert_eq!(report.indexed, 10);
    assert_eq!(report.pages, 4);
    assert_eq!(h.index.cardinality().await.unwrap(), 10);
}

#[tokio::test]
async fn rebuild_drops_entries_for_deleted_posts() {
    let h = Harness::new();
    let kept = h.post(None, 1);
    let gone = h.post(None, 1);
    h.engine.rebuild_ranking_from_source().await.unwrap();
    h.store.delete_post(gone.id);

    h.engine.rebuild_ranking_from_source().await.unwrap();
    assert_eq!(h.engine.ranking().top_ids(10).await, vec![kept.id]);
}

#[tokio::test]
async fn update_post_score_reflects_new_engagement() {
    let h = Harness::new();
    let quiet = h.post(None, 1);
    let rising = h.post(None, 1);
    h.engine.rebuild_ranking_from_source().await.unwrap();

    h.store.record_comment(rising.id, Uuid::now_v7(), Utc::now());
    let score = h.engine.update_post_score(rising.id).await.unwrap();
    assert!(score >= 10.0);
    assert_eq!(h.engine.ranking().top_ids(2).await, vec![rising.id, quiet.id]);

    // Scoring twice leaves one entry.
    h.engine.update_post_score(rising.id).await.unwrap();
    assert_eq!(h.engine.ranking().total().await, 2);
}

#[tokio::test]
async fn missing_post_is_not_found_and_unindexed() {
    let h = Harness::new();
    let post = h.post(None, 1);
    h.engine.rebuild_ranking_from_source().await.unwrap();
    h.store.delete_post(post.id);

    let err = h.engine.update_post_score(post.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(..)));
    assert_eq!(h.engine.ranking().total().await, 0);
}

#[tokio::test]
async fn remove_post_takes_it_out_of_the_index() {
    let h = Harness::new();
    let post = h.post(None, 1);
    h.engine.update_post_score(post.id).await.unwrap();
    assert!(h.engine.remove_post(post.id).await);
    assert!(h.engine.ranking().top_ids(10).await.is_empty());
}

#[tokio::test]
async fn event_status_change_rebuilds_and_drops_the_default_snapshot() {
    let h = Harness::new();
    let event = h.event(ApprovalStatus::Pending);
    let hidden = h.post(Some(event), 1);
    let public = h.post(None, 1);
    h.engine.rebuild_ranking_from_source().await.unwrap();

    let before = h.engine.get_top_posts_cached(20).await.unwrap();
    assert_eq!(integration_tests::ids(&before.posts), vec![public.id]);

    h.store.set_event_status(event, ApprovalStatus::Approved);
    h.engine.on_event_status_changed(event).await.unwrap();

    let after = h.engine.get_top_posts_cached(20).await.unwrap();
    assert_eq!(after.cache, services::CacheStatus::Miss);
    assert_eq!(after.posts.len(), 2);
    assert!(integration_tests::ids(&after.posts).contains(&hidden.id));
}
