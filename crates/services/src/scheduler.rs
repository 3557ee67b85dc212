//! Periodic background jobs: the full ranking rebuild and the top posts
//! snapshot refresh. Each runs on its own interval until the token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::FeedEngine;

/// Starts both jobs. The first rebuild runs immediately so a cold index is
/// populated at startup.
pub fn spawn_ranking_jobs(engine: Arc<FeedEngine>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    let rebuild_every = engine.options().rebuild_interval;
    let refresh_every = engine.options().cache_ttl;
    vec![
        spawn_job("ranking_rebuild", rebuild_every, shutdown.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move {
                    engine
                        .rebuild_ranking_from_source()
                        .await
                        .map(|report| report.indexed)
                }
            }
        }),
        spawn_job("top_posts_refresh", refresh_every, shutdown, move || {
            let engine = engine.clone();
            async move { engine.scheduled_top_refresh().await.map(|n| n as u64) }
        }),
    ]
}

fn spawn_job<F, Fut>(
    name: &'static str,
    every: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = domains::error::Result<u64>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = name, every_secs = every.as_secs(), "background job started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // A failed tick is logged and retried on the next one.
            match tick().await {
                Ok(items) => info!(job = name, items, "background job tick completed"),
                Err(err) => error!(job = name, error = %err, "background job tick failed"),
            }
        }
        info!(job = name, "background job stopped");
    })
}
