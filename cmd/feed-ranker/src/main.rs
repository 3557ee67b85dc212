//! # Feed Ranker Binary
//!
//! Assembles the engine from settings and compile-time features, starts the
//! background jobs and serves the HTTP API until SIGINT or SIGTERM.

mod telemetry;
mod wiring;

use std::sync::Arc;

use anyhow::Context;
use api_adapters::{router, AppState, Metrics};
use configs::Settings;
use services::{spawn_ranking_jobs, EngineOptions, FeedEngine};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn engine_options(settings: &Settings) -> EngineOptions {
    EngineOptions {
        rebuild_page_size: settings.ranking.rebuild_page_size,
        rebuild_interval: settings.ranking.rebuild_interval(),
        cache_ttl: settings.cache.ttl(),
        top_limit: settings.cache.top_limit,
        top_key_prefix: settings.cache.key_prefix.clone(),
        candidate_multiplier: settings.ranking.candidate_multiplier,
        store_timeout: settings.ranking.store_timeout(),
        max_page_size: settings.ranking.max_page_size,
        max_page: settings.ranking.max_page,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let settings = Settings::load().context("loading settings")?;

    // 1. Adapters
    let ports = wiring::ports(&settings).await?;
    let resolver = wiring::viewer_resolver(&settings);

    // 2. Engine and background jobs
    let engine = Arc::new(FeedEngine::new(ports, engine_options(&settings)));
    let shutdown = CancellationToken::new();
    let jobs = spawn_ranking_jobs(engine.clone(), shutdown.clone());

    // 3. HTTP
    let state = AppState {
        engine,
        resolver,
        metrics: Arc::new(Metrics::new()),
    };
    let listener = TcpListener::bind(settings.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.server.bind_addr))?;
    info!(addr = %settings.server.bind_addr, "feed ranker listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("http server")?;

    // 4. Drain
    shutdown.cancel();
    for job in jobs {
        if let Err(err) = job.await {
            warn!(error = %err, "background job ended abnormally");
        }
    }
    info!("feed ranker stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => {}
    }
    info!("shutdown requested");
    shutdown.cancel();
}
