//! Picks an adapter for every port from the settings and the compiled features.
//! Anything not configured falls back to the in-memory adapter.

use std::sync::Arc;

use configs::Settings;
use domains::traits::{
    EngagementRepo, EventRepo, PostRepo, RankingIndex, SnapshotCache, UserRepo, ViewerResolver,
};
use services::Ports;
use storage_adapters::memory::{InMemoryFeedStore, InMemoryRankingIndex, InMemorySnapshotCache};
use tracing::{info, warn};

#[cfg(any(feature = "db-postgres", feature = "redis", feature = "auth-jwt"))]
use secrecy::ExposeSecret;

struct Relational {
    posts: Arc<dyn PostRepo>,
    events: Arc<dyn EventRepo>,
    users: Arc<dyn UserRepo>,
    engagement: Arc<dyn EngagementRepo>,
}

impl Relational {
    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PostRepo + EventRepo + UserRepo + EngagementRepo + 'static,
    {
        Self {
            posts: store.clone(),
            events: store.clone(),
            users: store.clone(),
            engagement: store,
        }
    }
}

async fn relational(settings: &Settings) -> anyhow::Result<Relational> {
    #[cfg(feature = "db-postgres")]
    if let Some(url) = &settings.database.url {
        let repo = storage_adapters::postgres::PgFeedRepository::connect(
            url.expose_secret(),
            settings.database.max_connections,
        )
        .await?;
        info!(max_connections = settings.database.max_connections, "using postgres feed store");
        return Ok(Relational::from_store(Arc::new(repo)));
    }

    if settings.database.url.is_some() {
        warn!("database.url is set but postgres support is not compiled in");
    }
    warn!("no database configured, using the in-memory feed store");
    Ok(Relational::from_store(Arc::new(InMemoryFeedStore::new())))
}

fn derived_stores(settings: &Settings) -> anyhow::Result<(Arc<dyn RankingIndex>, Arc<dyn SnapshotCache>)> {
    #[cfg(feature = "redis")]
    if let Some(url) = &settings.redis.url {
        use storage_adapters::redis::{connect, RedisRankingIndex, RedisSnapshotCache};

        let pool = connect(url.expose_secret())?;
        info!(key = %settings.ranking.key, "using redis ranking index and snapshot cache");
        return Ok((
            Arc::new(RedisRankingIndex::new(pool.clone(), settings.ranking.key.clone())),
            Arc::new(RedisSnapshotCache::new(pool)),
        ));
    }

    if settings.redis.url.is_some() {
        warn!("redis.url is set but redis support is not compiled in");
    }
    warn!("no redis configured, ranking index and cache are process-local");
    Ok((
        Arc::new(InMemoryRankingIndex::new()),
        Arc::new(InMemorySnapshotCache::new()),
    ))
}

pub async fn ports(settings: &Settings) -> anyhow::Result<Ports> {
    let relational = relational(settings).await?;
    let (index, cache) = derived_stores(settings)?;
    Ok(Ports {
        posts: relational.posts,
        events: relational.events,
        users: relational.users,
        engagement: relational.engagement,
        index,
        cache,
    })
}

pub fn viewer_resolver(settings: &Settings) -> Arc<dyn ViewerResolver> {
    #[cfg(feature = "auth-jwt")]
    if let Some(secret) = &settings.auth.jwt_secret {
        info!("verifying viewer tokens with HS256");
        return Arc::new(auth_adapters::JwtViewerResolver::new(
            secret.expose_secret().as_bytes(),
        ));
    }

    if settings.auth.jwt_secret.is_some() {
        warn!("auth.jwt_secret is set but JWT support is not compiled in");
    }
    warn!("no JWT secret configured, every viewer is anonymous");
    Arc::new(auth_adapters::AnonymousResolver)
}
