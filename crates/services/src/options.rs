use std::time::Duration;

/// Tunables for the ranking engine. The binary maps its settings onto this.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Posts fetched per page while rebuilding the index.
    pub rebuild_page_size: u32,
    pub rebuild_interval: Duration,
    pub cache_ttl: Duration,
    /// Limit refreshed by the scheduled top-posts job.
    pub top_limit: u32,
    pub top_key_prefix: String,
    /// Over-fetch factor for personalized feeds.
    pub candidate_multiplier: u32,
    /// Upper bound on a single ranking-index or cache call.
    pub store_timeout: Duration,
    pub max_page_size: u32,
    /// Highest 0-based feed page served. Bounds the personalized candidate pool.
    pub max_page: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            rebuild_page_size: 500,
            rebuild_interval: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(60),
            top_limit: 20,
            top_key_prefix: "feed:top".to_string(),
            candidate_multiplier: 5,
            store_timeout: Duration::from_millis(250),
            max_page_size: 100,
            max_page: 100,
        }
    }
}
