//! Prometheus counters exposed on `/metrics`.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use services::{CacheStatus, FeedSource};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct FeedLabels {
    source: String,
    viewer: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CacheLabels {
    result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RebuildLabels {
    outcome: String,
}

pub struct Metrics {
    registry: Registry,
    feed_requests: Family<FeedLabels, Counter>,
    top_cache: Family<CacheLabels, Counter>,
    rebuilds: Family<RebuildLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("feed");
        let feed_requests = Family::<FeedLabels, Counter>::default();
        let top_cache = Family::<CacheLabels, Counter>::default();
        let rebuilds = Family::<RebuildLabels, Counter>::default();
        registry.register(
            "requests",
            "Feed pages served, by source and viewer kind",
            feed_requests.clone(),
        );
        registry.register(
            "top_cache_lookups",
            "Top posts snapshot lookups, by hit or miss",
            top_cache.clone(),
        );
        registry.register(
            "rebuilds",
            "On-demand ranking rebuilds, by outcome",
            rebuilds.clone(),
        );
        Self {
            registry,
            feed_requests,
            top_cache,
            rebuilds,
        }
    }

    pub fn feed_served(&self, source: FeedSource, authenticated: bool) {
        let viewer = if authenticated { "authenticated" } else { "anonymous" };
        self.feed_requests
            .get_or_create(&FeedLabels {
                source: source.as_str().to_string(),
                viewer: viewer.to_string(),
            })
            .inc();
    }

    pub fn top_lookup(&self, status: CacheStatus) {
        self.top_cache
            .get_or_create(&CacheLabels {
                result: status.as_str().to_string(),
            })
            .inc();
    }

    pub fn rebuild(&self, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.rebuilds
            .get_or_create(&RebuildLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// OpenMetrics text exposition.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}
