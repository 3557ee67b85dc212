//! # Feed Services
//!
//! Scoring, ranking and feed assembly on top of the ports in `domains`.
//! Nothing in here knows which database, cache or transport sits behind a port.

pub mod engine;
pub mod feed;
mod guard;
pub mod hydrate;
pub mod options;
pub mod ranking;
pub mod scheduler;
pub mod scoring;
pub mod top_posts;
pub mod visibility;

pub use engine::{FeedEngine, Ports};
pub use feed::{FeedPage, FeedSource};
pub use options::EngineOptions;
pub use ranking::{RankingService, RebuildReport};
pub use scheduler::spawn_ranking_jobs;
pub use top_posts::{CacheStatus, TopPosts, TopPostsCache};
