//! Process-local adapters. Used when no Redis or Postgres URL is configured,
//! and by the test suites.

mod cache;
mod ranking;
mod store;

pub use cache::InMemorySnapshotCache;
pub use ranking::InMemoryRankingIndex;
pub use store::InMemoryFeedStore;
