//! feed-ranker/crates/domains/src/lib.rs
//!
//! Domain models and port definitions for the feed ranking engine.

pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;
