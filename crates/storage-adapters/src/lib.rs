//! # Storage Adapters
//!
//! Implementations of the `domains` ports.
//!
//! - [`memory`]: always compiled; process-local index, cache and feed store.
//! - `redis` (feature `redis`): sorted-set ranking index and snapshot cache.
//! - `postgres` (feature `db-postgres`): relational source of truth.

pub mod memory;

#[cfg(feature = "db-postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;
