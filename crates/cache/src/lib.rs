//! Bounded cache of running embedded resources
//!
//! Tracks every resource whose engine is materialized, most-recently-used
//! first, and asks the least-recently-used ones to unload themselves when a
//! configured capacity is exceeded. Also provides the scoped [`PurgeGuard`]
//! that suppresses persist-before-unload during bulk saves, and the capacity
//! configuration read at startup.

mod config;
mod manager;
mod purge;

// Re-export public API
pub use config::{CacheConfig, ConfigError, DEFAULT_MAX_RUNNING};
pub use manager::{CacheResident, CacheStats, ResidentId, ResourceCache};
pub use purge::{PersistPolicy, PurgeGuard};
