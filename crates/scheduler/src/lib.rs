//! Background task pool for embedded-resource work
//!
//! This crate provides the shared worker pool that executes expensive
//! background work (content deflation) off the owner thread. Submitting a
//! task yields a [`TaskTicket`] the owner can poll or block on; a [`KillFlag`]
//! lets an owner that no longer wants the result tell the task to discard it
//! after the computation finishes.
//!
//! # Example
//!
//! ```
//! use embed_host_scheduler::{PoolConfig, TaskPool};
//!
//! let pool = TaskPool::new(PoolConfig::new(2));
//!
//! let ticket = pool.submit(|| {
//!     // ... expensive work ...
//! });
//!
//! // Owner thread polls, or blocks when it must have the result now.
//! if !ticket.is_complete() {
//!     ticket.wait();
//! }
//!
//! pool.shutdown();
//! ```

mod kill;
mod pool;

// Re-export public API
pub use kill::KillFlag;
pub use pool::{PoolConfig, PoolStats, TaskId, TaskPool, TaskTicket};
