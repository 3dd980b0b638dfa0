//! Kill flags for abandoning background results
//!
//! A kill flag is the only mutable state shared between a task's owner and
//! the worker executing it. The owner sets it one-way when it no longer wants
//! the result; the worker reads it once, after all other work is done, to
//! decide whether to deliver or discard what it computed. Killing never stops
//! the computation early.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// One-way flag telling an in-flight task to discard its result.
///
/// Clones share the same underlying state via `Arc`.
///
/// # Example
///
/// ```
/// use embed_host_scheduler::KillFlag;
///
/// let flag = KillFlag::new();
/// let worker_flag = flag.clone();
///
/// // Owner decides the result is no longer wanted:
/// flag.kill();
///
/// // Worker, after finishing its computation:
/// if worker_flag.is_killed() {
///     // drop the result instead of delivering it
/// }
/// ```
#[derive(Clone)]
pub struct KillFlag {
    killed: Arc<AtomicBool>,
}

impl KillFlag {
    /// Create a new flag in the not-killed state.
    pub fn new() -> Self {
        Self {
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the task's result as unwanted.
    ///
    /// Idempotent; there is no way to un-kill.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    /// Check whether `kill()` has been called on this flag or any clone.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

impl Default for KillFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_flag_basic() {
        let flag = KillFlag::new();
        assert!(!flag.is_killed());

        flag.kill();
        assert!(flag.is_killed());
    }

    #[test]
    fn test_kill_flag_clone_shares_state() {
        let flag1 = KillFlag::new();
        let flag2 = flag1.clone();

        assert!(!flag2.is_killed());

        flag1.kill();
        assert!(flag1.is_killed());
        assert!(flag2.is_killed());
    }

    #[test]
    fn test_kill_flag_idempotent() {
        let flag = KillFlag::new();

        flag.kill();
        flag.kill();
        assert!(flag.is_killed());
    }

    #[test]
    fn test_kill_flag_default() {
        let flag = KillFlag::default();
        assert!(!flag.is_killed());
    }
}
