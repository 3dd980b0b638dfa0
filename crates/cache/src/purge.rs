//! Scoped suppression of persist-before-unload
//!
//! Unloading a modified resource normally persists it first. During a bulk
//! save the host has already written everything, so it opens a [`PurgeGuard`]
//! for the document; while any guard is live, resources sharing the policy
//! skip the persistence step when deactivating. The previous behavior is
//! restored when the guard drops, however the scope ends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared persist-before-unload switch for one document's resources.
#[derive(Default)]
pub struct PersistPolicy {
    suppressions: AtomicUsize,
}

impl PersistPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the persistence step should currently be skipped.
    pub fn is_suppressed(&self) -> bool {
        self.suppressions.load(Ordering::Acquire) > 0
    }
}

/// Scoped guard suppressing persist-before-unload while it lives.
///
/// Guards nest: suppression ends when the last one drops.
pub struct PurgeGuard {
    policy: Arc<PersistPolicy>,
}

impl PurgeGuard {
    pub fn new(policy: Arc<PersistPolicy>) -> Self {
        policy.suppressions.fetch_add(1, Ordering::AcqRel);
        Self { policy }
    }
}

impl Drop for PurgeGuard {
    fn drop(&mut self) {
        self.policy.suppressions.fetch_sub(1, Ordering::AcqRel);
    }
}
