//! MRU resource tracking with capacity-driven unloading
//!
//! The cache holds weak references to every resource currently in the
//! `Running` state, most-recently-used first. Inserting beyond capacity asks
//! the least-recently-used entries to deactivate, skipping any that refuse
//! (always-running resources, in-place editing, failed persistence) — the
//! tracked set may therefore temporarily exceed capacity. Skipped entries are
//! re-evaluated on every later pass.
//!
//! One process-wide instance is created on first need via
//! [`ResourceCache::process_wide`] and disappears when the last user drops
//! its handle; components receive the `Arc` by injection rather than reaching
//! for the global at use sites.

use crate::config::CacheConfig;
use std::sync::{Arc, Mutex, Weak};

/// Stable identity of a tracked resource.
pub type ResidentId = u64;

/// What the cache is allowed to know about a tracked resource.
///
/// The cache never touches the content engine; it only asks the resource to
/// deactivate itself and respects the answer.
pub trait CacheResident: Send + Sync {
    fn resident_id(&self) -> ResidentId;

    /// Resources flagged always-running are tracked but never evicted.
    fn keep_running(&self) -> bool {
        false
    }

    /// Attempt to unload. Returning `false` means this candidate is skipped
    /// for the current eviction pass (it stays tracked and keeps running).
    fn try_deactivate(&self) -> bool;
}

/// Statistics about cache activity
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of residents currently tracked
    pub tracked: usize,

    /// Total insertions (touches of an existing entry do not count)
    pub insertions: u64,

    /// Number of residents unloaded by capacity-driven eviction
    pub evictions: u64,

    /// Number of eviction candidates that refused to unload
    pub eviction_skips: u64,
}

struct CacheInner {
    /// MRU first. A resident appears at most once.
    entries: Vec<(ResidentId, Weak<dyn CacheResident>)>,
    capacity: usize,
    stats: CacheStats,
}

impl CacheInner {
    /// Drop entries whose resident no longer exists.
    fn drop_dead(&mut self) {
        self.entries.retain(|(_, resident)| resident.strong_count() > 0);
        self.stats.tracked = self.entries.len();
    }

    fn position(&self, id: ResidentId) -> Option<usize> {
        self.entries.iter().position(|(entry_id, _)| *entry_id == id)
    }
}

/// Bounded most-recently-used tracker of running resources.
///
/// All mutation happens on the owner thread; the internal mutex exists so the
/// cache can be shared via `Arc`, not to support concurrent eviction. The
/// lock is never held while a resident's `try_deactivate` runs, so an
/// unloading resource may re-enter the cache (remove itself, desynchronize a
/// sibling) without deadlocking — eviction re-reads the tail after each step.
pub struct ResourceCache {
    inner: Mutex<CacheInner>,
}

/// Process-wide instance, alive only while someone holds the `Arc`.
static PROCESS_CACHE: Mutex<Weak<ResourceCache>> = Mutex::new(Weak::new());

impl ResourceCache {
    /// Create a cache with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: Vec::new(),
                capacity: capacity.max(1),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        Self::new(config.max_running)
    }

    /// Get the process-wide cache, creating it on first use.
    ///
    /// Capacity comes from [`CacheConfig::from_env`], falling back to the
    /// default. The instance lives exactly as long as at least one returned
    /// `Arc` does; the static slot only holds a `Weak`, so an empty process
    /// tears the cache down and a later call builds a fresh one. The slot
    /// mutex guards creation against a concurrent teardown.
    pub fn process_wide() -> Arc<ResourceCache> {
        let mut slot = PROCESS_CACHE.lock().unwrap();
        if let Some(existing) = slot.upgrade() {
            return existing;
        }

        let config = CacheConfig::from_env().unwrap_or_default();
        let cache = Arc::new(ResourceCache::with_config(&config));
        *slot = Arc::downgrade(&cache);
        cache
    }

    /// Track a resource, evicting least-recently-used entries to make room.
    ///
    /// If the resource is already tracked it is moved to the MRU position and
    /// nothing else happens. Otherwise entries are asked to deactivate from
    /// the tail toward the head until the list is below capacity or no
    /// willing candidate remains; refusals are skipped for this pass only.
    pub fn insert(&self, resident: &Arc<dyn CacheResident>) {
        let id = resident.resident_id();

        {
            let mut inner = self.inner.lock().unwrap();
            inner.drop_dead();

            if let Some(position) = inner.position(id) {
                if position != 0 {
                    let entry = inner.entries.remove(position);
                    inner.entries.insert(0, entry);
                }
                return;
            }
        }

        // Make room for one more entry.
        self.evict_to_capacity(1);

        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(0, (id, Arc::downgrade(resident)));
        inner.stats.insertions += 1;
        inner.stats.tracked = inner.entries.len();
    }

    /// Stop tracking a resource. Returns `true` if it was tracked.
    pub fn remove(&self, id: ResidentId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.position(id) {
            Some(position) => {
                inner.entries.remove(position);
                inner.stats.tracked = inner.entries.len();
                true
            }
            None => false,
        }
    }

    /// Change the capacity, shrinking the tracked set toward it.
    ///
    /// This is the consumer of configuration-change notifications.
    pub fn resize(&self, new_capacity: usize) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.capacity = new_capacity.max(1);
        }
        self.evict_to_capacity(0);
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().entries.is_empty()
    }

    /// Tracked resident ids, most-recently-used first.
    pub fn resident_ids(&self) -> Vec<ResidentId> {
        self.inner.lock().unwrap().entries.iter().map(|(id, _)| *id).collect()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }

    /// Ask LRU entries to deactivate until `len + headroom <= capacity`.
    ///
    /// The lock is released around every `try_deactivate` call, and the tail
    /// is re-read after each step, so the pass tolerates entries removing
    /// themselves (or each other) while it runs. Refusals are remembered only
    /// for this pass; the next pass re-evaluates every entry.
    fn evict_to_capacity(&self, headroom: usize) {
        let mut skipped: Vec<ResidentId> = Vec::new();

        loop {
            let candidate = {
                let mut inner = self.inner.lock().unwrap();
                inner.drop_dead();

                if inner.entries.len() + headroom <= inner.capacity {
                    return;
                }

                let found = inner
                    .entries
                    .iter()
                    .rev()
                    .filter(|(id, _)| !skipped.contains(id))
                    .find_map(|(id, resident)| resident.upgrade().map(|r| (*id, r)));

                match found {
                    Some(candidate) => candidate,
                    // Every remaining entry refused; over capacity by policy.
                    None => return,
                }
            };

            let (id, resident) = candidate;

            if resident.keep_running() || !resident.try_deactivate() {
                log::warn!("cache eviction skipped resident {}", id);
                let mut inner = self.inner.lock().unwrap();
                inner.stats.eviction_skips += 1;
                skipped.push(id);
                continue;
            }

            // Deactivation normally removes the entry through the resource's
            // own state-change notification; clean up here if it did not.
            let mut inner = self.inner.lock().unwrap();
            if let Some(position) = inner.position(id) {
                inner.entries.remove(position);
            }
            inner.stats.evictions += 1;
            inner.stats.tracked = inner.entries.len();
        }
    }
}
