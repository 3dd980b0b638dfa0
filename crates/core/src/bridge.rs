//! Engine-event to cache/render plumbing
//!
//! The content engine outlives and knows nothing about the handle wrapped
//! around it; it only notifies a single observer. The bridge is that
//! observer: it holds a weak back-reference to the handle and translates the
//! engine's small event set into cache membership changes, render
//! invalidation and repaint requests. A bridge whose handle is gone swallows
//! every event.

use crate::handle::{RepaintHook, ResourceHandle};
use content_model::{ActivationState, StateEvent, StateObserver};
use embed_host_cache::{CacheResident, ResourceCache};
use std::sync::{Arc, Weak};

pub(crate) struct StateChangeBridge {
    handle: Weak<ResourceHandle>,
    cache: Arc<ResourceCache>,
    repaint: Option<RepaintHook>,
}

impl StateChangeBridge {
    pub(crate) fn new(
        handle: Weak<ResourceHandle>,
        cache: Arc<ResourceCache>,
        repaint: Option<RepaintHook>,
    ) -> Self {
        Self { handle, cache, repaint }
    }

    pub(crate) fn request_repaint(&self) {
        if let Some(repaint) = &self.repaint {
            repaint();
        }
    }
}

impl StateObserver for StateChangeBridge {
    fn on_event(&self, event: StateEvent) {
        let Some(handle) = self.handle.upgrade() else {
            return;
        };

        use ActivationState::{Active, Loaded, Running};
        match event {
            // Materialized: track it. Insertion may evict other residents.
            StateEvent::StateChanged { from: Loaded, to: Running | Active } => {
                let resident: Arc<dyn CacheResident> = handle;
                self.cache.insert(&resident);
            }
            // Dormant again: stop tracking.
            StateEvent::StateChanged { from: Running | Active, to: Loaded } => {
                self.cache.remove(handle.resident_id());
            }
            // In-place editing started or ended; the on-screen rendition
            // switches between live engine and cached primitives.
            StateEvent::StateChanged { from: Running, to: Active }
            | StateEvent::StateChanged { from: Active, to: Running } => {
                handle.invalidate_render();
                self.request_repaint();
            }
            StateEvent::StateChanged { .. } => {}
            StateEvent::ContentChanged => {
                handle.invalidate_render();
                self.request_repaint();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_for_dead_handle_are_swallowed() {
        let cache = Arc::new(ResourceCache::new(4));
        let bridge = StateChangeBridge::new(Weak::new(), cache.clone(), None);

        bridge.on_event(StateEvent::StateChanged {
            from: ActivationState::Loaded,
            to: ActivationState::Running,
        });
        bridge.on_event(StateEvent::ContentChanged);

        assert!(cache.is_empty());
    }
}
