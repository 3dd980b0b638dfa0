use std::sync::{Mutex, Weak};

/// Degree to which an embedded resource's engine is materialized.
///
/// `Loaded` means the resource exists only in persisted form, `Running` means
/// its in-memory engine is built but nothing is on screen, and `Active` means
/// the resource is being edited in place. Transitions are driven by the
/// content engine itself; the lifecycle machinery only reacts to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationState {
    Loaded,
    Running,
    Active,
}

impl ActivationState {
    /// Whether an in-memory engine exists for this state.
    pub fn is_materialized(self) -> bool {
        matches!(self, Self::Running | Self::Active)
    }
}

/// Monotonically increasing counter marking content mutations.
///
/// The content engine bumps this on every mutation; a cached render is valid
/// only if its stamped version equals the engine's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentVersion(pub u64);

impl ContentVersion {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Axis-aligned bounds of a deflated primitive sequence, in content units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingRange {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingRange {
    pub const EMPTY: Self = Self { x: 0.0, y: 0.0, width: 0.0, height: 0.0 };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// A single renderable drawing primitive.
///
/// Deflation turns a live content model into a flat sequence of these, which
/// the host can paint without the content engine being materialized.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    FilledRect { bounds: BoundingRange, color: u32 },
    Polyline { points: Vec<(f32, f32)>, color: u32 },
    GlyphRun { origin: (f32, f32), text: String },
    Raster { bounds: BoundingRange, pixels: Vec<u8> },
}

/// The renderable output of deflating a content model.
pub type PrimitiveSequence = Vec<Primitive>;

/// Coarse lifecycle notifications a content engine emits.
///
/// This is deliberately a small closed set: the cache machinery must not
/// depend on the engine's internal representation, only on these transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    StateChanged {
        from: ActivationState,
        to: ActivationState,
    },
    ContentChanged,
}

/// Listener for [`StateEvent`]s.
pub trait StateObserver: Send + Sync {
    fn on_event(&self, event: StateEvent);
}

/// Holder for the single observer a content engine notifies.
///
/// Engines embed one of these and call [`ObserverSlot::notify`] after each
/// state transition or content mutation. The slot holds a `Weak` reference so
/// a destroyed observer never keeps the engine alive or receives events.
#[derive(Default)]
pub struct ObserverSlot {
    observer: Mutex<Option<Weak<dyn StateObserver>>>,
}

impl ObserverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, observer: Weak<dyn StateObserver>) {
        *self.observer.lock().unwrap() = Some(observer);
    }

    pub fn clear(&self) {
        *self.observer.lock().unwrap() = None;
    }

    /// Deliver an event to the observer, if one is still alive.
    ///
    /// A dead observer is dropped from the slot on the spot.
    pub fn notify(&self, event: StateEvent) {
        let mut slot = self.observer.lock().unwrap();
        match slot.as_ref().and_then(Weak::upgrade) {
            Some(observer) => {
                drop(slot);
                observer.on_event(event);
            }
            None => *slot = None,
        }
    }
}

/// Errors a content engine reports to the lifecycle machinery.
///
/// All of these are recovered locally by the caller; none propagate to the
/// host as failures of the document itself.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("state change to {0:?} rejected by content engine")]
    StateChangeRejected(ActivationState),
    #[error("deflation failed: {0}")]
    DeflationFailed(String),
    #[error("persist failed: {0}")]
    PersistFailed(String),
    #[error("reload from '{url}' failed: {reason}")]
    ReloadFailed { url: String, reason: String },
}

/// The content engine behind one embedded resource.
///
/// Implemented outside this workspace by whatever supplies the actual chart,
/// sheet or media engine. The same engine instance may be shared by several
/// subsystems, so every method takes `&self`.
///
/// Implementations are expected to emit a [`StateEvent::StateChanged`] through
/// their observer after every successful `request_state_change`, and a
/// [`StateEvent::ContentChanged`] alongside every version bump.
pub trait ContentSource: Send + Sync {
    fn current_state(&self) -> ActivationState;

    /// Ask the engine to move to `target`. The engine may refuse.
    fn request_state_change(&self, target: ActivationState) -> Result<(), ContentError>;

    fn content_version(&self) -> ContentVersion;

    /// Convert the live model into a primitive sequence plus bounds.
    ///
    /// May be expensive; callers run this on a background worker or accept
    /// blocking the calling thread.
    fn deflate_to_primitives(&self) -> Result<(PrimitiveSequence, BoundingRange), ContentError>;

    fn is_modified(&self) -> bool;

    /// Write modified content back to its persisted form.
    fn persist(&self) -> Result<(), ContentError>;

    /// Replace the engine's content from an external URL.
    fn reload_from(&self, url: &str) -> Result<(), ContentError>;

    fn set_observer(&self, observer: Weak<dyn StateObserver>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn materialized_states() {
        assert!(!ActivationState::Loaded.is_materialized());
        assert!(ActivationState::Running.is_materialized());
        assert!(ActivationState::Active.is_materialized());
    }

    #[test]
    fn version_ordering_is_monotonic() {
        let v = ContentVersion(7);
        assert!(v.next() > v);
        assert_eq!(v.next(), ContentVersion(8));
    }

    #[test]
    fn empty_bounds() {
        assert!(BoundingRange::EMPTY.is_empty());
        assert!(!BoundingRange::new(0.0, 0.0, 10.0, 5.0).is_empty());
        assert!(BoundingRange::new(1.0, 1.0, 0.0, 5.0).is_empty());
    }

    struct CountingObserver {
        events: AtomicUsize,
    }

    impl StateObserver for CountingObserver {
        fn on_event(&self, _event: StateEvent) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn observer_slot_delivers_events() {
        let observer = Arc::new(CountingObserver { events: AtomicUsize::new(0) });
        let slot = ObserverSlot::new();
        slot.set(Arc::<CountingObserver>::downgrade(&observer));

        slot.notify(StateEvent::ContentChanged);
        slot.notify(StateEvent::StateChanged {
            from: ActivationState::Loaded,
            to: ActivationState::Running,
        });

        assert_eq!(observer.events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn observer_slot_ignores_dead_observer() {
        let slot = ObserverSlot::new();
        let observer = Arc::new(CountingObserver { events: AtomicUsize::new(0) });
        slot.set(Arc::<CountingObserver>::downgrade(&observer));
        drop(observer);

        // No observer left; must not panic.
        slot.notify(StateEvent::ContentChanged);
    }

    #[test]
    fn observer_slot_clear_stops_delivery() {
        let observer = Arc::new(CountingObserver { events: AtomicUsize::new(0) });
        let slot = ObserverSlot::new();
        slot.set(Arc::<CountingObserver>::downgrade(&observer));
        slot.clear();

        slot.notify(StateEvent::ContentChanged);
        assert_eq!(observer.events.load(Ordering::SeqCst), 0);
    }
}
