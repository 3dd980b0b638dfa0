//! Shared test doubles: a scriptable content engine and a hand-driven
//! link-change service.

use crate::handle::HostContext;
use crate::link::{LinkChangeService, LinkError, LinkToken};
use content_model::{
    ActivationState, BoundingRange, ContentError, ContentSource, ContentVersion, ObserverSlot,
    Primitive, PrimitiveSequence, StateEvent, StateObserver,
};
use embed_host_cache::{PersistPolicy, ResourceCache};
use embed_host_scheduler::{PoolConfig, TaskPool};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

/// Context with a private cache and a single-worker pool.
///
/// One worker makes task order deterministic: a fence task submitted after a
/// deflation completes only after the deflation did.
pub(crate) fn test_context(capacity: usize) -> HostContext {
    HostContext {
        cache: Arc::new(ResourceCache::new(capacity)),
        pool: Arc::new(TaskPool::new(
            PoolConfig::new(1).with_poll_interval(Duration::from_millis(5)),
        )),
        persist_policy: Arc::new(PersistPolicy::new()),
        repaint: None,
    }
}

/// Content engine whose behavior is scripted per test.
///
/// Deflation renders a single glyph run containing the current version, so
/// tests can tell fresh output from stale.
pub(crate) struct FakeContent {
    state: Mutex<ActivationState>,
    version: AtomicU64,
    modified: AtomicBool,
    refuse_state_changes: AtomicBool,
    fail_persist: AtomicBool,
    fail_deflate: AtomicBool,
    fail_reload: AtomicBool,
    deflate_calls: AtomicUsize,
    persist_calls: AtomicUsize,
    deflate_delay: Mutex<Duration>,
    reloads: Mutex<Vec<String>>,
    observer: ObserverSlot,
}

impl FakeContent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ActivationState::Loaded),
            version: AtomicU64::new(1),
            modified: AtomicBool::new(false),
            refuse_state_changes: AtomicBool::new(false),
            fail_persist: AtomicBool::new(false),
            fail_deflate: AtomicBool::new(false),
            fail_reload: AtomicBool::new(false),
            deflate_calls: AtomicUsize::new(0),
            persist_calls: AtomicUsize::new(0),
            deflate_delay: Mutex::new(Duration::ZERO),
            reloads: Mutex::new(Vec::new()),
            observer: ObserverSlot::new(),
        })
    }

    /// Force a state and notify, as if the engine changed state on its own.
    pub fn set_state(&self, to: ActivationState) {
        let from = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut *state, to)
        };
        if from != to {
            self.observer.notify(StateEvent::StateChanged { from, to });
        }
    }

    /// Mutate the content: bump the version and notify.
    pub fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
        self.observer.notify(StateEvent::ContentChanged);
    }

    /// Bump the version without a notification, as an external mutation whose
    /// event was lost would.
    pub fn bump_version_silently(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_modified(&self, modified: bool) {
        self.modified.store(modified, Ordering::SeqCst);
    }

    pub fn refuse_state_changes(&self) {
        self.refuse_state_changes.store(true, Ordering::SeqCst);
    }

    pub fn fail_persist(&self) {
        self.fail_persist.store(true, Ordering::SeqCst);
    }

    pub fn fail_deflate(&self) {
        self.fail_deflate.store(true, Ordering::SeqCst);
    }

    pub fn allow_deflate(&self) {
        self.fail_deflate.store(false, Ordering::SeqCst);
    }

    pub fn fail_reload(&self) {
        self.fail_reload.store(true, Ordering::SeqCst);
    }

    pub fn set_deflate_delay(&self, delay: Duration) {
        *self.deflate_delay.lock().unwrap() = delay;
    }

    pub fn deflate_calls(&self) -> usize {
        self.deflate_calls.load(Ordering::SeqCst)
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> Vec<String> {
        self.reloads.lock().unwrap().clone()
    }
}

impl ContentSource for FakeContent {
    fn current_state(&self) -> ActivationState {
        *self.state.lock().unwrap()
    }

    fn request_state_change(&self, target: ActivationState) -> Result<(), ContentError> {
        if self.refuse_state_changes.load(Ordering::SeqCst) {
            return Err(ContentError::StateChangeRejected(target));
        }
        // The state lock is released before notifying; observers may re-enter
        // the engine.
        let from = {
            let mut state = self.state.lock().unwrap();
            std::mem::replace(&mut *state, target)
        };
        if from != target {
            self.observer.notify(StateEvent::StateChanged { from, to: target });
        }
        Ok(())
    }

    fn content_version(&self) -> ContentVersion {
        ContentVersion(self.version.load(Ordering::SeqCst))
    }

    fn deflate_to_primitives(&self) -> Result<(PrimitiveSequence, BoundingRange), ContentError> {
        self.deflate_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.deflate_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        if self.fail_deflate.load(Ordering::SeqCst) {
            return Err(ContentError::DeflationFailed("scripted failure".to_owned()));
        }

        let version = self.version.load(Ordering::SeqCst);
        Ok((
            vec![Primitive::GlyphRun { origin: (0.0, 0.0), text: format!("v{}", version) }],
            BoundingRange::new(0.0, 0.0, 120.0, 40.0),
        ))
    }

    fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    fn persist(&self) -> Result<(), ContentError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(ContentError::PersistFailed("scripted failure".to_owned()));
        }
        self.modified.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn reload_from(&self, url: &str) -> Result<(), ContentError> {
        if self.fail_reload.load(Ordering::SeqCst) {
            return Err(ContentError::ReloadFailed {
                url: url.to_owned(),
                reason: "scripted failure".to_owned(),
            });
        }
        self.reloads.lock().unwrap().push(url.to_owned());
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_observer(&self, observer: Weak<dyn StateObserver>) {
        self.observer.set(observer);
    }
}

/// Link-change service driven entirely by the test.
pub(crate) struct ManualLinkService {
    next_token: AtomicU64,
    registrations: Mutex<HashMap<LinkToken, String>>,
    pending: Mutex<Vec<LinkToken>>,
}

impl ManualLinkService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_token: AtomicU64::new(1),
            registrations: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Mark a token's data changed; the next poll reports it.
    pub fn fire(&self, token: LinkToken) {
        self.pending.lock().unwrap().push(token);
    }

    pub fn watched_urls(&self) -> Vec<String> {
        self.registrations.lock().unwrap().values().cloned().collect()
    }
}

impl LinkChangeService for ManualLinkService {
    fn register(&self, url: &str) -> Result<LinkToken, LinkError> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.registrations.lock().unwrap().insert(token, url.to_owned());
        Ok(token)
    }

    fn unregister(&self, token: LinkToken) {
        self.registrations.lock().unwrap().remove(&token);
    }

    fn poll_changed(&self) -> Vec<LinkToken> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }
}
