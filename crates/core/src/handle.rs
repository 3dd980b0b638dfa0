//! The host-facing embedded resource object
//!
//! A [`ResourceHandle`] owns the lifecycle of one embedded resource: it asks
//! the content engine to materialize or unload itself, keeps the handle
//! tracked in the bounded resource cache while the engine is materialized,
//! memoizes the deflated primitive sequence per content version, and owns at
//! most one in-flight background deflation at a time.
//!
//! Handles are always held behind `Arc`: the cache tracks them weakly and the
//! observer bridge upgrades a weak back-reference on every engine event.
//! Dropping the last `Arc` is destruction — an in-flight deflation is flagged
//! killed rather than waited on, the external link watch is deregistered, and
//! the cache entry is removed.

use crate::bridge::StateChangeBridge;
use crate::link::{LinkChangeService, LinkError, LinkToken, LinkTracker, LinkUpdate};
use crate::render::RenderJob;
use content_model::{
    ActivationState, BoundingRange, ContentSource, ContentVersion, PrimitiveSequence,
};
use embed_host_cache::{CacheResident, PersistPolicy, ResidentId, ResourceCache};
use embed_host_scheduler::TaskPool;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Host callback scheduling a redraw.
pub type RepaintHook = Arc<dyn Fn() + Send + Sync>;

static NEXT_RESIDENT_ID: AtomicU64 = AtomicU64::new(1);

/// Shared services a handle is constructed against.
#[derive(Clone)]
pub struct HostContext {
    pub cache: Arc<ResourceCache>,
    pub pool: Arc<TaskPool>,
    pub persist_policy: Arc<PersistPolicy>,
    pub repaint: Option<RepaintHook>,
}

impl HostContext {
    /// Context against the process-wide cache with default persist policy.
    pub fn new(pool: Arc<TaskPool>) -> Self {
        Self {
            cache: ResourceCache::process_wide(),
            pool,
            persist_policy: Arc::new(PersistPolicy::new()),
            repaint: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResourceCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_repaint(mut self, repaint: RepaintHook) -> Self {
        self.repaint = Some(repaint);
        self
    }
}

struct CachedRender {
    primitives: PrimitiveSequence,
    bounds: BoundingRange,
    version: ContentVersion,
}

struct RenderSlot {
    cached: Option<CachedRender>,
    job: Option<RenderJob>,
}

/// One embedded resource as the host sees it.
pub struct ResourceHandle {
    name: String,
    id: ResidentId,
    content: Arc<dyn ContentSource>,
    context: HostContext,
    keep_running: bool,
    changed: AtomicBool,
    render: Mutex<RenderSlot>,
    link: Mutex<Option<LinkTracker>>,
    bridge: Arc<StateChangeBridge>,
}

impl ResourceHandle {
    /// Wrap a content engine in a new handle.
    ///
    /// `name` is the resource's stable identity within its container. The
    /// handle registers itself as the engine's observer; if the engine is
    /// already materialized (it may be shared with other subsystems) the
    /// handle enters the cache immediately.
    pub fn new(
        name: impl Into<String>,
        content: Arc<dyn ContentSource>,
        context: HostContext,
    ) -> Arc<Self> {
        Self::build(name.into(), content, context, false)
    }

    /// Like [`ResourceHandle::new`], but the resource is flagged
    /// always-running: the cache tracks it without ever evicting it.
    pub fn always_running(
        name: impl Into<String>,
        content: Arc<dyn ContentSource>,
        context: HostContext,
    ) -> Arc<Self> {
        Self::build(name.into(), content, context, true)
    }

    fn build(
        name: String,
        content: Arc<dyn ContentSource>,
        context: HostContext,
        keep_running: bool,
    ) -> Arc<Self> {
        let id = NEXT_RESIDENT_ID.fetch_add(1, Ordering::Relaxed);

        let handle = Arc::new_cyclic(|weak| {
            let bridge = Arc::new(StateChangeBridge::new(
                weak.clone(),
                context.cache.clone(),
                context.repaint.clone(),
            ));
            content.set_observer(Arc::<StateChangeBridge>::downgrade(&bridge));

            ResourceHandle {
                name,
                id,
                content: content.clone(),
                context,
                keep_running,
                changed: AtomicBool::new(false),
                render: Mutex::new(RenderSlot { cached: None, job: None }),
                link: Mutex::new(None),
                bridge,
            }
        });

        if handle.content.current_state().is_materialized() {
            let resident: Arc<dyn CacheResident> = handle.clone();
            handle.context.cache.insert(&resident);
        }

        handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resident_id(&self) -> ResidentId {
        self.id
    }

    pub fn current_state(&self) -> ActivationState {
        self.content.current_state()
    }

    pub fn is_always_running(&self) -> bool {
        self.keep_running
    }

    /// Materialize the content engine (`Loaded` → `Running`).
    ///
    /// Already-materialized handles report success without touching the
    /// engine. The cache insertion happens through the engine's state-change
    /// notification, not here.
    pub fn activate(&self) -> bool {
        match self.content.current_state() {
            ActivationState::Running | ActivationState::Active => true,
            ActivationState::Loaded => {
                match self.content.request_state_change(ActivationState::Running) {
                    Ok(()) => true,
                    Err(err) => {
                        log::warn!("activating '{}' failed: {}", self.name, err);
                        false
                    }
                }
            }
        }
    }

    /// Unload the content engine (`Running` → `Loaded`).
    ///
    /// Modified content is persisted first unless a purge guard is open on
    /// the shared policy; a failed persist refuses the unload so no edits are
    /// lost. A resource being edited in place (`Active`) also refuses.
    ///
    /// Returns `true` when the resource ends up dormant.
    pub fn deactivate(&self) -> bool {
        match self.content.current_state() {
            ActivationState::Loaded => return true,
            ActivationState::Active => {
                log::debug!("'{}' is being edited in place; not unloading", self.name);
                return false;
            }
            ActivationState::Running => {}
        }

        if self.content.is_modified() && !self.context.persist_policy.is_suppressed() {
            if let Err(err) = self.content.persist() {
                log::warn!("persist before unload of '{}' failed: {}", self.name, err);
                return false;
            }
        }

        match self.content.request_state_change(ActivationState::Loaded) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("unloading '{}' failed: {}", self.name, err);
                false
            }
        }
    }

    /// Get the primitive sequence for painting this resource.
    ///
    /// A cached result at the current content version is returned as-is. A
    /// finished background job is adopted first. Otherwise `synchronous`
    /// decides: deflate on the calling thread (blocking on an in-flight job
    /// if there is one), or start a background job and hand back the best
    /// previous result, possibly empty, without blocking.
    ///
    /// Deflation failures yield an empty sequence cached at the failing
    /// version, so callers do not retry until the content changes again.
    pub fn get_render(&self, synchronous: bool) -> PrimitiveSequence {
        let mut slot = self.render.lock().unwrap();

        let current = self.content.content_version();
        if let Some(cached) = &slot.cached {
            if cached.version == current {
                return cached.primitives.clone();
            }
        }

        if let Some(job) = slot.job.take() {
            if job.is_complete() {
                if let Some(primitives) = Self::adopt(&self.content, &mut slot, job) {
                    return primitives;
                }
            } else if synchronous {
                // The worker never takes this handle's locks, so blocking
                // with the render slot held cannot deadlock.
                job.wait();
                if let Some(primitives) = Self::adopt(&self.content, &mut slot, job) {
                    return primitives;
                }
            } else {
                let stale = slot
                    .cached
                    .as_ref()
                    .map(|cached| cached.primitives.clone())
                    .unwrap_or_default();
                slot.job = Some(job);
                return stale;
            }
        }

        if synchronous {
            let (primitives, bounds) = match self.content.deflate_to_primitives() {
                Ok(result) => result,
                Err(err) => {
                    log::warn!("deflation of '{}' failed: {}", self.name, err);
                    (PrimitiveSequence::new(), BoundingRange::EMPTY)
                }
            };
            slot.cached = Some(CachedRender {
                primitives: primitives.clone(),
                bounds,
                version: self.content.content_version(),
            });
            primitives
        } else {
            slot.job = Some(RenderJob::spawn(&self.context.pool, self.content.clone()));
            slot.cached
                .as_ref()
                .map(|cached| cached.primitives.clone())
                .unwrap_or_default()
        }
    }

    /// Move a finished job's result into the render cache.
    ///
    /// The version is stamped at copy time; a bump that raced the
    /// computation leaves the adopted result already stale for the next call.
    fn adopt(
        content: &Arc<dyn ContentSource>,
        slot: &mut RenderSlot,
        job: RenderJob,
    ) -> Option<PrimitiveSequence> {
        let (primitives, bounds) = job.take_output()?;
        slot.cached = Some(CachedRender {
            primitives: primitives.clone(),
            bounds,
            version: content.content_version(),
        });
        Some(primitives)
    }

    /// Bounds of the cached render, if one exists.
    pub fn render_bounds(&self) -> Option<BoundingRange> {
        self.render.lock().unwrap().cached.as_ref().map(|cached| cached.bounds)
    }

    /// Drop the cached render; the next request recomputes.
    pub fn invalidate_render(&self) {
        self.render.lock().unwrap().cached = None;
    }

    /// Whether the resource was marked changed since the last
    /// [`take_changed`](ResourceHandle::take_changed).
    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    /// Consume the changed marker.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    /// Register this resource with a link-change service for `url`,
    /// replacing any existing link.
    pub fn connect_link(
        &self,
        service: Arc<dyn LinkChangeService>,
        url: impl Into<String>,
    ) -> Result<(), LinkError> {
        let mut link = self.link.lock().unwrap();
        let tracker = LinkTracker::connect(service, url.into())?;
        if let Some(old) = link.replace(tracker) {
            old.disconnect();
        }
        Ok(())
    }

    /// Deregister the external link, if any.
    pub fn break_link(&self) {
        if let Some(tracker) = self.link.lock().unwrap().take() {
            tracker.disconnect();
        }
    }

    pub fn link_url(&self) -> Option<String> {
        self.link.lock().unwrap().as_ref().map(|tracker| tracker.url().to_owned())
    }

    pub fn link_token(&self) -> Option<LinkToken> {
        self.link.lock().unwrap().as_ref().map(LinkTracker::token)
    }

    /// React to a change notification for this resource's external link.
    ///
    /// A new URL relinks: the engine is cycled dormant, reloaded from the new
    /// URL and restored to its prior state; on any failure the old link stays
    /// intact and the error is reported. An unchanged URL means the data
    /// behind the link changed, so the cached render is regenerated and the
    /// resource marked changed.
    ///
    /// If re-registering the watch for a new URL fails, the content has
    /// already moved; the error is reported and the old watch stays.
    pub fn handle_link_change(&self, new_url: &str) -> Result<LinkUpdate, LinkError> {
        let mut link = self.link.lock().unwrap();
        let tracker = link.as_mut().ok_or(LinkError::NotLinked)?;

        if tracker.url() == new_url {
            drop(link);
            self.note_content_replaced();
            return Ok(LinkUpdate::Refreshed);
        }

        self.relink_to(new_url)?;
        tracker.rebind(new_url)?;
        Ok(LinkUpdate::Relinked)
    }

    /// Reload the engine's content from `url` through a dormant cycle.
    fn relink_to(&self, url: &str) -> Result<(), LinkError> {
        let prior = self.content.current_state();

        if prior.is_materialized() {
            self.content.request_state_change(ActivationState::Loaded)?;
        }

        if let Err(err) = self.content.reload_from(url) {
            if prior.is_materialized() {
                if let Err(restore) = self.content.request_state_change(prior) {
                    log::warn!("restoring '{}' after failed relink: {}", self.name, restore);
                }
            }
            return Err(err.into());
        }

        if prior.is_materialized() {
            self.content.request_state_change(prior)?;
        }

        self.note_content_replaced();
        Ok(())
    }

    fn note_content_replaced(&self) {
        self.invalidate_render();
        self.changed.store(true, Ordering::Release);
        self.bridge.request_repaint();
    }
}

impl CacheResident for ResourceHandle {
    fn resident_id(&self) -> ResidentId {
        self.id
    }

    fn keep_running(&self) -> bool {
        self.keep_running
    }

    fn try_deactivate(&self) -> bool {
        self.deactivate()
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        // Never wait on an in-flight deflation here: flag it killed and let
        // the worker discard the result and release the job's state itself.
        if let Ok(slot) = self.render.get_mut() {
            if let Some(job) = slot.job.take() {
                job.kill();
            }
        }

        if let Ok(link) = self.link.get_mut() {
            if let Some(tracker) = link.take() {
                tracker.disconnect();
            }
        }

        self.context.cache.remove(self.id);
    }
}
