//! External-file link tracking
//!
//! A linked resource mirrors content that lives outside the document. Each
//! linked handle owns a [`LinkTracker`]: the external URL plus a registration
//! token with a [`LinkChangeService`]. The service watches the external data
//! and reports changed tokens when polled; the host maps tokens back to
//! handles and calls [`ResourceHandle::handle_link_change`].
//!
//! [`FileLinkService`] is the filesystem implementation, watching both the
//! linked file and its parent directory (editors that save via atomic rename
//! emit events on the parent, not the file) and debouncing bursts of events
//! into one notification.
//!
//! [`ResourceHandle::handle_link_change`]: crate::ResourceHandle::handle_link_change

use crossbeam_channel::{unbounded, Receiver, Sender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Registration token handed out by a [`LinkChangeService`].
pub type LinkToken = u64;

/// Outcome of handling a link-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkUpdate {
    /// The URL differed; content was reloaded from the new location.
    Relinked,
    /// The URL was unchanged; the cached rendition was regenerated.
    Refreshed,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("resource has no external link")]
    NotLinked,
    #[error("link watch failed: {0}")]
    Watch(#[from] notify::Error),
    #[error("link reload failed: {0}")]
    Reload(#[from] content_model::ContentError),
}

/// Watches external data sources and reports which ones changed.
pub trait LinkChangeService: Send + Sync {
    fn register(&self, url: &str) -> Result<LinkToken, LinkError>;

    fn unregister(&self, token: LinkToken);

    /// Drain the tokens whose data changed since the last poll.
    fn poll_changed(&self) -> Vec<LinkToken>;
}

/// One handle's registration with a link-change service.
///
/// Owned exclusively by the handle it tracks; dropped registrations are
/// deregistered by the handle on disconnect or destruction.
pub struct LinkTracker {
    service: Arc<dyn LinkChangeService>,
    url: String,
    token: LinkToken,
}

impl LinkTracker {
    pub(crate) fn connect(
        service: Arc<dyn LinkChangeService>,
        url: String,
    ) -> Result<Self, LinkError> {
        let token = service.register(&url)?;
        Ok(Self { service, url, token })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token(&self) -> LinkToken {
        self.token
    }

    /// Move the registration to a new URL. The old watch is kept until the
    /// new one is in place.
    pub(crate) fn rebind(&mut self, url: &str) -> Result<(), LinkError> {
        let token = self.service.register(url)?;
        self.service.unregister(self.token);
        self.token = token;
        self.url = url.to_owned();
        Ok(())
    }

    pub(crate) fn disconnect(self) {
        self.service.unregister(self.token);
    }
}

struct FileWatch {
    // Dropping the watcher tears the OS-level watches down.
    _watcher: RecommendedWatcher,
    events: Receiver<()>,
    last_event: Option<Instant>,
}

struct FileServiceInner {
    next_token: LinkToken,
    watches: HashMap<LinkToken, FileWatch>,
}

/// Filesystem-backed [`LinkChangeService`].
///
/// URLs are interpreted as paths. Changes are reported once per burst: the
/// first poll at least `debounce` after the last raw event yields the token.
pub struct FileLinkService {
    debounce: Duration,
    inner: Mutex<FileServiceInner>,
}

impl FileLinkService {
    pub fn new() -> Self {
        Self::with_debounce(Duration::from_millis(250))
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            debounce,
            inner: Mutex::new(FileServiceInner { next_token: 1, watches: HashMap::new() }),
        }
    }

    fn make_watcher(path: &PathBuf, events: Sender<()>) -> Result<RecommendedWatcher, LinkError> {
        let watched = path.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                let Ok(event) = res else { return };
                let relevant = matches!(
                    event.kind,
                    notify::EventKind::Modify(_)
                        | notify::EventKind::Create(_)
                        | notify::EventKind::Remove(_)
                );
                if relevant && event.paths.iter().any(|p| p == &watched) {
                    let _ = events.send(());
                }
            })?;

        watcher.watch(path, RecursiveMode::NonRecursive)?;
        if let Some(parent) = path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        Ok(watcher)
    }
}

impl Default for FileLinkService {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkChangeService for FileLinkService {
    fn register(&self, url: &str) -> Result<LinkToken, LinkError> {
        let path = PathBuf::from(url);
        let (tx, rx) = unbounded();
        let watcher = Self::make_watcher(&path, tx)?;

        let mut inner = self.inner.lock().unwrap();
        let token = inner.next_token;
        inner.next_token += 1;
        inner.watches.insert(
            token,
            FileWatch { _watcher: watcher, events: rx, last_event: None },
        );
        Ok(token)
    }

    fn unregister(&self, token: LinkToken) {
        self.inner.lock().unwrap().watches.remove(&token);
    }

    fn poll_changed(&self) -> Vec<LinkToken> {
        let mut inner = self.inner.lock().unwrap();
        let debounce = self.debounce;
        let mut changed = Vec::new();

        for (token, watch) in inner.watches.iter_mut() {
            while watch.events.try_recv().is_ok() {
                watch.last_event = Some(Instant::now());
            }
            if let Some(last) = watch.last_event {
                if last.elapsed() >= debounce {
                    watch.last_event = None;
                    changed.push(*token);
                }
            }
        }

        changed
    }
}
