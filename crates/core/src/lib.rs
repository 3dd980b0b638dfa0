//! Embedded-resource lifecycle hosting
//!
//! Ties the pieces of the workspace together around one type: a
//! [`ResourceHandle`] wraps an externally supplied content engine, tracks its
//! activation lifecycle in the bounded resource cache, memoizes the deflated
//! primitive sequence used to paint the resource while dormant, runs deflation
//! on the shared background pool, and keeps the resource connected to an
//! external file link.
//!
//! The host interacts with handles only; state-change notifications from the
//! content engine flow back in through an internal observer bridge that keeps
//! the cache membership and the render cache consistent.

mod bridge;
mod handle;
mod link;
mod render;

#[cfg(test)]
pub(crate) mod testing;

pub use handle::{HostContext, RepaintHook, ResourceHandle};
pub use link::{FileLinkService, LinkChangeService, LinkError, LinkToken, LinkTracker, LinkUpdate};
