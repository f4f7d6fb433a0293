//! # Suspension
//!
//! A component whose data is not ready returns [`Render::Suspended`] with a
//! [`ResumeToken`]. Whoever owns the data calls [`ResumeToken::resolve`]; the
//! runtime is notified through its inbox and retries the suspended work.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::fiber::{InstanceId, RootId};
use crate::inbox::Inbox;

/// Result of a render step: ready output, or a suspension.
#[derive(Debug, Clone)]
pub enum Render<T> {
    /// The component produced its output.
    Ready(T),
    /// A data dependency is not available yet.
    Suspended(ResumeToken),
}

impl<T> Render<T> {
    /// Returns true if the step suspended.
    #[inline]
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        matches!(self, Render::Suspended(_))
    }
}

/// Identifier of a resume token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResumeId(u64);

impl ResumeId {
    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

static NEXT_RESUME_ID: AtomicU64 = AtomicU64::new(1);

/// What to retry once a token resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeTarget {
    /// A whole root whose pass was abandoned.
    Root(RootId),
    /// A suspense boundary instance showing its fallback.
    Boundary(InstanceId),
}

struct TokenInner {
    id: ResumeId,
    resolved: AtomicBool,
    watchers: Mutex<Vec<(Inbox, ResumeTarget)>>,
}

/// Handle to a pending data dependency.
///
/// Cloning shares the same underlying dependency.
#[derive(Clone)]
pub struct ResumeToken {
    inner: Arc<TokenInner>,
}

impl ResumeToken {
    /// Creates an unresolved token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id: ResumeId(NEXT_RESUME_ID.fetch_add(1, Ordering::Relaxed)),
                resolved: AtomicBool::new(false),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the token id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ResumeId {
        self.inner.id
    }

    /// Returns true once [`ResumeToken::resolve`] has been called.
    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.load(Ordering::Acquire)
    }

    /// Marks the dependency as available and notifies every watcher.
    ///
    /// Resolving twice is a no-op.
    pub fn resolve(&self) {
        if self.inner.resolved.swap(true, Ordering::AcqRel) {
            return;
        }
        let watchers = std::mem::take(&mut *self.inner.watchers.lock());
        for (inbox, target) in watchers {
            inbox.resumed(self.id(), target);
        }
    }

    /// Registers a runtime inbox to be notified on resolution.
    ///
    /// If the token already resolved the notification is sent immediately.
    pub fn watch(&self, inbox: &Inbox, target: ResumeTarget) {
        let mut watchers = self.inner.watchers.lock();
        if self.is_resolved() {
            drop(watchers);
            inbox.resumed(self.id(), target);
            return;
        }
        watchers.push((inbox.clone(), target));
    }
}

impl Default for ResumeToken {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ResumeToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ResumeToken {}

impl std::fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeToken")
            .field("id", &self.inner.id.0)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::Signal;

    #[test]
    fn test_resolve_notifies_watchers_once() {
        let (inbox, rx) = Inbox::channel();
        let token = ResumeToken::new();
        token.watch(&inbox, ResumeTarget::Root(RootId::new(1)));

        assert!(!token.is_resolved());
        token.resolve();
        token.resolve();

        assert!(token.is_resolved());
        let signals = rx.drain();
        assert_eq!(signals.len(), 1);
        assert!(matches!(
            signals[0],
            Signal::Resumed { target: ResumeTarget::Root(_), .. }
        ));
    }

    #[test]
    fn test_watch_after_resolve_fires_immediately() {
        let (inbox, rx) = Inbox::channel();
        let token = ResumeToken::new();
        token.resolve();
        token.watch(&inbox, ResumeTarget::Boundary(InstanceId::new(7)));
        assert_eq!(rx.drain().len(), 1);
    }
}
