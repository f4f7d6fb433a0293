//! # External Stores
//!
//! Data sources that live outside the component tree. A store hands out
//! immutable snapshots; the runtime compares them by reference to detect
//! changes and to keep one committed frame consistent.

use std::sync::Arc;

use crate::update::StateValue;

/// Called by a store after its state changed.
pub type StoreListener = Arc<dyn Fn() + Send + Sync>;

/// Removes a subscription.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// A mutable data source read through snapshots.
///
/// `get_snapshot` must return the same allocation for as long as the store
/// is unchanged. A store that allocates a fresh snapshot on every call looks
/// permanently changed and is reported in debug builds.
pub trait ExternalStore: Send + Sync + 'static {
    /// Immutable view of the store.
    type Snapshot: Send + Sync + 'static;

    /// Registers a change listener.
    fn subscribe(&self, listener: StoreListener) -> Unsubscribe;

    /// Current snapshot.
    fn get_snapshot(&self) -> Arc<Self::Snapshot>;
}

/// Object-safe view of an [`ExternalStore`].
pub trait ErasedStore: Send + Sync {
    /// Registers a change listener.
    fn subscribe_erased(&self, listener: StoreListener) -> Unsubscribe;

    /// Current snapshot, type-erased.
    fn snapshot_erased(&self) -> StateValue;
}

impl<S: ExternalStore> ErasedStore for S {
    fn subscribe_erased(&self, listener: StoreListener) -> Unsubscribe {
        self.subscribe(listener)
    }

    fn snapshot_erased(&self) -> StateValue {
        self.get_snapshot()
    }
}

/// Returns true if two erased values share an allocation.
#[inline]
#[must_use]
pub fn same_value(a: &StateValue, b: &StateValue) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Returns true if two erased stores are the same store.
#[inline]
#[must_use]
pub fn same_store(a: &Arc<dyn ErasedStore>, b: &Arc<dyn ErasedStore>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// A snapshot observed during render.
#[derive(Clone)]
pub struct StoreRead {
    /// The store.
    pub store: Arc<dyn ErasedStore>,
    /// What the render saw.
    pub snapshot: StateValue,
}

impl StoreRead {
    /// Returns true if the store still yields the observed snapshot.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        same_value(&self.store.snapshot_erased(), &self.snapshot)
    }
}

impl std::fmt::Debug for StoreRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRead")
            .field("store", &Arc::as_ptr(&self.store).cast::<()>())
            .field("snapshot", &Arc::as_ptr(&self.snapshot).cast::<()>())
            .finish()
    }
}
