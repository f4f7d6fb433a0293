//! # External Store Bridge
//!
//! [`SharedStore`] is a ready-made [`ExternalStore`]: a value behind a lock
//! with change listeners. Components read it through
//! `Hooks::use_sync_external_store`; every read is recorded and checked
//! again before commit so one pass never shows two versions of a store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use canopy_core::hooks::HookSlot;
use canopy_core::store::{same_store, same_value, StoreRead};
use canopy_core::{ExternalStore, FiberArena, FiberId, InstanceId, StoreListener, Unsubscribe};
use parking_lot::{Mutex, RwLock};

type Listeners = Arc<Mutex<Vec<(u64, StoreListener)>>>;

/// Mutable value shared between the application and the runtime.
///
/// Snapshots are reference-counted; `set` and `update` swap in a new
/// allocation, so unchanged stores keep returning the same snapshot.
pub struct SharedStore<T> {
    value: RwLock<Arc<T>>,
    listeners: Listeners,
    next_listener: AtomicU64,
}

impl<T: Send + Sync + 'static> SharedStore<T> {
    /// Creates a store holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(Arc::new(initial)),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(1),
        })
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&*self.value.read())
    }

    /// Replaces the value and notifies listeners.
    pub fn set(&self, value: T) {
        *self.value.write() = Arc::new(value);
        self.notify();
    }

    /// Derives a new value from the current one and notifies listeners.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        {
            let mut guard = self.value.write();
            let next = f(&guard);
            *guard = Arc::new(next);
        }
        self.notify();
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn notify(&self) {
        // Listeners may read the store; call them without holding the lock.
        let listeners: Vec<StoreListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl<T: Send + Sync + 'static> ExternalStore for SharedStore<T> {
    type Snapshot = T;

    fn subscribe(&self, listener: StoreListener) -> Unsubscribe {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        let listeners = Arc::clone(&self.listeners);
        Box::new(move || {
            listeners.lock().retain(|(registered, _)| *registered != id);
        })
    }

    fn get_snapshot(&self) -> Arc<T> {
        self.get()
    }
}

impl<T> std::fmt::Debug for SharedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("listeners", &self.listeners.lock().len())
            .finish_non_exhaustive()
    }
}

/// First recorded read whose store has moved on since it was read.
pub(crate) fn first_torn(reads: &[StoreRead]) -> Option<&StoreRead> {
    reads.iter().find(|read| !read.is_consistent())
}

/// Subscribers in the tree under `root` that still hold an older snapshot of
/// a store this pass read. They bailed out, so the read check never sees
/// them, but committing them next to fresh readers would tear the frame.
pub(crate) fn stale_subscribers(arena: &FiberArena, root: FiberId, reads: &[StoreRead]) -> Vec<InstanceId> {
    let mut stale = Vec::new();
    if reads.is_empty() {
        return stale;
    }
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(fiber) = arena.get(id) else {
            continue;
        };
        let behind = fiber.hooks.iter().any(|slot| match slot {
            HookSlot::Store(slot) => {
                reads.iter().any(|read| same_store(&read.store, &slot.store))
                    && !same_value(&slot.store.snapshot_erased(), &slot.snapshot)
            }
            _ => false,
        });
        if behind {
            stale.push(fiber.instance);
        }
        stack.extend(arena.children(id));
    }
    stale
}
