//! Hook slot storage and dependency lists.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::fiber::InstanceId;
use crate::store::{same_value, ErasedStore, Unsubscribe};
use crate::update::{StateValue, UpdateQueue};

/// Address of one hook: instance plus slot position.
///
/// Stable across renders and buffer swaps; setters carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookAddr {
    /// Owning instance.
    pub instance: InstanceId,
    /// Slot position.
    pub slot: u32,
}

impl HookAddr {
    /// Creates an address.
    #[inline]
    #[must_use]
    pub const fn new(instance: InstanceId, slot: u32) -> Self {
        Self { instance, slot }
    }
}

/// Effect teardown.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Effect body, run after commit.
pub type EffectCreate = Box<dyn FnOnce() -> Option<Cleanup> + Send>;

/// Cell holding the cleanup of the last run of an effect. Shared by both
/// buffers.
pub type CleanupCell = Arc<Mutex<Option<Cleanup>>>;

/// One dependency value, compared by identity.
#[derive(Clone)]
pub enum Dep {
    /// Shared value, compared by pointer.
    Shared(Arc<dyn Any + Send + Sync>),
    /// Signed scalar.
    Int(i64),
    /// Unsigned scalar.
    Uint(u64),
    /// Boolean.
    Bool(bool),
    /// String, compared by value.
    Str(Arc<str>),
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Dep::Shared(a), Dep::Shared(b)) => same_value(a, b),
            (Dep::Int(a), Dep::Int(b)) => a == b,
            (Dep::Uint(a), Dep::Uint(b)) => a == b,
            (Dep::Bool(a), Dep::Bool(b)) => a == b,
            (Dep::Str(a), Dep::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dep::Shared(value) => write!(f, "Shared({:p})", Arc::as_ptr(value).cast::<()>()),
            Dep::Int(v) => write!(f, "{v}"),
            Dep::Uint(v) => write!(f, "{v}u"),
            Dep::Bool(v) => write!(f, "{v}"),
            Dep::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl<T: Any + Send + Sync> From<&Arc<T>> for Dep {
    fn from(value: &Arc<T>) -> Self {
        let shared: Arc<dyn Any + Send + Sync> = Arc::clone(value) as Arc<dyn Any + Send + Sync>;
        Dep::Shared(shared)
    }
}

impl From<i64> for Dep {
    fn from(value: i64) -> Self {
        Dep::Int(value)
    }
}

impl From<i32> for Dep {
    fn from(value: i32) -> Self {
        Dep::Int(i64::from(value))
    }
}

impl From<u64> for Dep {
    fn from(value: u64) -> Self {
        Dep::Uint(value)
    }
}

impl From<u32> for Dep {
    fn from(value: u32) -> Self {
        Dep::Uint(u64::from(value))
    }
}

impl From<usize> for Dep {
    fn from(value: usize) -> Self {
        Dep::Uint(value as u64)
    }
}

impl From<bool> for Dep {
    fn from(value: bool) -> Self {
        Dep::Bool(value)
    }
}

impl From<&str> for Dep {
    fn from(value: &str) -> Self {
        Dep::Str(Arc::from(value))
    }
}

impl From<String> for Dep {
    fn from(value: String) -> Self {
        Dep::Str(Arc::from(value))
    }
}

/// Dependency list of a memo or effect.
///
/// [`Deps::always`] re-runs on every render; an empty list runs once.
#[derive(Debug, Clone, PartialEq)]
pub struct Deps(Option<Vec<Dep>>);

impl Deps {
    /// Re-run on every render.
    #[must_use]
    pub const fn always() -> Self {
        Self(None)
    }

    /// Run once, on mount.
    #[must_use]
    pub const fn once() -> Self {
        Self(Some(Vec::new()))
    }

    /// Explicit list.
    #[must_use]
    pub fn list(deps: Vec<Dep>) -> Self {
        Self(Some(deps))
    }

    /// Returns true if a memo or effect with `previous` deps must re-run.
    #[must_use]
    pub fn changed_since(&self, previous: &Deps) -> bool {
        match (&self.0, &previous.0) {
            (Some(next), Some(prev)) => next != prev,
            _ => true,
        }
    }
}

/// Builds a [`Deps`] list from values convertible into [`Dep`].
///
/// ```rust,ignore
/// let total = hooks.use_memo(deps![&items, page], || sum(&items))?;
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        $crate::hooks::Deps::once()
    };
    ($($dep:expr),+ $(,)?) => {
        $crate::hooks::Deps::list(vec![$($crate::hooks::Dep::from($dep)),+])
    };
}

/// Kind of a hook slot, checked on every render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// `use_state`.
    State,
    /// `use_reducer`.
    Reducer,
    /// `use_memo`.
    Memo,
    /// `use_effect`.
    Effect,
    /// `use_ref`.
    Ref,
    /// `use_sync_external_store`.
    Store,
}

/// A store subscription as held by a hook slot.
pub struct StoreSlot {
    /// Subscribed store.
    pub store: Arc<dyn ErasedStore>,
    /// Snapshot seen by the last render.
    pub snapshot: StateValue,
    /// Active subscription, shared by both buffers.
    pub subscription: Arc<Mutex<Option<Unsubscribe>>>,
    /// The store changed since the last commit; resubscribe after commit.
    pub resubscribe: bool,
}

/// A state or reducer slot.
pub struct StateSlot {
    /// State seen by the last render.
    pub value: StateValue,
    /// Queued updates.
    pub queue: UpdateQueue,
    /// Reducer captured at mount, for `use_reducer`.
    pub reducer: Option<StateValue>,
}

/// An effect slot.
pub struct EffectSlot {
    /// Deps of the last scheduled run.
    pub deps: Deps,
    /// Cleanup of the last run.
    pub cleanup: CleanupCell,
    /// Body scheduled by this render, if deps changed.
    pub pending: Option<EffectCreate>,
}

/// One hook's storage.
pub enum HookSlot {
    /// `use_state` / `use_reducer`.
    State(StateSlot),
    /// `use_memo`.
    Memo {
        /// Memoized value.
        value: StateValue,
        /// Deps it was computed with.
        deps: Deps,
    },
    /// `use_effect`.
    Effect(EffectSlot),
    /// `use_sync_external_store`.
    Store(StoreSlot),
    /// `use_ref`.
    Ref {
        /// The mutable cell, shared by both buffers.
        cell: StateValue,
    },
}

impl HookSlot {
    /// Kind of this slot.
    #[must_use]
    pub fn kind(&self) -> HookKind {
        match self {
            HookSlot::State(slot) if slot.reducer.is_some() => HookKind::Reducer,
            HookSlot::State(_) => HookKind::State,
            HookSlot::Memo { .. } => HookKind::Memo,
            HookSlot::Effect(_) => HookKind::Effect,
            HookSlot::Store(_) => HookKind::Store,
            HookSlot::Ref { .. } => HookKind::Ref,
        }
    }
}

// Scheduled effect bodies belong to the render that produced them and are
// not carried into the other buffer.
impl Clone for HookSlot {
    fn clone(&self) -> Self {
        match self {
            HookSlot::State(slot) => HookSlot::State(StateSlot {
                value: Arc::clone(&slot.value),
                queue: slot.queue.clone(),
                reducer: slot.reducer.clone(),
            }),
            HookSlot::Memo { value, deps } => HookSlot::Memo {
                value: Arc::clone(value),
                deps: deps.clone(),
            },
            HookSlot::Effect(slot) => HookSlot::Effect(EffectSlot {
                deps: slot.deps.clone(),
                cleanup: Arc::clone(&slot.cleanup),
                pending: None,
            }),
            HookSlot::Store(slot) => HookSlot::Store(StoreSlot {
                store: Arc::clone(&slot.store),
                snapshot: Arc::clone(&slot.snapshot),
                subscription: Arc::clone(&slot.subscription),
                resubscribe: false,
            }),
            HookSlot::Ref { cell } => HookSlot::Ref {
                cell: Arc::clone(cell),
            },
        }
    }
}

impl fmt::Debug for HookSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookSlot::State(slot) => f
                .debug_struct("State")
                .field("queue", &slot.queue)
                .field("reducer", &slot.reducer.is_some())
                .finish(),
            HookSlot::Memo { deps, .. } => f.debug_struct("Memo").field("deps", deps).finish(),
            HookSlot::Effect(slot) => f
                .debug_struct("Effect")
                .field("deps", &slot.deps)
                .field("scheduled", &slot.pending.is_some())
                .finish(),
            HookSlot::Store(slot) => f
                .debug_struct("Store")
                .field("resubscribe", &slot.resubscribe)
                .finish(),
            HookSlot::Ref { .. } => f.write_str("Ref"),
        }
    }
}
