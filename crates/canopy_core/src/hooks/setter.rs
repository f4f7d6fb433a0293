//! Handles returned by hooks. All are `Send + Sync` and talk to the runtime
//! only through its inbox.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::UpdateError;
use crate::hooks::HookAddr;
use crate::inbox::Inbox;
use crate::lane::Lane;
use crate::update::Payload;

/// State setter returned by `use_state`.
///
/// Equal setters address the same hook; identity is stable across renders.
pub struct Setter<T> {
    addr: HookAddr,
    inbox: Inbox,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Setter<T> {
    pub(crate) fn new(addr: HookAddr, inbox: Inbox) -> Self {
        Self {
            addr,
            inbox,
            _marker: PhantomData,
        }
    }

    /// Replaces the state with a new value.
    pub fn set(&self, value: T) {
        self.post(Payload::value(value), None);
    }

    /// Replaces the state with an existing allocation. Setting the current
    /// allocation again schedules nothing.
    pub fn set_shared(&self, value: Arc<T>) {
        self.post(Payload::shared(value), None);
    }

    /// Derives the next state from the previous one.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.post(Payload::updater(f), None);
    }

    /// Fallible functional update. An error is raised to the nearest error
    /// boundary when the update is processed.
    pub fn try_update<F>(&self, f: F)
    where
        F: Fn(&T) -> Result<T, UpdateError> + Send + Sync + 'static,
    {
        self.post(Payload::try_updater(f), None);
    }

    /// Posts a payload on an explicit lane.
    pub fn dispatch(&self, payload: Payload, lane: Lane) {
        self.post(payload, Some(lane));
    }

    /// Address of the hook this setter writes to.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> HookAddr {
        self.addr
    }

    fn post(&self, payload: Payload, lane: Option<Lane>) {
        if !self.inbox.update(self.addr, payload, lane) {
            tracing::debug!(addr = ?self.addr, "update dropped, runtime is gone");
        }
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            addr: self.addr,
            inbox: self.inbox.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Setter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for Setter<T> {}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Setter").field(&self.addr).finish()
    }
}

/// Reducer captured by `use_reducer` at mount.
pub(crate) struct ReducerFn<S, A>(pub(crate) Box<dyn Fn(&S, &A) -> S + Send + Sync>);

/// Action dispatcher returned by `use_reducer`.
pub struct Dispatch<S, A> {
    addr: HookAddr,
    inbox: Inbox,
    reducer: Arc<ReducerFn<S, A>>,
}

impl<S, A> Dispatch<S, A>
where
    S: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    pub(crate) fn new(addr: HookAddr, inbox: Inbox, reducer: Arc<ReducerFn<S, A>>) -> Self {
        Self {
            addr,
            inbox,
            reducer,
        }
    }

    /// Sends an action through the reducer.
    pub fn dispatch(&self, action: A) {
        self.post(action, None);
    }

    /// Sends an action on an explicit lane.
    pub fn dispatch_with_lane(&self, action: A, lane: Lane) {
        self.post(action, Some(lane));
    }

    /// Address of the reducer hook.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> HookAddr {
        self.addr
    }

    fn post(&self, action: A, lane: Option<Lane>) {
        let reducer = Arc::clone(&self.reducer);
        let payload = Payload::updater(move |state: &S| (reducer.0)(state, &action));
        if !self.inbox.update(self.addr, payload, lane) {
            tracing::debug!(addr = ?self.addr, "action dropped, runtime is gone");
        }
    }
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            addr: self.addr,
            inbox: self.inbox.clone(),
            reducer: Arc::clone(&self.reducer),
        }
    }
}

impl<S, A> PartialEq for Dispatch<S, A> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<S, A> fmt::Debug for Dispatch<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dispatch").field(&self.addr).finish()
    }
}

/// Mutable cell returned by `use_ref`. Writes never schedule a render.
pub struct RefHandle<T> {
    cell: Arc<Mutex<T>>,
}

impl<T> RefHandle<T> {
    pub(crate) fn new(cell: Arc<Mutex<T>>) -> Self {
        Self { cell }
    }

    /// Replaces the stored value.
    pub fn set(&self, value: T) {
        *self.cell.lock() = value;
    }

    /// Runs `f` with mutable access to the value.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.cell.lock();
        f(&mut *guard)
    }
}

impl<T: Clone> RefHandle<T> {
    /// Returns a copy of the stored value.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.lock().clone()
    }
}

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for RefHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefHandle({:p})", Arc::as_ptr(&self.cell))
    }
}
