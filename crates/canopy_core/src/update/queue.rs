//! # Update Queue
//!
//! Per-hook queue of state mutations. Draining a queue for a set of render
//! lanes applies every due update in enqueue order and keeps the rest:
//!
//! ```text
//!   base_state = 0      queue: [+1 Normal] [+10 Low] [*2 Normal]
//!   render Normal:      applies +1 and *2 (rebased) → state 2
//!                       keeps  base_state 1, queue [+10 Low] [*2 rebase]
//!   render Low:         1 + 10 = 11, * 2 = 22
//! ```
//!
//! Once an update is skipped, every later update is kept too (marked
//! `rebase`) and the base state freezes before the skipped one, so the final
//! state always equals applying the whole sequence in enqueue order.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::UpdateError;
use crate::lane::{Lane, Lanes};

/// Type-erased hook state.
pub type StateValue = Arc<dyn Any + Send + Sync>;

/// Type-erased functional updater.
pub type Updater = Arc<dyn Fn(&StateValue) -> Result<StateValue, UpdateError> + Send + Sync>;

/// What an update does to the state.
#[derive(Clone)]
pub enum Payload {
    /// Overwrite with a value.
    Replace(StateValue),
    /// Derive the next value from the previous one.
    Apply(Updater),
}

impl Payload {
    /// Overwrite with a fresh value.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Payload::Replace(Arc::new(value))
    }

    /// Overwrite with an existing allocation. Passing the current state's
    /// allocation is a no-op update.
    pub fn shared<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Payload::Replace(value)
    }

    /// Functional update.
    pub fn updater<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        Self::try_updater(move |prev: &T| Ok(f(prev)))
    }

    /// Fallible functional update.
    pub fn try_updater<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> Result<T, UpdateError> + Send + Sync + 'static,
    {
        Payload::Apply(Arc::new(move |prev: &StateValue| {
            let prev = prev
                .downcast_ref::<T>()
                .ok_or_else(|| UpdateError::new(format!("state is not a `{}`", type_name::<T>())))?;
            let next: StateValue = Arc::new(f(prev)?);
            Ok(next)
        }))
    }

    /// Computes the state after this payload.
    ///
    /// # Errors
    ///
    /// Returns the updater's error.
    pub fn apply(&self, prev: &StateValue) -> Result<StateValue, UpdateError> {
        match self {
            Payload::Replace(value) => Ok(Arc::clone(value)),
            Payload::Apply(updater) => updater(prev),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Replace(_) => f.write_str("Replace(..)"),
            Payload::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

/// Unique id of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpdateId(u64);

static NEXT_UPDATE_ID: AtomicU64 = AtomicU64::new(1);

impl UpdateId {
    fn next() -> Self {
        Self(NEXT_UPDATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// A queued state mutation.
#[derive(Debug, Clone)]
pub struct Update {
    /// Identity, stable across buffers.
    pub id: UpdateId,
    /// Priority.
    pub lane: Lane,
    /// Value or updater.
    pub payload: Payload,
    /// Already applied on top of a skipped update; re-applied by every pass
    /// until the skipped update is processed.
    pub rebase: bool,
}

impl Update {
    /// Creates an update with a fresh id.
    #[must_use]
    pub fn new(lane: Lane, payload: Payload) -> Self {
        Self {
            id: UpdateId::next(),
            lane,
            payload,
            rebase: false,
        }
    }

    /// Returns true if this update must be applied by a pass over `lanes`.
    #[inline]
    #[must_use]
    pub fn is_due(&self, lanes: Lanes) -> bool {
        self.rebase || lanes.contains(self.lane)
    }
}

/// Result of draining a queue.
#[derive(Debug, Clone)]
pub struct Drained {
    /// State seen by this render.
    pub state: StateValue,
    /// Lanes of updates left in the queue.
    pub remaining: Lanes,
}

/// An updater failed while draining.
#[derive(Debug, Clone)]
pub struct QueueFault {
    /// The failing update.
    pub update: UpdateId,
    /// Its error.
    pub error: UpdateError,
}

/// Queue of one state hook.
#[derive(Clone)]
pub struct UpdateQueue {
    base_state: StateValue,
    base_queue: Vec<Update>,
}

impl UpdateQueue {
    /// Creates an empty queue over an initial state.
    #[must_use]
    pub fn new(initial: StateValue) -> Self {
        Self {
            base_state: initial,
            base_queue: Vec::new(),
        }
    }

    /// Appends an update.
    pub fn enqueue(&mut self, update: Update) {
        self.base_queue.push(update);
    }

    /// Returns true if the queue holds `id`.
    #[must_use]
    pub fn contains(&self, id: UpdateId) -> bool {
        self.base_queue.iter().any(|update| update.id == id)
    }

    /// Ids of the queued updates, in order.
    pub fn ids(&self) -> impl Iterator<Item = UpdateId> + '_ {
        self.base_queue.iter().map(|update| update.id)
    }

    /// Number of queued updates.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.base_queue.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base_queue.is_empty()
    }

    /// Lanes of all queued updates.
    #[must_use]
    pub fn lanes(&self) -> Lanes {
        self.base_queue
            .iter()
            .fold(Lanes::EMPTY, |lanes, update| lanes | Lanes::single(update.lane))
    }

    /// Removes an update, leaving the rest in order.
    pub fn discard(&mut self, id: UpdateId) -> bool {
        let before = self.base_queue.len();
        self.base_queue.retain(|update| update.id != id);
        before != self.base_queue.len()
    }

    /// Applies every update due under `render_lanes`.
    ///
    /// On error the queue is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the first failing updater.
    pub fn drain(&mut self, render_lanes: Lanes) -> Result<Drained, QueueFault> {
        let mut state = Arc::clone(&self.base_state);
        let mut frozen_base: Option<StateValue> = None;
        let mut kept: Vec<Update> = Vec::new();
        let mut remaining = Lanes::EMPTY;

        for update in &self.base_queue {
            if !update.is_due(render_lanes) {
                if kept.is_empty() {
                    frozen_base = Some(Arc::clone(&state));
                }
                kept.push(update.clone());
                remaining.insert(update.lane);
                continue;
            }

            if !kept.is_empty() {
                let mut rebased = update.clone();
                rebased.rebase = true;
                kept.push(rebased);
            }

            state = update.payload.apply(&state).map_err(|error| QueueFault {
                update: update.id,
                error,
            })?;
        }

        self.base_state = frozen_base.unwrap_or_else(|| Arc::clone(&state));
        self.base_queue = kept;
        Ok(Drained { state, remaining })
    }
}

impl fmt::Debug for UpdateQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateQueue")
            .field("queued", &self.base_queue.len())
            .finish()
    }
}
