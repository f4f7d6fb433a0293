//! The hook context handed to render functions.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RenderError;
use crate::fiber::InstanceId;
use crate::hooks::setter::ReducerFn;
use crate::hooks::{
    Cleanup, Deps, Dispatch, EffectSlot, HookAddr, HookKind, HookSlot, RefHandle, Setter,
    StateSlot, StoreSlot,
};
use crate::inbox::Inbox;
use crate::lane::Lanes;
use crate::store::{same_store, same_value, ErasedStore, ExternalStore, StoreRead};
use crate::update::{PendingUpdates, StateValue, UpdateId, UpdateQueue};

/// Wraps a cleanup closure for returning from an effect.
pub fn cleanup(f: impl FnOnce() + Send + 'static) -> Option<Cleanup> {
    Some(Box::new(f))
}

/// Pass-wide inputs and outputs of a hook context.
pub struct HookEnv<'a> {
    /// Lanes being rendered.
    pub render_lanes: Lanes,
    /// Updates not yet merged into any queue.
    pub pending: &'a PendingUpdates,
    /// Pending updates merged by this pass.
    pub consumed: &'a mut HashSet<(HookAddr, UpdateId)>,
    /// Store snapshots read by this pass.
    pub store_reads: &'a mut Vec<StoreRead>,
    /// Inbox that setters post to.
    pub inbox: &'a Inbox,
}

/// What a finished render left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookOutcome {
    /// Lanes of updates still queued in this instance's hooks.
    pub remaining: Lanes,
    /// Some state or store snapshot changed identity.
    pub state_changed: bool,
    /// Effects or subscriptions must run after commit.
    pub passive: bool,
}

/// Hook context of one component render.
///
/// The Nth hook call always maps to the Nth slot. Calling hooks
/// conditionally, in a different order, or with another state type is a
/// [`RenderError::HookOrderViolation`]; once raised, every later hook call in
/// the same render fails as well.
pub struct Hooks<'a> {
    component: &'a str,
    instance: InstanceId,
    slots: &'a mut Vec<HookSlot>,
    mounting: bool,
    previous_len: usize,
    cursor: usize,
    env: HookEnv<'a>,
    remaining: Lanes,
    state_changed: bool,
    passive: bool,
    violation: Option<RenderError>,
    discarded: Option<(HookAddr, UpdateId)>,
}

fn order_violation(component: &str, detail: String) -> RenderError {
    RenderError::HookOrderViolation {
        component: component.to_owned(),
        detail,
    }
}

impl<'a> Hooks<'a> {
    /// Creates the context for one render of `instance`.
    ///
    /// `mounting` is true on the first render, when `slots` is empty.
    pub fn new(
        component: &'a str,
        instance: InstanceId,
        slots: &'a mut Vec<HookSlot>,
        mounting: bool,
        env: HookEnv<'a>,
    ) -> Self {
        let previous_len = slots.len();
        Self {
            component,
            instance,
            slots,
            mounting,
            previous_len,
            cursor: 0,
            env,
            remaining: Lanes::EMPTY,
            state_changed: false,
            passive: false,
            violation: None,
            discarded: None,
        }
    }

    /// Instance being rendered.
    #[inline]
    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Lanes of the current pass.
    #[inline]
    #[must_use]
    pub fn render_lanes(&self) -> Lanes {
        self.env.render_lanes
    }

    /// Returns true on the first render of the instance.
    #[inline]
    #[must_use]
    pub fn is_mounting(&self) -> bool {
        self.mounting
    }

    /// Local state.
    ///
    /// # Errors
    ///
    /// Hook order violations, or a failing functional update.
    pub fn use_state<T, F>(&mut self, init: F) -> Result<(Arc<T>, Setter<T>), RenderError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let index = self.next_index()?;
        let value = if self.mounting {
            let value: StateValue = Arc::new(init());
            self.slots.push(HookSlot::State(StateSlot {
                value: Arc::clone(&value),
                queue: UpdateQueue::new(Arc::clone(&value)),
                reducer: None,
            }));
            value
        } else {
            self.drain_state(index, HookKind::State)?
        };
        let value = self.typed::<T>(index, value)?;
        Ok((value, Setter::new(self.addr(index), self.env.inbox.clone())))
    }

    /// State driven by a reducer. The reducer is captured on mount; later
    /// renders reuse it.
    ///
    /// # Errors
    ///
    /// Hook order violations.
    pub fn use_reducer<S, A, R, I>(&mut self, reducer: R, init: I) -> Result<(Arc<S>, Dispatch<S, A>), RenderError>
    where
        S: Send + Sync + 'static,
        A: Send + Sync + 'static,
        R: Fn(&S, &A) -> S + Send + Sync + 'static,
        I: FnOnce() -> S,
    {
        let index = self.next_index()?;
        let (value, reducer) = if self.mounting {
            let value: StateValue = Arc::new(init());
            let reducer = Arc::new(ReducerFn::<S, A>(Box::new(reducer)));
            let erased: StateValue = Arc::clone(&reducer) as StateValue;
            self.slots.push(HookSlot::State(StateSlot {
                value: Arc::clone(&value),
                queue: UpdateQueue::new(Arc::clone(&value)),
                reducer: Some(erased),
            }));
            (value, reducer)
        } else {
            let value = self.drain_state(index, HookKind::Reducer)?;
            let stored = match &self.slots[index] {
                HookSlot::State(slot) => slot.reducer.clone(),
                _ => None,
            };
            let reducer = stored
                .and_then(|erased| erased.downcast::<ReducerFn<S, A>>().ok())
                .ok_or_else(|| self.violate(format!("reducer at slot {index} changed type")))?;
            (value, reducer)
        };
        let value = self.typed::<S>(index, value)?;
        Ok((
            value,
            Dispatch::new(self.addr(index), self.env.inbox.clone(), reducer),
        ))
    }

    /// Memoized value, recomputed when `deps` change.
    ///
    /// # Errors
    ///
    /// Hook order violations.
    pub fn use_memo<T, F>(&mut self, deps: Deps, compute: F) -> Result<Arc<T>, RenderError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let index = self.next_index()?;
        let value = if self.mounting {
            let value: StateValue = Arc::new(compute());
            self.slots.push(HookSlot::Memo {
                value: Arc::clone(&value),
                deps,
            });
            value
        } else {
            self.check_slot(index, HookKind::Memo)?;
            match &mut self.slots[index] {
                HookSlot::Memo {
                    value,
                    deps: previous,
                } => {
                    if deps.changed_since(previous) {
                        *value = Arc::new(compute());
                        *previous = deps;
                    }
                    Arc::clone(value)
                }
                _ => return Err(order_violation(self.component, format!("slot {index} is not a memo"))),
            }
        };
        self.typed::<T>(index, value)
    }

    /// Effect run after commit when `deps` changed. The previous run's
    /// cleanup runs first.
    ///
    /// # Errors
    ///
    /// Hook order violations.
    pub fn use_effect<F>(&mut self, deps: Deps, create: F) -> Result<(), RenderError>
    where
        F: FnOnce() -> Option<Cleanup> + Send + 'static,
    {
        let index = self.next_index()?;
        if self.mounting {
            self.slots.push(HookSlot::Effect(EffectSlot {
                deps,
                cleanup: Arc::new(Mutex::new(None)),
                pending: Some(Box::new(create)),
            }));
            self.passive = true;
            return Ok(());
        }

        self.check_slot(index, HookKind::Effect)?;
        if let HookSlot::Effect(slot) = &mut self.slots[index] {
            if deps.changed_since(&slot.deps) {
                slot.deps = deps;
                slot.pending = Some(Box::new(create));
                self.passive = true;
            }
        }
        Ok(())
    }

    /// Mutable cell that survives renders without triggering them.
    ///
    /// # Errors
    ///
    /// Hook order violations.
    pub fn use_ref<T, F>(&mut self, init: F) -> Result<RefHandle<T>, RenderError>
    where
        T: Send + 'static,
        F: FnOnce() -> T,
    {
        let index = self.next_index()?;
        if self.mounting {
            let cell = Arc::new(Mutex::new(init()));
            let erased: StateValue = Arc::clone(&cell) as StateValue;
            self.slots.push(HookSlot::Ref { cell: erased });
            return Ok(RefHandle::new(cell));
        }

        self.check_slot(index, HookKind::Ref)?;
        let erased = match &self.slots[index] {
            HookSlot::Ref { cell } => Some(Arc::clone(cell)),
            _ => None,
        };
        erased
            .and_then(|cell| cell.downcast::<Mutex<T>>().ok())
            .map(RefHandle::new)
            .ok_or_else(|| self.violate(format!("ref at slot {index} changed type")))
    }

    /// Reads an external store and subscribes to it after commit.
    ///
    /// Every snapshot read is recorded; the pass is only committed if all
    /// recorded stores still return the same snapshots.
    ///
    /// # Errors
    ///
    /// Hook order violations.
    pub fn use_sync_external_store<S: ExternalStore>(&mut self, store: &Arc<S>) -> Result<Arc<S::Snapshot>, RenderError> {
        let index = self.next_index()?;
        let snapshot = store.get_snapshot();
        if cfg!(debug_assertions) && !Arc::ptr_eq(&snapshot, &store.get_snapshot()) {
            tracing::warn!(
                component = self.component,
                "get_snapshot returned a new allocation for an unchanged store; cache the snapshot"
            );
        }
        let erased_store: Arc<dyn ErasedStore> = Arc::clone(store) as Arc<dyn ErasedStore>;
        let erased_snapshot: StateValue = Arc::clone(&snapshot) as StateValue;

        if self.mounting {
            self.slots.push(HookSlot::Store(StoreSlot {
                store: Arc::clone(&erased_store),
                snapshot: Arc::clone(&erased_snapshot),
                subscription: Arc::new(Mutex::new(None)),
                resubscribe: true,
            }));
            self.passive = true;
        } else {
            self.check_slot(index, HookKind::Store)?;
            if let HookSlot::Store(slot) = &mut self.slots[index] {
                if !same_store(&slot.store, &erased_store) {
                    slot.store = Arc::clone(&erased_store);
                    slot.resubscribe = true;
                    self.passive = true;
                }
                if !same_value(&slot.snapshot, &erased_snapshot) {
                    slot.snapshot = Arc::clone(&erased_snapshot);
                    self.state_changed = true;
                }
            }
        }

        self.env.store_reads.push(StoreRead {
            store: erased_store,
            snapshot: erased_snapshot,
        });
        Ok(snapshot)
    }

    /// Update discarded because its updater failed during this render.
    #[must_use]
    pub fn discarded(&self) -> Option<(HookAddr, UpdateId)> {
        self.discarded
    }

    /// Ends the render, checking that every previous hook was called.
    ///
    /// # Errors
    ///
    /// The first hook order violation of this render.
    pub fn finish(self) -> Result<HookOutcome, RenderError> {
        if let Some(violation) = self.violation {
            return Err(violation);
        }
        if !self.mounting && self.cursor < self.previous_len {
            return Err(order_violation(
                self.component,
                format!(
                    "rendered {} hooks, previous render had {}",
                    self.cursor, self.previous_len
                ),
            ));
        }
        Ok(HookOutcome {
            remaining: self.remaining,
            state_changed: self.state_changed,
            passive: self.passive,
        })
    }

    fn addr(&self, index: usize) -> HookAddr {
        HookAddr::new(self.instance, u32::try_from(index).unwrap_or(u32::MAX))
    }

    fn violate(&mut self, detail: String) -> RenderError {
        let error = order_violation(self.component, detail);
        self.violation = Some(error.clone());
        error
    }

    fn next_index(&mut self) -> Result<usize, RenderError> {
        if let Some(violation) = &self.violation {
            return Err(violation.clone());
        }
        let index = self.cursor;
        self.cursor += 1;
        Ok(index)
    }

    fn check_slot(&mut self, index: usize, kind: HookKind) -> Result<(), RenderError> {
        if index >= self.previous_len {
            return Err(self.violate(format!(
                "rendered more hooks than the previous render ({} > {})",
                index + 1,
                self.previous_len
            )));
        }
        let found = self.slots[index].kind();
        if found != kind {
            return Err(self.violate(format!("slot {index} was {found:?}, now {kind:?}")));
        }
        Ok(())
    }

    fn typed<T: Send + Sync + 'static>(&mut self, index: usize, value: StateValue) -> Result<Arc<T>, RenderError> {
        value.downcast::<T>().map_err(|_| {
            self.violate(format!(
                "slot {index} changed type to `{}`",
                std::any::type_name::<T>()
            ))
        })
    }

    fn drain_state(&mut self, index: usize, kind: HookKind) -> Result<StateValue, RenderError> {
        self.check_slot(index, kind)?;
        let addr = self.addr(index);
        let component = self.component;
        let render_lanes = self.env.render_lanes;

        let HookSlot::State(slot) = &mut self.slots[index] else {
            return Err(order_violation(component, format!("slot {index} is not a state hook")));
        };

        let queued: HashSet<UpdateId> = slot.queue.ids().collect();
        for update in self.env.pending.get(addr) {
            if queued.contains(&update.id) || self.env.consumed.contains(&(addr, update.id)) {
                continue;
            }
            slot.queue.enqueue(update.clone());
            self.env.consumed.insert((addr, update.id));
        }

        match slot.queue.drain(render_lanes) {
            Ok(drained) => {
                if !same_value(&drained.state, &slot.value) {
                    slot.value = Arc::clone(&drained.state);
                    self.state_changed = true;
                }
                self.remaining |= drained.remaining;
                Ok(drained.state)
            }
            Err(fault) => {
                slot.queue.discard(fault.update);
                self.discarded = Some((addr, fault.update));
                Err(RenderError::Update {
                    component: component.to_owned(),
                    source: fault.error,
                })
            }
        }
    }
}
