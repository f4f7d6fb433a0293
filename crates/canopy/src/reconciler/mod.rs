//! # Reconciler
//!
//! Owns every fiber of every root and drives both phases:
//!
//! ```text
//!   render (interruptible)                  commit (synchronous)
//!   ───────────────────────                 ─────────────────────────────
//!   begin_work ─► children ─► complete      deletions ─► children ─► own
//!        ▲                       │          placement / prop update
//!        └──── next sibling ◄────┘          swap buffers ─► effects
//! ```
//!
//! The render phase only writes to the work-in-progress buffer. The current
//! buffer changes during commit, and through lane bookkeeping when updates
//! are scheduled.

mod child;
mod commit;
mod patch;
mod root;
mod unwind;
mod work;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use canopy_core::fiber::{Fiber, WorkPhase};
use canopy_core::hooks::HookSlot;
use canopy_core::store::same_value;
use canopy_core::{
    Element, FiberArena, FiberId, HookAddr, HostHandle, Inbox, InstanceId, Lane, Payload, RootId,
    Update,
};

use crate::scheduler::RootLanes;

pub use patch::{CaughtFault, CaughtKind, CommitReport, Patch};
pub use root::{RootHandle, RootStatus};
pub(crate) use root::{ElementUpdate, RootContainer};
pub(crate) use work::{PassFault, WorkInProgress};

/// Where the current fiber of an instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InstanceEntry {
    pub(crate) root: RootId,
    pub(crate) fiber: FiberId,
}

/// What happened to a scheduled update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
    /// Target instance is not mounted.
    Dropped,
    /// The update would not change the state.
    Skipped,
    /// Queued on a root.
    Scheduled(RootId),
}

/// Fiber storage plus the per-root bookkeeping.
pub(crate) struct Reconciler {
    pub(crate) arena: FiberArena,
    pub(crate) roots: BTreeMap<RootId, RootContainer>,
    instances: HashMap<InstanceId, InstanceEntry>,
    inbox: Inbox,
    next_instance: u64,
    next_root: u32,
}

impl Reconciler {
    pub(crate) fn new(inbox: Inbox) -> Self {
        Self {
            arena: FiberArena::new(),
            roots: BTreeMap::new(),
            instances: HashMap::new(),
            inbox,
            next_instance: 1,
            next_root: 1,
        }
    }

    pub(crate) fn allocate_instance(&mut self) -> InstanceId {
        let id = InstanceId::new(self.next_instance);
        self.next_instance += 1;
        id
    }

    /// Creates an empty root rendering into `container`.
    pub(crate) fn create_root(&mut self, container: HostHandle) -> RootId {
        let id = RootId::new(self.next_root);
        self.next_root += 1;

        let instance = self.allocate_instance();
        let mut fiber = Fiber::root(instance, container, Arc::from(Vec::<Element>::new()));
        fiber.phase = WorkPhase::Committed;
        let current = self.arena.allocate(fiber);
        self.instances.insert(instance, InstanceEntry { root: id, fiber: current });
        self.roots.insert(id, RootContainer::new(container, current));
        id
    }

    pub(crate) fn root(&self, id: RootId) -> Option<&RootContainer> {
        self.roots.get(&id)
    }

    pub(crate) fn root_mut(&mut self, id: RootId) -> Option<&mut RootContainer> {
        self.roots.get_mut(&id)
    }

    pub(crate) fn root_lanes(&self, id: RootId) -> Option<RootLanes> {
        self.roots
            .get(&id)
            .filter(|root| root.is_active())
            .map(|root| root.lanes)
    }

    /// Number of live fibers across all roots and both buffers.
    pub(crate) fn fiber_count(&self) -> usize {
        self.arena.len()
    }

    /// Number of mounted instances, root fibers included.
    pub(crate) fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// The other-buffer peer of `id`, if still allocated.
    pub(crate) fn alternate_of(&self, id: FiberId) -> Option<FiberId> {
        self.arena
            .get(id)
            .and_then(|fiber| fiber.alternate)
            .filter(|alternate| self.arena.contains(*alternate))
    }

    /// Queues a state update for a hook.
    ///
    /// `rendering` is the root of the pass in progress, if any; the
    /// same-value skip is disabled for it because its work-in-progress may
    /// already hold a different value.
    pub(crate) fn enqueue_update(
        &mut self,
        addr: HookAddr,
        payload: Payload,
        lane: Lane,
        rendering: Option<RootId>,
    ) -> Enqueued {
        let Some(entry) = self.instances.get(&addr.instance).copied() else {
            tracing::debug!(instance = addr.instance.raw(), "dropping update for unmounted instance");
            return Enqueued::Dropped;
        };
        if !self.roots.get(&entry.root).is_some_and(RootContainer::is_active) {
            return Enqueued::Dropped;
        }
        if rendering != Some(entry.root) && self.update_is_noop(entry, addr, &payload) {
            tracing::trace!(instance = addr.instance.raw(), "update keeps the same state; skipped");
            return Enqueued::Skipped;
        }

        if let Some(root) = self.roots.get_mut(&entry.root) {
            root.pending.push(addr, Update::new(lane, payload));
        }
        self.mark_update_lane(entry.root, entry.fiber, lane);
        Enqueued::Scheduled(entry.root)
    }

    /// Schedules a re-render of an instance without a state update.
    pub(crate) fn force_update(&mut self, instance: InstanceId, lane: Lane) -> Option<RootId> {
        let entry = self.instances.get(&instance).copied()?;
        if !self.roots.get(&entry.root).is_some_and(RootContainer::is_active) {
            return None;
        }
        self.mark_update_lane(entry.root, entry.fiber, lane);
        Some(entry.root)
    }

    /// Replaces the children of a root at `lane`.
    pub(crate) fn set_root_element(&mut self, root: RootId, lane: Lane, children: Arc<[Element]>) -> bool {
        let Some(container) = self.roots.get_mut(&root).filter(|root| root.is_active()) else {
            return false;
        };
        container.pending_element = Some(ElementUpdate { lane, children });
        container.schedule(lane);
        true
    }

    /// Lifts the suspension of a root whose token resolved.
    pub(crate) fn resume_root(&mut self, root: RootId) -> bool {
        let Some(container) = self.roots.get_mut(&root).filter(|root| root.is_active()) else {
            return false;
        };
        container.lanes.suspended = canopy_core::Lanes::EMPTY;
        !container.lanes.pending.is_empty()
    }

    /// Eager bailout: the instance has no queued work and the update yields
    /// the same state allocation.
    fn update_is_noop(&self, entry: InstanceEntry, addr: HookAddr, payload: &Payload) -> bool {
        let Some(fiber) = self.arena.get(entry.fiber) else {
            return false;
        };
        let alternate_lanes = self
            .alternate_of(entry.fiber)
            .map_or(canopy_core::Lanes::EMPTY, |alternate| self.arena[alternate].lanes);
        let queued = self
            .roots
            .get(&entry.root)
            .is_some_and(|root| root.pending.has_instance(addr.instance));
        if !fiber.lanes.is_empty() || !alternate_lanes.is_empty() || queued {
            return false;
        }
        let Some(HookSlot::State(slot)) = fiber.hooks.get(addr.slot as usize) else {
            return false;
        };
        slot.queue.is_empty()
            && payload
                .apply(&slot.value)
                .is_ok_and(|next| same_value(&next, &slot.value))
    }

    /// Marks `lane` on a fiber, on every ancestor's child lanes (both
    /// buffers) and on the root.
    fn mark_update_lane(&mut self, root: RootId, fiber: FiberId, lane: Lane) {
        let mut cursor = Some(fiber);
        let mut own = true;
        while let Some(id) = cursor {
            let alternate = self.alternate_of(id);
            for target in std::iter::once(id).chain(alternate) {
                if let Some(node) = self.arena.get_mut(target) {
                    if own {
                        node.lanes.insert(lane);
                    } else {
                        node.child_lanes.insert(lane);
                    }
                }
            }
            own = false;
            cursor = self.arena.get(id).and_then(|node| node.parent);
        }
        if let Some(container) = self.roots.get_mut(&root) {
            container.schedule(lane);
        }
    }
}
