//! Render phase: one unit of work at a time over the work-in-progress tree.

use std::collections::HashSet;
use std::sync::Arc;

use canopy_core::fiber::{BoundaryState, FiberFlags, FiberProps, FiberTag, WorkPhase};
use canopy_core::hooks::{HookEnv, Hooks};
use canopy_core::store::StoreRead;
use canopy_core::update::UpdateId;
use canopy_core::{
    Element, Fault, FiberId, HookAddr, Lanes, Render, RenderError, ResumeToken,
};

use super::{CaughtFault, Reconciler};
use crate::scheduler::Selection;

/// A fault that left the render phase: nothing above the thrower handled it.
#[derive(Debug)]
pub(crate) enum PassFault {
    /// No error boundary; the root crashes.
    Uncaught(RenderError),
    /// No suspense boundary; the pass is abandoned until the token resolves.
    Suspended(ResumeToken),
}

/// State of the single in-flight render pass.
#[derive(Debug)]
pub(crate) struct WorkInProgress {
    pub(crate) selection: Selection,
    pub(crate) root_fiber: FiberId,
    /// Root children taken from a pending element update.
    pub(crate) applied_element: Option<Arc<[Element]>>,
    pub(crate) next: Option<FiberId>,
    /// Fibers allocated by this pass; freed if the pass is discarded or if
    /// they end up outside the committed tree.
    pub(crate) allocated: Vec<FiberId>,
    /// Pending updates merged into hook queues by this pass.
    pub(crate) consumed: HashSet<(HookAddr, UpdateId)>,
    pub(crate) store_reads: Vec<StoreRead>,
    pub(crate) caught: Vec<CaughtFault>,
    /// Suspense boundaries that switched to their fallback in this pass.
    pub(crate) suspended_boundaries: Vec<(canopy_core::InstanceId, ResumeToken)>,
    pub(crate) units: usize,
}

impl WorkInProgress {
    /// Returns true once the root fiber completed.
    #[inline]
    pub(crate) fn is_complete(&self) -> bool {
        self.next.is_none()
    }

    #[inline]
    pub(crate) fn lanes(&self) -> Lanes {
        self.selection.lanes
    }
}

impl Reconciler {
    /// Creates a fresh work-in-progress root for `selection`.
    pub(crate) fn prepare(&mut self, selection: Selection) -> Option<WorkInProgress> {
        let container = self.roots.get(&selection.root).filter(|root| root.is_active())?;
        let current = container.current?;
        let (children, from_update) = container.children_for(selection.lanes);

        let mut wip = WorkInProgress {
            selection,
            root_fiber: current,
            applied_element: from_update.then(|| Arc::clone(&children)),
            next: None,
            allocated: Vec::new(),
            consumed: HashSet::new(),
            store_reads: Vec::new(),
            caught: Vec::new(),
            suspended_boundaries: Vec::new(),
            units: 0,
        };
        let root_fiber = self.create_work_in_progress(&mut wip, current, FiberProps::Root(children));
        self.arena[root_fiber].parent = None;
        wip.root_fiber = root_fiber;
        wip.next = Some(root_fiber);
        Some(wip)
    }

    /// Performs one unit of work. Returns true once the tree is complete.
    ///
    /// # Errors
    ///
    /// A fault no boundary handled.
    pub(crate) fn perform_unit(&mut self, wip: &mut WorkInProgress) -> Result<bool, PassFault> {
        let Some(id) = wip.next else {
            return Ok(true);
        };
        wip.units += 1;
        match self.begin_work(wip, id) {
            Ok(Some(child)) => wip.next = Some(child),
            Ok(None) => self.complete_unit(wip, id),
            Err(fault) => self.throw(wip, id, fault)?,
        }
        Ok(wip.is_complete())
    }

    /// Frees everything a pass allocated. The current tree is untouched.
    pub(crate) fn discard(&mut self, wip: &mut WorkInProgress) {
        for id in wip.allocated.drain(..).rev() {
            self.release_fiber(id);
        }
        wip.next = None;
        tracing::debug!(
            root = %wip.selection.root,
            lane = %wip.selection.lane,
            units = wip.units,
            "discarded work-in-progress"
        );
    }

    /// Frees one fiber and unlinks it from its peer.
    pub(crate) fn release_fiber(&mut self, id: FiberId) {
        if let Some(fiber) = self.arena.free(id) {
            if let Some(peer) = fiber.alternate.and_then(|peer| self.arena.get_mut(peer)) {
                if peer.alternate == Some(id) {
                    peer.alternate = None;
                }
            }
        }
    }

    /// Work-in-progress copy of `current` with new pending props. Reuses the
    /// stale alternate when there is one.
    pub(crate) fn create_work_in_progress(
        &mut self,
        wip: &mut WorkInProgress,
        current: FiberId,
        props: FiberProps,
    ) -> FiberId {
        let mut next = self.arena[current].clone();
        next.pending_props = props;
        next.flags = FiberFlags::NONE;
        next.subtree_flags = FiberFlags::NONE;
        next.deletions.clear();
        next.sibling = None;
        next.phase = WorkPhase::Pending;
        next.alternate = Some(current);

        match self.alternate_of(current) {
            Some(stale) => {
                self.arena[stale] = next;
                stale
            }
            None => {
                let id = self.arena.allocate(next);
                self.arena[current].alternate = Some(id);
                wip.allocated.push(id);
                id
            }
        }
    }

    fn begin_work(&mut self, wip: &mut WorkInProgress, id: FiberId) -> Result<Option<FiberId>, Fault> {
        let current = self.alternate_of(id);
        self.arena[id].advance(WorkPhase::Rendering);

        if let Some(current) = current {
            let fiber = &self.arena[id];
            let unchanged = fiber.pending_props.identical(&self.arena[current].memoized_props)
                && !fiber.lanes.intersects(wip.lanes())
                && !self.boundary_switched(id);
            if unchanged {
                return Ok(self.bailout(wip, id));
            }
        }

        let children: Arc<[Element]> = match (&self.arena[id].tag, &self.arena[id].pending_props) {
            (FiberTag::Component, _) => return self.update_component(wip, id, current),
            (FiberTag::Root, FiberProps::Root(children)) => Arc::clone(children),
            (FiberTag::Host, FiberProps::Host { children, .. }) => Arc::clone(children),
            _ => return Ok(None),
        };
        Ok(self.reconcile_children(wip, id, &children, false))
    }

    /// Returns true if a boundary changed between primary content and
    /// fallback relative to the current tree.
    pub(crate) fn boundary_switched(&self, id: FiberId) -> bool {
        let Some(current) = self.alternate_of(id) else {
            return false;
        };
        std::mem::discriminant(&self.arena[id].boundary)
            != std::mem::discriminant(&self.arena[current].boundary)
    }

    fn update_component(
        &mut self,
        wip: &mut WorkInProgress,
        id: FiberId,
        current: Option<FiberId>,
    ) -> Result<Option<FiberId>, Fault> {
        let (component, props, instance) = {
            let fiber = &self.arena[id];
            let (Some(component), FiberProps::Component(props)) = (fiber.component(), &fiber.pending_props) else {
                return Ok(None);
            };
            (component.clone(), props.clone(), fiber.instance)
        };

        let mut force_remount = false;
        if component.capabilities().is_boundary() {
            if let BoundaryState::Suspended(token) = &self.arena[id].boundary {
                if token.is_resolved() {
                    self.arena[id].boundary = BoundaryState::Primary;
                }
            }
            force_remount = self.boundary_switched(id);
            let fault = match &self.arena[id].boundary {
                BoundaryState::Primary => None,
                BoundaryState::Failed(error) => Some(Fault::Error(error.clone())),
                BoundaryState::Suspended(token) => Some(Fault::Suspended(token.clone())),
            };
            if let Some(fault) = fault {
                let children = component.fallback(&fault);
                return Ok(self.reconcile_children(wip, id, &children, force_remount));
            }
        }

        let Some(container) = self.roots.get(&wip.selection.root) else {
            return Ok(None);
        };
        let mut slots = std::mem::take(&mut self.arena[id].hooks);
        let (output, outcome) = {
            let env = HookEnv {
                render_lanes: wip.selection.lanes,
                pending: &container.pending,
                consumed: &mut wip.consumed,
                store_reads: &mut wip.store_reads,
                inbox: &self.inbox,
            };
            let mut hooks = Hooks::new(component.name(), instance, &mut slots, current.is_none(), env);
            let output = component.render(&mut hooks, &props);
            if let Some((addr, _)) = hooks.discarded() {
                tracing::debug!(
                    component = component.name(),
                    slot = addr.slot,
                    "dropped failing state update"
                );
            }
            (output, hooks.finish())
        };
        self.arena[id].hooks = slots;

        let (output, outcome) = match (output, outcome) {
            (Err(error), _) | (Ok(_), Err(error)) => {
                return Err(Fault::Error(error.in_component(component.name())));
            }
            (Ok(output), Ok(outcome)) => (output, outcome),
        };
        let children = match output {
            Render::Ready(children) => children,
            Render::Suspended(token) => return Err(Fault::Suspended(token)),
        };

        let fiber = &mut self.arena[id];
        fiber.lanes = outcome.remaining;
        if outcome.passive {
            fiber.flags.insert(FiberFlags::PASSIVE);
        }
        if let Some(current) = current {
            let unchanged = !outcome.state_changed
                && !outcome.passive
                && !force_remount
                && self.arena[id]
                    .pending_props
                    .identical(&self.arena[current].memoized_props);
            if unchanged {
                return Ok(self.bailout(wip, id));
            }
        }
        Ok(self.reconcile_children(wip, id, &children, force_remount))
    }

    /// Skips a fiber whose inputs did not change. Its children are reused
    /// as they are, or cloned when some of them have pending work.
    fn bailout(&mut self, wip: &mut WorkInProgress, id: FiberId) -> Option<FiberId> {
        if !self.arena[id].child_lanes.intersects(wip.lanes()) {
            return None;
        }

        let current_children: Vec<FiberId> = match self.alternate_of(id) {
            Some(current) => self.arena.children(current).collect(),
            None => Vec::new(),
        };
        let mut first = None;
        let mut previous: Option<FiberId> = None;
        for child in current_children {
            let props = self.arena[child].memoized_props.clone();
            let next = self.create_work_in_progress(wip, child, props);
            self.arena[next].parent = Some(id);
            match previous {
                Some(previous) => self.arena[previous].sibling = Some(next),
                None => first = Some(next),
            }
            previous = Some(next);
        }
        self.arena[id].child = first;
        first
    }

    /// Completes `id` and walks up until a sibling is found.
    fn complete_unit(&mut self, wip: &mut WorkInProgress, id: FiberId) {
        let mut node = id;
        loop {
            self.complete(node);
            if node == wip.root_fiber {
                wip.next = None;
                return;
            }
            if let Some(sibling) = self.arena[node].sibling {
                wip.next = Some(sibling);
                return;
            }
            match self.arena[node].parent {
                Some(parent) => node = parent,
                None => {
                    wip.next = None;
                    return;
                }
            }
        }
    }

    fn complete(&mut self, id: FiberId) {
        let mut child_lanes = Lanes::EMPTY;
        let mut subtree_flags = FiberFlags::NONE;
        for child in self.arena.children(id) {
            let child = &self.arena[child];
            child_lanes |= child.lanes | child.child_lanes;
            subtree_flags |= child.flags | child.subtree_flags;
        }

        let host_changed = {
            let fiber = &self.arena[id];
            fiber.is_host_node()
                && fiber.host.is_some()
                && self
                    .alternate_of(id)
                    .is_some_and(|current| fiber.pending_props.host_differs(&self.arena[current].memoized_props))
        };

        let fiber = &mut self.arena[id];
        fiber.child_lanes = child_lanes;
        fiber.subtree_flags = subtree_flags;
        if host_changed {
            fiber.flags.insert(FiberFlags::UPDATE);
        }
        fiber.memoized_props = fiber.pending_props.clone();
        fiber.advance(WorkPhase::Completed);
    }
}
