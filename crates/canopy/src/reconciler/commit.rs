//! Commit phase: applies a completed work-in-progress tree to the host,
//! swaps the buffers and runs effects.
//!
//! Never interrupted. A host error aborts the commit and the caller tears
//! the root down.

use std::sync::Arc;

use canopy_core::fiber::{FiberFlags, FiberTag, WorkPhase};
use canopy_core::hooks::{Cleanup, CleanupCell, EffectCreate, HookSlot};
use canopy_core::store::{same_value, ErasedStore, StoreListener};
use canopy_core::update::StateValue;
use canopy_core::{
    FiberId, HostAdapter, HostError, HostHandle, InstanceId, ResumeTarget, RootId, Unsubscribe,
};
use parking_lot::Mutex;

use super::{CommitReport, InstanceEntry, Patch, Reconciler, WorkInProgress};

/// Resources of unmounted fibers, released after the tree swap.
#[derive(Default)]
struct Teardown {
    cleanups: Vec<Cleanup>,
    instances: Vec<InstanceId>,
    fibers: Vec<FiberId>,
}

/// A store subscription to (re)establish after commit.
struct Subscribe {
    instance: InstanceId,
    store: Arc<dyn ErasedStore>,
    snapshot: StateValue,
    subscription: Arc<Mutex<Option<Unsubscribe>>>,
}

/// Passive work collected from committed fibers.
#[derive(Default)]
struct Passive {
    cleanups: Vec<Cleanup>,
    creates: Vec<(EffectCreate, CleanupCell)>,
    subscribes: Vec<Subscribe>,
}

impl Reconciler {
    /// Commits a completed pass.
    ///
    /// # Errors
    ///
    /// The first host adapter failure. The host may be partially mutated;
    /// the caller must discard `wip` and tear the root down.
    pub(crate) fn commit(
        &mut self,
        wip: &mut WorkInProgress,
        host: &mut dyn HostAdapter,
    ) -> Result<CommitReport, HostError> {
        let root = wip.selection.root;
        let mut report = CommitReport::new(root, wip.selection.lanes);
        report.units = wip.units;

        let mut teardown = Teardown::default();
        let mut passive_fibers = Vec::new();
        self.commit_mutations(wip.root_fiber, host, &mut report, &mut teardown, &mut passive_fibers)?;

        // Swap buffers.
        if let Some(container) = self.roots.get_mut(&root) {
            container.current = Some(wip.root_fiber);
        }
        self.finalize(root, wip.root_fiber);

        for id in wip.allocated.drain(..) {
            if self.arena.get(id).is_some_and(|fiber| fiber.phase != WorkPhase::Committed) {
                self.release_fiber(id);
            }
        }
        self.release(root, &teardown);

        wip.caught.retain(|caught| self.instances.contains_key(&caught.boundary));
        for (instance, token) in wip.suspended_boundaries.drain(..) {
            if self.instances.contains_key(&instance) {
                token.watch(&self.inbox, ResumeTarget::Boundary(instance));
            }
        }
        report.caught = std::mem::take(&mut wip.caught);

        let (fiber_lanes, fiber_child_lanes) = {
            let fiber = &self.arena[wip.root_fiber];
            (fiber.lanes, fiber.child_lanes)
        };
        if let Some(container) = self.roots.get_mut(&root) {
            container.pending.acknowledge(&wip.consumed);
            wip.consumed.clear();
            if let Some(children) = wip.applied_element.take() {
                let applied = container
                    .pending_element
                    .as_ref()
                    .is_some_and(|update| Arc::ptr_eq(&update.children, &children));
                if applied {
                    container.pending_element = None;
                }
                container.element = children;
            }
            let rendered = wip.selection.lanes;
            container.lanes.pending = container.lanes.pending.without(rendered) | fiber_lanes | fiber_child_lanes;
            if let Some(update) = &container.pending_element {
                container.lanes.pending.insert(update.lane);
            }
            container.lanes.expired = container.lanes.expired.without(rendered);
            container.tearing_retries = 0;
        }

        // Unmount cleanups first, then the passive effects of the new tree.
        let passive = self.collect_passive(&passive_fibers);
        for cleanup in teardown.cleanups.into_iter().chain(passive.cleanups) {
            cleanup();
            report.cleanups_run += 1;
        }
        for (create, cell) in passive.creates {
            *cell.lock() = create();
            report.effects_run += 1;
        }
        for subscribe in passive.subscribes {
            let inbox = self.inbox.clone();
            let instance = subscribe.instance;
            let listener: StoreListener = Arc::new(move || {
                inbox.store_changed(instance);
            });
            *subscribe.subscription.lock() = Some(subscribe.store.subscribe_erased(listener));
            report.effects_run += 1;
            // Changed between render and subscription.
            if !same_value(&subscribe.store.snapshot_erased(), &subscribe.snapshot) {
                self.inbox.store_changed(instance);
            }
        }

        tracing::debug!(
            %root,
            lanes = ?report.lanes,
            patches = report.patches.len(),
            effects = report.effects_run,
            cleanups = report.cleanups_run,
            "committed"
        );
        Ok(report)
    }

    /// Unmounts every fiber of a root. When `host` is given, the root's host
    /// nodes are removed from the container first. Returns the number of
    /// cleanups run.
    pub(crate) fn teardown_root(&mut self, root: RootId, host: Option<&mut dyn HostAdapter>) -> usize {
        let Some((current, container)) = self
            .roots
            .get_mut(&root)
            .and_then(|container| Some((container.current.take()?, container.container)))
        else {
            return 0;
        };

        if let Some(host) = host {
            let mut nodes = Vec::new();
            for child in self.arena.children(current) {
                self.host_nodes(child, &mut nodes);
            }
            for node in nodes {
                if let Err(error) = host.remove_child(container, node) {
                    tracing::warn!(%root, %error, "failed to detach host node during teardown");
                }
            }
        }

        let mut teardown = Teardown::default();
        self.collect_teardown(current, &mut teardown);
        self.release(root, &teardown);

        let mut cleanups_run = 0;
        for cleanup in teardown.cleanups {
            cleanup();
            cleanups_run += 1;
        }

        if let Some(container) = self.roots.get_mut(&root) {
            container.pending.clear();
            container.pending_element = None;
            container.lanes = crate::scheduler::RootLanes::default();
            container.element = Arc::from(Vec::new());
        }
        tracing::debug!(%root, cleanups_run, "root torn down");
        cleanups_run
    }

    fn commit_mutations(
        &mut self,
        id: FiberId,
        host: &mut dyn HostAdapter,
        report: &mut CommitReport,
        teardown: &mut Teardown,
        passive: &mut Vec<FiberId>,
    ) -> Result<(), HostError> {
        let deletions = std::mem::take(&mut self.arena[id].deletions);
        if !deletions.is_empty() {
            let parent = self.host_parent(id, true)?;
            for deleted in deletions {
                let mut nodes = Vec::new();
                self.host_nodes(deleted, &mut nodes);
                for node in nodes {
                    host.remove_child(parent, node)?;
                }
                let fiber = &self.arena[deleted];
                report.patches.push(Patch::Delete {
                    instance: fiber.instance,
                    name: fiber.element_type.name().to_owned(),
                });
                self.collect_teardown(deleted, teardown);
            }
        }

        let mut child = self.arena[id].child;
        while let Some(current) = child {
            let fiber = &self.arena[current];
            if !fiber.flags.is_empty() || !fiber.subtree_flags.is_empty() || !fiber.deletions.is_empty() {
                self.commit_mutations(current, host, report, teardown, passive)?;
            }
            child = self.arena[current].sibling;
        }

        let flags = self.arena[id].flags;
        if flags.contains(FiberFlags::PLACEMENT) {
            self.commit_placement(id, host, report)?;
        }
        if flags.contains(FiberFlags::UPDATE) {
            self.commit_update(id, host, report)?;
        }
        if flags.contains(FiberFlags::PASSIVE) {
            passive.push(id);
        }
        Ok(())
    }

    fn commit_placement(
        &mut self,
        id: FiberId,
        host: &mut dyn HostAdapter,
        report: &mut CommitReport,
    ) -> Result<(), HostError> {
        let parent = self.host_parent(id, false)?;
        let before = self.host_sibling(id);
        let moved = self.alternate_of(id).is_some();

        let mut nodes = Vec::new();
        self.instantiate(id, host, &mut nodes)?;
        for node in nodes {
            match before {
                Some(before) => host.insert_before(parent, node, before)?,
                None => host.append_child(parent, node)?,
            }
        }

        let fiber = &mut self.arena[id];
        fiber.flags.remove(FiberFlags::PLACEMENT);
        let instance = fiber.instance;
        let name = fiber.element_type.name().to_owned();
        report.patches.push(if moved {
            Patch::Move { instance, name }
        } else {
            Patch::Insert { instance, name }
        });
        Ok(())
    }

    fn commit_update(
        &mut self,
        id: FiberId,
        host: &mut dyn HostAdapter,
        report: &mut CommitReport,
    ) -> Result<(), HostError> {
        let fiber = &self.arena[id];
        let previous = self
            .alternate_of(id)
            .and_then(|current| self.arena[current].memoized_props.host_props());
        if let (Some(node), Some(previous), Some(next)) = (fiber.host, previous, fiber.memoized_props.host_props()) {
            host.commit_prop_update(node, &previous, &next)?;
            report.patches.push(Patch::Update {
                instance: fiber.instance,
                name: fiber.element_type.name().to_owned(),
            });
        }
        self.arena[id].flags.remove(FiberFlags::UPDATE);
        Ok(())
    }

    /// Creates host nodes for every fiber under `id` that has none yet, and
    /// collects the top-level host nodes of the subtree.
    fn instantiate(
        &mut self,
        id: FiberId,
        host: &mut dyn HostAdapter,
        out: &mut Vec<HostHandle>,
    ) -> Result<(), HostError> {
        let children: Vec<FiberId> = self.arena.children(id).collect();
        if !self.arena[id].is_host_node() {
            for child in children {
                self.instantiate(child, host, out)?;
            }
            return Ok(());
        }

        if let Some(node) = self.arena[id].host {
            out.push(node);
            return Ok(());
        }

        let fiber = &self.arena[id];
        let (Some(kind), Some(props)) = (fiber.element_type.host_type(), fiber.memoized_props.host_props()) else {
            return Err(HostError::new(
                "create_instance",
                format!("{} has no host representation", fiber.element_type.name()),
            ));
        };
        let node = host.create_instance(&kind, &props)?;
        self.arena[id].host = Some(node);

        let mut nested = Vec::new();
        for child in children {
            self.instantiate(child, host, &mut nested)?;
        }
        for child_node in nested {
            host.append_child(node, child_node)?;
        }
        out.push(node);
        Ok(())
    }

    /// Closest host node of an ancestor (or of `id` itself when `inclusive`).
    fn host_parent(&self, id: FiberId, inclusive: bool) -> Result<HostHandle, HostError> {
        let mut cursor = if inclusive { Some(id) } else { self.arena[id].parent };
        while let Some(current) = cursor {
            let fiber = &self.arena[current];
            if is_host_parent(fiber.tag) {
                return fiber
                    .host
                    .ok_or_else(|| HostError::new("host_parent", "parent host node missing"));
            }
            cursor = fiber.parent;
        }
        Err(HostError::new("host_parent", "fiber is not attached to a root"))
    }

    /// Host node that `id`'s nodes must be inserted before, if any.
    ///
    /// Skips siblings that are themselves being placed; their final position
    /// is not known yet.
    fn host_sibling(&self, id: FiberId) -> Option<HostHandle> {
        let mut node = id;
        'siblings: loop {
            while self.arena[node].sibling.is_none() {
                let parent = self.arena[node].parent?;
                if is_host_parent(self.arena[parent].tag) {
                    return None;
                }
                node = parent;
            }
            node = self.arena[node].sibling?;

            while !self.arena[node].is_host_node() {
                let fiber = &self.arena[node];
                if fiber.flags.contains(FiberFlags::PLACEMENT) {
                    continue 'siblings;
                }
                match fiber.child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }

            let fiber = &self.arena[node];
            if !fiber.flags.contains(FiberFlags::PLACEMENT) {
                if let Some(handle) = fiber.host {
                    return Some(handle);
                }
            }
        }
    }

    /// Top-level host nodes of a subtree.
    fn host_nodes(&self, id: FiberId, out: &mut Vec<HostHandle>) {
        let Some(fiber) = self.arena.get(id) else {
            return;
        };
        if fiber.is_host_node() {
            out.extend(fiber.host);
            return;
        }
        for child in self.arena.children(id) {
            self.host_nodes(child, out);
        }
    }

    /// Marks the committed tree as current.
    fn finalize(&mut self, root: RootId, id: FiberId) {
        let Some(fiber) = self.arena.get_mut(id) else {
            return;
        };
        if fiber.phase != WorkPhase::Completed {
            return;
        }
        fiber.advance(WorkPhase::Committing);
        fiber.advance(WorkPhase::Committed);
        fiber.flags = FiberFlags::NONE;
        fiber.subtree_flags = FiberFlags::NONE;
        fiber.deletions.clear();
        let (instance, lanes, child_lanes) = (fiber.instance, fiber.lanes, fiber.child_lanes);
        self.instances.insert(instance, InstanceEntry { root, fiber: id });

        if let Some(previous) = self.alternate_of(id).and_then(|previous| self.arena.get_mut(previous)) {
            previous.lanes = lanes;
            previous.child_lanes = child_lanes;
        }

        let children: Vec<FiberId> = self.arena.children(id).collect();
        for child in children {
            self.arena[child].parent = Some(id);
            self.finalize(root, child);
        }
    }

    /// Post-order walk of a subtree being unmounted.
    fn collect_teardown(&self, id: FiberId, teardown: &mut Teardown) {
        for child in self.arena.children(id) {
            self.collect_teardown(child, teardown);
        }
        let Some(fiber) = self.arena.get(id) else {
            return;
        };
        for slot in &fiber.hooks {
            match slot {
                HookSlot::Effect(effect) => teardown.cleanups.extend(effect.cleanup.lock().take()),
                HookSlot::Store(store) => teardown.cleanups.extend(store.subscription.lock().take()),
                _ => {}
            }
        }
        teardown.instances.push(fiber.instance);
        teardown.fibers.push(id);
    }

    fn release(&mut self, root: RootId, teardown: &Teardown) {
        for instance in &teardown.instances {
            self.instances.remove(instance);
        }
        if let Some(container) = self.roots.get_mut(&root) {
            for instance in &teardown.instances {
                container.pending.remove_instance(*instance);
            }
        }
        for id in &teardown.fibers {
            if let Some(alternate) = self.alternate_of(*id) {
                self.arena.free(alternate);
            }
            self.arena.free(*id);
        }
    }

    /// Collects effect and subscription work of committed fibers, children
    /// before parents.
    fn collect_passive(&mut self, fibers: &[FiberId]) -> Passive {
        let mut passive = Passive::default();
        for id in fibers {
            let Some(fiber) = self.arena.get_mut(*id) else {
                continue;
            };
            let instance = fiber.instance;
            for slot in &mut fiber.hooks {
                match slot {
                    HookSlot::Effect(effect) => {
                        if let Some(create) = effect.pending.take() {
                            passive.cleanups.extend(effect.cleanup.lock().take());
                            passive.creates.push((create, Arc::clone(&effect.cleanup)));
                        }
                    }
                    HookSlot::Store(store) if store.resubscribe => {
                        store.resubscribe = false;
                        passive.cleanups.extend(store.subscription.lock().take());
                        passive.subscribes.push(Subscribe {
                            instance,
                            store: Arc::clone(&store.store),
                            snapshot: Arc::clone(&store.snapshot),
                            subscription: Arc::clone(&store.subscription),
                        });
                    }
                    _ => {}
                }
            }
        }
        passive
    }
}

fn is_host_parent(tag: FiberTag) -> bool {
    matches!(tag, FiberTag::Root | FiberTag::Host)
}
