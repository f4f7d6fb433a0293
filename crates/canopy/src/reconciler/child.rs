//! Child reconciliation: matches new element lists against current fibers.

use std::collections::{HashMap, HashSet};

use canopy_core::fiber::{ElementType, Fiber, FiberFlags, FiberProps};
use canopy_core::{Element, FiberId, Key};

use super::{Reconciler, WorkInProgress};

/// Old children of a parent, indexed for matching.
#[derive(Default)]
struct OldChildren {
    keyed: HashMap<Key, FiberId>,
    positional: HashMap<u32, FiberId>,
    order: Vec<FiberId>,
}

impl OldChildren {
    fn take(&mut self, element: &Element, position: u32) -> Option<FiberId> {
        match &element.key {
            Some(key) => self.keyed.remove(key),
            None => self.positional.remove(&position),
        }
    }
}

impl Reconciler {
    /// Reconciles `elements` as the new children of the work-in-progress
    /// fiber `parent`. Returns the first child.
    ///
    /// Keyed elements match the old child with the same key; unkeyed ones
    /// match the unkeyed old child at the same position. A match of the same
    /// type is updated in place and moved if it now precedes a child that
    /// was already placed. With `force`, nothing matches and every old child
    /// is deleted.
    pub(crate) fn reconcile_children(
        &mut self,
        wip: &mut WorkInProgress,
        parent: FiberId,
        elements: &[Element],
        force: bool,
    ) -> Option<FiberId> {
        let current_parent = self.alternate_of(parent);
        let tracking = current_parent.is_some();
        let mut old = self.old_children(current_parent, force);
        let mut reused = HashSet::new();

        let mut first = None;
        let mut previous: Option<FiberId> = None;
        let mut last_placed = 0_u32;

        for (position, element) in (0_u32..).zip(elements.iter()) {
            let matched = old.take(element, position).filter(|candidate| {
                self.arena[*candidate]
                    .element_type
                    .same_type(&ElementType::of(element))
            });

            let child = match matched {
                Some(current) => {
                    reused.insert(current);
                    let old_index = self.arena[current].index;
                    let child = self.create_work_in_progress(wip, current, FiberProps::of(element));
                    if old_index < last_placed {
                        self.arena[child].flags.insert(FiberFlags::PLACEMENT);
                    } else {
                        last_placed = old_index;
                    }
                    child
                }
                None => {
                    let instance = self.allocate_instance();
                    let mut fiber = Fiber::from_element(instance, element);
                    if tracking {
                        fiber.flags.insert(FiberFlags::PLACEMENT);
                    }
                    let child = self.arena.allocate(fiber);
                    wip.allocated.push(child);
                    child
                }
            };

            let fiber = &mut self.arena[child];
            fiber.index = position;
            fiber.parent = Some(parent);
            fiber.key = element.key.clone();
            fiber.sibling = None;
            match previous {
                Some(previous) => self.arena[previous].sibling = Some(child),
                None => first = Some(child),
            }
            previous = Some(child);
        }

        // Unmatched old children, and matches whose type changed.
        let leftovers: Vec<FiberId> = old
            .order
            .iter()
            .copied()
            .filter(|id| !reused.contains(id))
            .collect();
        if !leftovers.is_empty() {
            let fiber = &mut self.arena[parent];
            fiber.deletions.extend(leftovers);
            fiber.flags.insert(FiberFlags::CHILD_DELETION);
        }

        self.arena[parent].child = first;
        first
    }

    fn old_children(&self, current_parent: Option<FiberId>, force: bool) -> OldChildren {
        let mut old = OldChildren::default();
        let Some(current_parent) = current_parent else {
            return old;
        };
        for id in self.arena.children(current_parent) {
            old.order.push(id);
            if force {
                continue;
            }
            let fiber = &self.arena[id];
            match &fiber.key {
                Some(key) => {
                    old.keyed.insert(key.clone(), id);
                }
                None => {
                    old.positional.insert(fiber.index, id);
                }
            }
        }
        old
    }
}
