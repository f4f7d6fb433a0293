//! # Fiber Arena
//!
//! Growable slot storage for fibers with a free list and per-slot
//! generations. Freed slots are reused; ids from before the reuse are
//! rejected by [`FiberArena::get`].

use super::{Fiber, FiberId};

struct Slot {
    generation: u32,
    fiber: Option<Fiber>,
}

/// Arena holding every fiber of every root.
///
/// Both buffers (current and work-in-progress) live in the same arena and
/// point at each other through [`Fiber::alternate`].
pub struct FiberArena {
    slots: Vec<Slot>,
    /// Indices of free slots, popped LIFO.
    free_list: Vec<u32>,
    live: usize,
}

impl FiberArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Creates an arena with room for `capacity` fibers before growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity / 4),
            live: 0,
        }
    }

    /// Number of live fibers.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no fiber is allocated.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Stores a fiber and returns its id. O(1) amortized.
    pub fn allocate(&mut self, fiber: Fiber) -> FiberId {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.fiber = Some(fiber);
            return FiberId::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            fiber: Some(fiber),
        });
        FiberId::new(index, 0)
    }

    /// Frees a fiber and bumps the slot generation.
    ///
    /// Returns the freed fiber, or `None` for a stale or unknown id.
    pub fn free(&mut self, id: FiberId) -> Option<Fiber> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let fiber = slot.fiber.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index());
        self.live -= 1;
        Some(fiber)
    }

    /// Returns true if `id` refers to a live fiber.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: FiberId) -> bool {
        self.get(id).is_some()
    }

    /// Looks up a fiber.
    #[inline]
    #[must_use]
    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.fiber.as_ref()
    }

    /// Looks up a fiber mutably.
    #[inline]
    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.fiber.as_mut()
    }

    /// Iterates the children of `parent` in sibling order.
    pub fn children(&self, parent: FiberId) -> Children<'_> {
        Children {
            arena: self,
            next: self.get(parent).and_then(|fiber| fiber.child),
        }
    }
}

impl Default for FiberArena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Index<FiberId> for FiberArena {
    type Output = Fiber;

    fn index(&self, id: FiberId) -> &Fiber {
        match self.get(id) {
            Some(fiber) => fiber,
            None => panic!("stale fiber id {id:?}"),
        }
    }
}

impl std::ops::IndexMut<FiberId> for FiberArena {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber {
        match self.get_mut(id) {
            Some(fiber) => fiber,
            None => panic!("stale fiber id {id:?}"),
        }
    }
}

/// Iterator over a fiber's children.
pub struct Children<'a> {
    arena: &'a FiberArena,
    next: Option<FiberId>,
}

impl Iterator for Children<'_> {
    type Item = FiberId;

    fn next(&mut self) -> Option<FiberId> {
        let id = self.next?;
        self.next = self.arena.get(id).and_then(|fiber| fiber.sibling);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::{FiberTag, InstanceId};

    fn text(instance: u64) -> Fiber {
        Fiber::text(InstanceId::new(instance), "x".into(), None)
    }

    #[test]
    fn test_allocate_free_reuse() {
        let mut arena = FiberArena::new();
        let a = arena.allocate(text(1));
        let b = arena.allocate(text(2));
        assert_eq!(arena.len(), 2);

        assert!(arena.free(a).is_some());
        assert!(!arena.contains(a));
        assert_eq!(arena.len(), 1);

        let c = arena.allocate(text(3));
        assert_eq!(c.index(), a.index());
        assert_ne!(c.generation(), a.generation());
        assert!(arena.get(a).is_none());
        assert_eq!(arena[c].instance, InstanceId::new(3));
        assert_eq!(arena[b].tag, FiberTag::Text);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut arena = FiberArena::new();
        let a = arena.allocate(text(1));
        assert!(arena.free(a).is_some());
        assert!(arena.free(a).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_children_iteration() {
        let mut arena = FiberArena::new();
        let parent = arena.allocate(text(1));
        let first = arena.allocate(text(2));
        let second = arena.allocate(text(3));
        arena[parent].child = Some(first);
        arena[first].sibling = Some(second);

        let children: Vec<_> = arena.children(parent).collect();
        assert_eq!(children, vec![first, second]);
    }
}
