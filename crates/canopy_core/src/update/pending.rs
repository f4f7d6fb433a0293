//! Updates drained from the inbox but not yet committed.
//!
//! A render pass reads these without removing them; they are acknowledged
//! only when the pass that consumed them commits. A discarded pass therefore
//! loses nothing.

use std::collections::{HashMap, HashSet};

use crate::fiber::InstanceId;
use crate::hooks::HookAddr;
use crate::lane::Lanes;
use crate::update::{Update, UpdateId};

/// Per-hook pending updates of one root.
#[derive(Debug, Default)]
pub struct PendingUpdates {
    by_hook: HashMap<HookAddr, Vec<Update>>,
}

impl PendingUpdates {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an update for a hook.
    pub fn push(&mut self, addr: HookAddr, update: Update) {
        self.by_hook.entry(addr).or_default().push(update);
    }

    /// Pending updates of a hook, in enqueue order.
    #[must_use]
    pub fn get(&self, addr: HookAddr) -> &[Update] {
        self.by_hook
            .get(&addr)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Removes an update once its pass committed (or its updater failed).
    pub fn remove(&mut self, addr: HookAddr, id: UpdateId) {
        if let Some(updates) = self.by_hook.get_mut(&addr) {
            updates.retain(|update| update.id != id);
            if updates.is_empty() {
                self.by_hook.remove(&addr);
            }
        }
    }

    /// Removes every update a committed pass merged, in one sweep.
    pub fn acknowledge(&mut self, consumed: &HashSet<(HookAddr, UpdateId)>) {
        if consumed.is_empty() {
            return;
        }
        self.by_hook.retain(|addr, updates| {
            updates.retain(|update| !consumed.contains(&(*addr, update.id)));
            !updates.is_empty()
        });
    }

    /// Drops every update of an unmounted instance. Returns how many were
    /// dropped.
    pub fn remove_instance(&mut self, instance: InstanceId) -> usize {
        let mut dropped = 0;
        self.by_hook.retain(|addr, updates| {
            if addr.instance == instance {
                dropped += updates.len();
                false
            } else {
                true
            }
        });
        dropped
    }

    /// Lanes of every pending update of `instance`.
    #[must_use]
    pub fn lanes_for(&self, instance: InstanceId) -> Lanes {
        self.by_hook
            .iter()
            .filter(|(addr, _)| addr.instance == instance)
            .flat_map(|(_, updates)| updates.iter())
            .fold(Lanes::EMPTY, |lanes, update| lanes | Lanes::single(update.lane))
    }

    /// Returns true if `instance` has pending updates.
    #[must_use]
    pub fn has_instance(&self, instance: InstanceId) -> bool {
        self.by_hook.keys().any(|addr| addr.instance == instance)
    }

    /// Total number of pending updates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_hook.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_hook.is_empty()
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.by_hook.clear();
    }
}
