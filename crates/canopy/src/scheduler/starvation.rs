//! Per-root, per-lane preemption counters.

use std::collections::HashMap;

use canopy_core::{Lane, Lanes, RootId};

/// Counts how often each lane of each root lost its work-in-progress.
#[derive(Debug)]
pub struct StarvationTracker {
    limit: u32,
    counts: HashMap<(RootId, Lane), u32>,
}

impl StarvationTracker {
    /// Creates a tracker that expires a lane after `limit` preemptions.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            counts: HashMap::new(),
        }
    }

    /// Records a preemption. Returns true when the lane just reached the
    /// limit and must be expired.
    pub fn record_preemption(&mut self, root: RootId, lane: Lane) -> bool {
        let count = self.counts.entry((root, lane)).or_insert(0);
        *count += 1;
        *count == self.limit
    }

    /// Preemptions recorded for a lane since it last committed.
    #[must_use]
    pub fn count(&self, root: RootId, lane: Lane) -> u32 {
        self.counts.get(&(root, lane)).copied().unwrap_or(0)
    }

    /// Clears the counters of lanes that committed.
    pub fn reset(&mut self, root: RootId, lanes: Lanes) {
        self.counts
            .retain(|(counted_root, lane), _| *counted_root != root || !lanes.contains(*lane));
    }

    /// Forgets an unmounted root.
    pub fn forget(&mut self, root: RootId) {
        self.counts.retain(|(counted_root, _), _| *counted_root != root);
    }
}
