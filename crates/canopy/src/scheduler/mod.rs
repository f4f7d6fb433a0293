//! # Lane Scheduler
//!
//! Decides which root renders next, at which lanes, and for how long:
//!
//! ```text
//!   pending lanes ─► minus suspended ─► expired? ── yes ─► sync, top priority
//!                                           │
//!                                           no ─► most urgent lane
//!                                                 sync if in sync_lanes,
//!                                                 else time-sliced
//! ```
//!
//! Roots are served by lane priority; ties go to the root that has been
//! waiting longest.

mod clock;
mod starvation;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use canopy_core::{Lane, Lanes, RootId};

use crate::config::SchedulerConfig;

pub use clock::{Clock, ManualClock, SystemClock};
pub use starvation::StarvationTracker;

/// Lane bookkeeping of one root, as seen by the scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RootLanes {
    /// Lanes with pending work.
    pub pending: Lanes,
    /// Lanes waiting for a resume token.
    pub suspended: Lanes,
    /// Lanes that starved and must render synchronously.
    pub expired: Lanes,
}

impl RootLanes {
    /// Most urgent renderable lane, and whether it is expired.
    #[must_use]
    pub fn next_lane(&self) -> Option<(Lane, bool)> {
        let available = self.pending.without(self.suspended);
        let expired = available.intersection(self.expired);
        if let Some(lane) = expired.lowest_priority() {
            return Some((lane, true));
        }
        available.highest_priority().map(|lane| (lane, false))
    }
}

/// What to render next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Root to render.
    pub root: RootId,
    /// Selected lane.
    pub lane: Lane,
    /// Lanes processed by the pass (every lane at or above `lane`).
    pub lanes: Lanes,
    /// Render to completion without yielding.
    pub sync: bool,
    /// The lane starved.
    pub expired: bool,
}

impl Selection {
    /// Returns true if `self` must interrupt a pass of `other`.
    #[must_use]
    pub fn preempts(&self, other: &Selection) -> bool {
        if self.expired != other.expired {
            return self.expired;
        }
        self.lane.outranks(other.lane)
    }
}

/// Time and unit budget of one slice.
#[derive(Debug, Clone, Copy)]
pub struct SliceBudget {
    started: Duration,
    slice: Duration,
    max_units: Option<u32>,
    units: u32,
}

impl SliceBudget {
    /// Counts one unit of work.
    #[inline]
    pub fn spend_unit(&mut self) {
        self.units = self.units.saturating_add(1);
    }

    /// Units performed in this slice.
    #[inline]
    #[must_use]
    pub const fn units(&self) -> u32 {
        self.units
    }

    /// Returns true once the slice is used up.
    #[must_use]
    pub fn exhausted(&self, clock: &dyn Clock) -> bool {
        if self.max_units.is_some_and(|max| self.units >= max) {
            return true;
        }
        clock.now().saturating_sub(self.started) >= self.slice
    }
}

/// One scheduler per runtime.
pub struct Scheduler {
    config: SchedulerConfig,
    sync_lanes: Lanes,
    clock: Arc<dyn Clock>,
    queue: VecDeque<RootId>,
    starvation: StarvationTracker,
}

impl Scheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sync_lanes: config.sync_lane_set(),
            starvation: StarvationTracker::new(config.starvation_limit),
            config,
            clock,
            queue: VecDeque::new(),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Time source.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Registers a root with pending work. Keeps its place if already queued.
    pub fn enqueue(&mut self, root: RootId) {
        if !self.queue.contains(&root) {
            self.queue.push_back(root);
        }
    }

    /// Moves a root behind every other root at the same priority.
    pub fn requeue(&mut self, root: RootId) {
        self.queue.retain(|queued| *queued != root);
        self.queue.push_back(root);
    }

    /// Drops a root from the queue and forgets its counters.
    pub fn remove(&mut self, root: RootId) {
        self.queue.retain(|queued| *queued != root);
        self.starvation.forget(root);
    }

    /// Roots currently queued, in service order.
    pub fn queued(&self) -> impl Iterator<Item = RootId> + '_ {
        self.queue.iter().copied()
    }

    /// Picks the next pass among queued roots. Roots without renderable
    /// lanes are skipped (and stay queued while they have pending lanes).
    pub fn select(&self, lanes_of: impl Fn(RootId) -> Option<RootLanes>) -> Option<Selection> {
        let mut best: Option<Selection> = None;
        for root in self.queue.iter().copied() {
            let Some((lane, expired)) = lanes_of(root).and_then(|lanes| lanes.next_lane()) else {
                continue;
            };
            let candidate = self.selection(root, lane, expired);
            if best.map_or(true, |current| candidate.preempts(&current)) {
                best = Some(candidate);
            }
        }
        best
    }

    /// Builds a selection for a known root and lane.
    #[must_use]
    pub fn selection(&self, root: RootId, lane: Lane, expired: bool) -> Selection {
        Selection {
            root,
            lane,
            lanes: Lanes::at_or_above(lane),
            sync: expired || self.sync_lanes.contains(lane),
            expired,
        }
    }

    /// Drops roots that no longer have pending work.
    pub fn prune(&mut self, lanes_of: impl Fn(RootId) -> Option<RootLanes>) {
        self.queue
            .retain(|root| lanes_of(*root).is_some_and(|lanes| !lanes.pending.is_empty()));
    }

    /// Starts a new slice.
    #[must_use]
    pub fn begin_slice(&self) -> SliceBudget {
        SliceBudget {
            started: self.clock.now(),
            slice: self.config.time_slice(),
            max_units: self.config.max_units_per_slice,
            units: 0,
        }
    }

    /// Returns true once `budget` is used up.
    #[must_use]
    pub fn should_yield(&self, budget: &SliceBudget) -> bool {
        budget.exhausted(self.clock.as_ref())
    }

    /// Records that a pass at `lane` lost its work-in-progress. Returns true
    /// if the lane just expired.
    pub fn record_preemption(&mut self, root: RootId, lane: Lane) -> bool {
        let expired = self.starvation.record_preemption(root, lane);
        if expired {
            tracing::warn!(%root, %lane, "lane starved; rendering it synchronously");
        }
        expired
    }

    /// Clears the counters of committed lanes.
    pub fn committed(&mut self, root: RootId, lanes: Lanes) {
        self.starvation.reset(root, lanes);
    }

    /// Preemptions recorded for a lane since it last committed.
    #[must_use]
    pub fn preemptions(&self, root: RootId, lane: Lane) -> u32 {
        self.starvation.count(root, lane)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
