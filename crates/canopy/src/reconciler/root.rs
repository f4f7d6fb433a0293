//! Mounted roots.

use std::sync::Arc;

use canopy_core::update::PendingUpdates;
use canopy_core::{Element, FiberId, HostHandle, Lane, Lanes, RootId};

use crate::scheduler::RootLanes;

/// Lifecycle of a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootStatus {
    /// Mounted and accepting work.
    Active,
    /// Torn down after an uncaught error or a failed commit.
    Crashed,
    /// Torn down by `unmount`.
    Unmounted,
}

/// Handle returned by `mount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootHandle {
    /// Root id.
    pub root: RootId,
    /// Host container the root renders into.
    pub container: HostHandle,
}

/// A root element render waiting for its lane.
#[derive(Debug, Clone)]
pub(crate) struct ElementUpdate {
    pub(crate) lane: Lane,
    pub(crate) children: Arc<[Element]>,
}

/// Everything the runtime tracks for one root.
#[derive(Debug)]
pub(crate) struct RootContainer {
    pub(crate) container: HostHandle,
    /// Root fiber of the current tree; `None` once torn down.
    pub(crate) current: Option<FiberId>,
    /// Committed root children.
    pub(crate) element: Arc<[Element]>,
    pub(crate) pending_element: Option<ElementUpdate>,
    pub(crate) lanes: RootLanes,
    pub(crate) pending: PendingUpdates,
    pub(crate) status: RootStatus,
    /// Consecutive tearing restarts of the current pass.
    pub(crate) tearing_retries: u32,
}

impl RootContainer {
    pub(crate) fn new(container: HostHandle, current: FiberId) -> Self {
        Self {
            container,
            current: Some(current),
            element: Arc::from(Vec::new()),
            pending_element: None,
            lanes: RootLanes::default(),
            pending: PendingUpdates::new(),
            status: RootStatus::Active,
            tearing_retries: 0,
        }
    }

    /// Root children a pass over `lanes` renders, and whether they come from
    /// a pending element update.
    pub(crate) fn children_for(&self, lanes: Lanes) -> (Arc<[Element]>, bool) {
        match &self.pending_element {
            Some(update) if lanes.contains(update.lane) => (Arc::clone(&update.children), true),
            _ => (Arc::clone(&self.element), false),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.status == RootStatus::Active
    }

    /// Marks a lane as having work.
    pub(crate) fn schedule(&mut self, lane: Lane) {
        self.lanes.pending.insert(lane);
        self.lanes.suspended.remove(lane);
    }
}
