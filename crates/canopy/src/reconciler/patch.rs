//! What a commit did.

use canopy_core::{InstanceId, Lanes, RenderError, RootId};

/// One host-visible change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// A new subtree was created and inserted.
    Insert {
        /// Inserted instance.
        instance: InstanceId,
        /// Element type name.
        name: String,
    },
    /// An existing subtree changed position among its siblings.
    Move {
        /// Moved instance.
        instance: InstanceId,
        /// Element type name.
        name: String,
    },
    /// Host attributes or text changed.
    Update {
        /// Updated instance.
        instance: InstanceId,
        /// Element type name.
        name: String,
    },
    /// A subtree was removed.
    Delete {
        /// Removed instance.
        instance: InstanceId,
        /// Element type name.
        name: String,
    },
}

impl Patch {
    /// Instance the patch applies to.
    #[must_use]
    pub fn instance(&self) -> InstanceId {
        match self {
            Patch::Insert { instance, .. }
            | Patch::Move { instance, .. }
            | Patch::Update { instance, .. }
            | Patch::Delete { instance, .. } => *instance,
        }
    }

    /// Element type name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Patch::Insert { name, .. }
            | Patch::Move { name, .. }
            | Patch::Update { name, .. }
            | Patch::Delete { name, .. } => name,
        }
    }
}

/// What a boundary caught.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaughtKind {
    /// A render error; the fallback stays until the boundary is remounted.
    Error(RenderError),
    /// A suspension; the boundary retries when its token resolves.
    Suspended,
}

/// A fault handled by a boundary during the committed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaughtFault {
    /// Boundary instance.
    pub boundary: InstanceId,
    /// Boundary component name.
    pub boundary_name: String,
    /// What it caught.
    pub kind: CaughtKind,
}

/// Summary of one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    /// Committed root.
    pub root: RootId,
    /// Lanes the pass rendered.
    pub lanes: Lanes,
    /// Host changes in commit order.
    pub patches: Vec<Patch>,
    /// Effect bodies (and store subscriptions) run.
    pub effects_run: usize,
    /// Effect cleanups (and store unsubscriptions) run.
    pub cleanups_run: usize,
    /// Faults handled by boundaries.
    pub caught: Vec<CaughtFault>,
    /// Units of work the pass performed.
    pub units: usize,
}

impl CommitReport {
    pub(crate) fn new(root: RootId, lanes: Lanes) -> Self {
        Self {
            root,
            lanes,
            patches: Vec::new(),
            effects_run: 0,
            cleanups_run: 0,
            caught: Vec::new(),
            units: 0,
        }
    }

    /// Number of patches of each kind: `(inserts, moves, updates, deletes)`.
    #[must_use]
    pub fn patch_counts(&self) -> (usize, usize, usize, usize) {
        self.patches.iter().fold((0, 0, 0, 0), |(i, m, u, d), patch| match patch {
            Patch::Insert { .. } => (i + 1, m, u, d),
            Patch::Move { .. } => (i, m + 1, u, d),
            Patch::Update { .. } => (i, m, u + 1, d),
            Patch::Delete { .. } => (i, m, u, d + 1),
        })
    }
}
