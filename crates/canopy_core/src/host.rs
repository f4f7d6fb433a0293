//! # Host Adapter
//!
//! The only surface through which the runtime touches the platform. Every
//! call happens during commit; render never creates or mutates host nodes.

use crate::element::{HostProps, HostType};
use crate::error::HostError;

/// Opaque handle to a host node, allocated by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(u64);

impl HostHandle {
    /// Creates a handle from the adapter's raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Platform binding used by the commit phase.
///
/// Implementations decide what a host node is (a DOM node, a terminal cell
/// range, an in-memory record). Any error aborts the commit in progress.
pub trait HostAdapter {
    /// Creates a detached node.
    ///
    /// # Errors
    ///
    /// Adapter-specific failure.
    fn create_instance(&mut self, kind: &HostType, props: &HostProps) -> Result<HostHandle, HostError>;

    /// Appends `child` as the last child of `parent`, detaching it from any
    /// previous position first.
    ///
    /// # Errors
    ///
    /// Adapter-specific failure.
    fn append_child(&mut self, parent: HostHandle, child: HostHandle) -> Result<(), HostError>;

    /// Inserts `child` into `parent` right before `before`, detaching it
    /// from any previous position first.
    ///
    /// # Errors
    ///
    /// Adapter-specific failure, or `before` is not a child of `parent`.
    fn insert_before(
        &mut self,
        parent: HostHandle,
        child: HostHandle,
        before: HostHandle,
    ) -> Result<(), HostError>;

    /// Removes `child` (and its host subtree) from `parent`.
    ///
    /// # Errors
    ///
    /// Adapter-specific failure.
    fn remove_child(&mut self, parent: HostHandle, child: HostHandle) -> Result<(), HostError>;

    /// Applies new attributes to an existing node.
    ///
    /// # Errors
    ///
    /// Adapter-specific failure.
    fn commit_prop_update(
        &mut self,
        instance: HostHandle,
        prev_props: &HostProps,
        next_props: &HostProps,
    ) -> Result<(), HostError>;
}
