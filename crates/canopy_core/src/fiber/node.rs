//! # Fibers
//!
//! One [`Fiber`] per component or host-node instance and buffer. The tree is
//! stored as first-child / next-sibling links into the [`super::FiberArena`]:
//!
//! ```text
//!   Root
//!    └─ child ──► App ── sibling ──► (none)
//!                  └─ child ──► row ── sibling ──► row
//!                                └─ child ──► "text"
//! ```
//!
//! `child` is the owning edge; `parent` and `alternate` are plain indices.

use std::sync::Arc;

use crate::element::{Component, Element, ElementKind, HostProps, HostType, Key, Props};
use crate::error::RenderError;
use crate::fiber::{FiberId, InstanceId};
use crate::hooks::HookSlot;
use crate::host::HostHandle;
use crate::lane::Lanes;
use crate::suspend::ResumeToken;

/// Kind of fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiberTag {
    /// Root of a mounted tree. Owns the host container.
    Root,
    /// Host element node.
    Host,
    /// Host text node.
    Text,
    /// Component instance.
    Component,
}

/// Type of the element a fiber was created from.
#[derive(Debug, Clone)]
pub enum ElementType {
    /// Root fiber.
    Root,
    /// Host element with a tag.
    Host(Arc<str>),
    /// Text node.
    Text,
    /// Component definition.
    Component(Component),
}

impl ElementType {
    /// Returns true if a fiber of type `self` can be updated in place from an
    /// element of type `other`.
    #[must_use]
    pub fn same_type(&self, other: &ElementType) -> bool {
        match (self, other) {
            (ElementType::Root, ElementType::Root) | (ElementType::Text, ElementType::Text) => true,
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Component(a), ElementType::Component(b)) => a.same(b),
            _ => false,
        }
    }

    /// Type of an element.
    #[must_use]
    pub fn of(element: &Element) -> Self {
        match &element.kind {
            ElementKind::Host { tag, .. } => ElementType::Host(Arc::clone(tag)),
            ElementKind::Text(_) => ElementType::Text,
            ElementKind::Component { component, .. } => ElementType::Component(component.clone()),
        }
    }

    /// Host node type, for host and text fibers.
    #[must_use]
    pub fn host_type(&self) -> Option<HostType> {
        match self {
            ElementType::Host(tag) => Some(HostType::Element(Arc::clone(tag))),
            ElementType::Text => Some(HostType::Text),
            _ => None,
        }
    }

    /// Human readable name, for logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ElementType::Root => "#root",
            ElementType::Host(tag) => tag,
            ElementType::Text => "#text",
            ElementType::Component(component) => component.name(),
        }
    }
}

/// Props as seen by a fiber.
#[derive(Debug, Clone)]
pub enum FiberProps {
    /// Children of a root.
    Root(Arc<[Element]>),
    /// Host attributes and children.
    Host {
        /// Attributes.
        props: Arc<HostProps>,
        /// Child descriptors.
        children: Arc<[Element]>,
    },
    /// Text content.
    Text(Arc<str>),
    /// Component props.
    Component(Props),
}

impl FiberProps {
    /// Props carried by an element.
    #[must_use]
    pub fn of(element: &Element) -> Self {
        match &element.kind {
            ElementKind::Host {
                props, children, ..
            } => FiberProps::Host {
                props: Arc::clone(props),
                children: Arc::clone(children),
            },
            ElementKind::Text(text) => FiberProps::Text(Arc::clone(text)),
            ElementKind::Component { props, .. } => FiberProps::Component(props.clone()),
        }
    }

    /// Identity comparison used for bailouts.
    #[must_use]
    pub fn identical(&self, other: &FiberProps) -> bool {
        match (self, other) {
            (FiberProps::Root(a), FiberProps::Root(b)) => Arc::ptr_eq(a, b),
            (
                FiberProps::Host {
                    props: pa,
                    children: ca,
                },
                FiberProps::Host {
                    props: pb,
                    children: cb,
                },
            ) => Arc::ptr_eq(pa, pb) && Arc::ptr_eq(ca, cb),
            (FiberProps::Text(a), FiberProps::Text(b)) => Arc::ptr_eq(a, b) || a == b,
            (FiberProps::Component(a), FiberProps::Component(b)) => a.same(b),
            _ => false,
        }
    }

    /// Host attributes as committed to the host adapter.
    #[must_use]
    pub fn host_props(&self) -> Option<HostProps> {
        match self {
            FiberProps::Host { props, .. } => Some(HostProps::clone(props)),
            FiberProps::Text(text) => Some(HostProps::text(text)),
            _ => None,
        }
    }

    /// Returns true if committing `self` over `previous` changes the host node.
    #[must_use]
    pub fn host_differs(&self, previous: &FiberProps) -> bool {
        match (self, previous) {
            (FiberProps::Host { props: a, .. }, FiberProps::Host { props: b, .. }) => {
                !Arc::ptr_eq(a, b) && a != b
            }
            (FiberProps::Text(a), FiberProps::Text(b)) => a != b,
            _ => false,
        }
    }
}

/// Side-effect flags set during render and consumed by commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FiberFlags(u8);

impl FiberFlags {
    /// No effects.
    pub const NONE: Self = Self(0);
    /// Host subtree must be inserted or moved.
    pub const PLACEMENT: Self = Self(1 << 0);
    /// Host attributes changed.
    pub const UPDATE: Self = Self(1 << 1);
    /// Effects or store subscriptions to run after commit.
    pub const PASSIVE: Self = Self(1 << 2);
    /// At least one child was deleted.
    pub const CHILD_DELETION: Self = Self(1 << 3);

    /// Returns true if every flag of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: FiberFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns true if no flag is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Sets flags.
    #[inline]
    pub fn insert(&mut self, other: FiberFlags) {
        self.0 |= other.0;
    }

    /// Clears flags.
    #[inline]
    pub fn remove(&mut self, other: FiberFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for FiberFlags {
    type Output = FiberFlags;

    fn bitor(self, rhs: FiberFlags) -> FiberFlags {
        FiberFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FiberFlags {
    fn bitor_assign(&mut self, rhs: FiberFlags) {
        self.0 |= rhs.0;
    }
}

/// Lifecycle phase of a fiber within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkPhase {
    /// Waiting to be rendered.
    Pending,
    /// Render function running or children being reconciled.
    Rendering,
    /// Render done, waiting for commit.
    Completed,
    /// Being applied to the host.
    Committing,
    /// Part of the current tree.
    Committed,
    /// Threw during render.
    Errored,
}

impl WorkPhase {
    /// Returns true if `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_advance_to(self, next: WorkPhase) -> bool {
        matches!(
            (self, next),
            (WorkPhase::Pending | WorkPhase::Committed, WorkPhase::Rendering)
                | (WorkPhase::Rendering, WorkPhase::Completed | WorkPhase::Pending | WorkPhase::Errored)
                | (WorkPhase::Completed, WorkPhase::Committing | WorkPhase::Pending)
                | (WorkPhase::Errored, WorkPhase::Pending)
                | (WorkPhase::Committing, WorkPhase::Committed)
                | (WorkPhase::Committed, WorkPhase::Pending)
        )
    }
}

/// State of a boundary fiber.
#[derive(Debug, Clone, Default)]
pub enum BoundaryState {
    /// Rendering the primary children.
    #[default]
    Primary,
    /// Showing the error fallback. Stays until the boundary is remounted.
    Failed(RenderError),
    /// Showing the suspense fallback until the token resolves.
    Suspended(ResumeToken),
}

impl BoundaryState {
    /// Returns true in [`BoundaryState::Primary`].
    #[inline]
    #[must_use]
    pub fn is_primary(&self) -> bool {
        matches!(self, BoundaryState::Primary)
    }
}

/// A unit of work: one instance in one buffer.
#[derive(Debug, Clone)]
pub struct Fiber {
    /// Kind of fiber.
    pub tag: FiberTag,
    /// Element type it was created from.
    pub element_type: ElementType,
    /// Key among siblings.
    pub key: Option<Key>,
    /// Position among siblings.
    pub index: u32,
    /// Props for the next render.
    pub pending_props: FiberProps,
    /// Props used by the last completed render.
    pub memoized_props: FiberProps,
    /// Hook slots, in call order.
    pub hooks: Vec<HookSlot>,
    /// Lanes with pending updates on this fiber.
    pub lanes: Lanes,
    /// Lanes with pending updates somewhere below.
    pub child_lanes: Lanes,
    /// Parent fiber (non-owning).
    pub parent: Option<FiberId>,
    /// First child (owning).
    pub child: Option<FiberId>,
    /// Next sibling.
    pub sibling: Option<FiberId>,
    /// Peer in the other buffer.
    pub alternate: Option<FiberId>,
    /// Own side effects.
    pub flags: FiberFlags,
    /// Union of the side effects below.
    pub subtree_flags: FiberFlags,
    /// Current-buffer children removed by this pass.
    pub deletions: Vec<FiberId>,
    /// Host node, for host and text fibers (and the root's container).
    pub host: Option<HostHandle>,
    /// Lifecycle phase.
    pub phase: WorkPhase,
    /// Logical instance shared by both buffers.
    pub instance: InstanceId,
    /// Boundary state, for boundary components.
    pub boundary: BoundaryState,
}

impl Fiber {
    fn blank(
        tag: FiberTag,
        element_type: ElementType,
        props: FiberProps,
        key: Option<Key>,
        instance: InstanceId,
    ) -> Self {
        Self {
            tag,
            element_type,
            key,
            index: 0,
            memoized_props: props.clone(),
            pending_props: props,
            hooks: Vec::new(),
            lanes: Lanes::EMPTY,
            child_lanes: Lanes::EMPTY,
            parent: None,
            child: None,
            sibling: None,
            alternate: None,
            flags: FiberFlags::NONE,
            subtree_flags: FiberFlags::NONE,
            deletions: Vec::new(),
            host: None,
            phase: WorkPhase::Pending,
            instance,
            boundary: BoundaryState::Primary,
        }
    }

    /// Root fiber for a container.
    #[must_use]
    pub fn root(instance: InstanceId, container: HostHandle, children: Arc<[Element]>) -> Self {
        let mut fiber = Self::blank(
            FiberTag::Root,
            ElementType::Root,
            FiberProps::Root(children),
            None,
            instance,
        );
        fiber.host = Some(container);
        fiber
    }

    /// Text fiber.
    #[must_use]
    pub fn text(instance: InstanceId, text: Arc<str>, key: Option<Key>) -> Self {
        Self::blank(
            FiberTag::Text,
            ElementType::Text,
            FiberProps::Text(text),
            key,
            instance,
        )
    }

    /// Fiber for a freshly mounted element.
    #[must_use]
    pub fn from_element(instance: InstanceId, element: &Element) -> Self {
        let tag = match &element.kind {
            ElementKind::Host { .. } => FiberTag::Host,
            ElementKind::Text(_) => FiberTag::Text,
            ElementKind::Component { .. } => FiberTag::Component,
        };
        Self::blank(
            tag,
            ElementType::of(element),
            FiberProps::of(element),
            element.key.clone(),
            instance,
        )
    }

    /// Component definition, for component fibers.
    #[must_use]
    pub fn component(&self) -> Option<&Component> {
        match &self.element_type {
            ElementType::Component(component) => Some(component),
            _ => None,
        }
    }

    /// Returns true for host and text fibers.
    #[inline]
    #[must_use]
    pub fn is_host_node(&self) -> bool {
        matches!(self.tag, FiberTag::Host | FiberTag::Text)
    }

    /// Moves the phase forward, logging illegal transitions in debug builds.
    pub fn advance(&mut self, next: WorkPhase) {
        debug_assert!(
            self.phase.can_advance_to(next) || self.phase == next,
            "illegal phase transition {:?} -> {:?} on {}",
            self.phase,
            next,
            self.element_type.name()
        );
        self.phase = next;
    }
}
