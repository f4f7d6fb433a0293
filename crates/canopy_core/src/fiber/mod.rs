//! # Fiber Tree
//!
//! Persistent, double-buffered tree of work units:
//! - [`FiberArena`]: generational slot storage
//! - [`Fiber`]: one instance in one buffer
//! - ids: [`FiberId`], [`InstanceId`], [`RootId`]

mod arena;
mod id;
mod node;

pub use arena::{Children, FiberArena};
pub use id::{FiberId, InstanceId, RootId};
pub use node::{BoundaryState, ElementType, Fiber, FiberFlags, FiberProps, FiberTag, WorkPhase};
