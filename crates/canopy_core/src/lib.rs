//! # Canopy Core
//!
//! Data model of the Canopy rendering runtime:
//! - Priority lanes and lane sets
//! - Per-hook update queues with lane-aware rebasing
//! - The hook runtime handed to render functions
//! - The double-buffered fiber tree and its generational arena
//! - Element descriptors, the host adapter and external store interfaces
//!
//! ## Architecture Rules
//!
//! 1. **Render is pure** - no host node is created or mutated while rendering
//! 2. **Handles are thread-safe** - setters, stores and resume tokens only
//!    post to the runtime's inbox
//! 3. **Identity over equality** - props, state and snapshots are compared
//!    by reference
//!
//! The scheduler, reconciler and runtime API live in the `canopy` crate.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod element;
pub mod error;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod inbox;
pub mod lane;
pub mod store;
pub mod suspend;
pub mod update;

pub use element::{
    Capabilities, Component, Element, ElementKind, Fault, HostProps, HostType, Key, PropValue,
    Props, RenderOutput,
};
pub use error::{HostError, RenderError, RenderResult, UpdateError};
pub use fiber::{FiberArena, FiberId, InstanceId, RootId};
pub use hooks::{cleanup, Deps, Dispatch, HookAddr, Hooks, RefHandle, Setter};
pub use host::{HostAdapter, HostHandle};
pub use inbox::{Inbox, InboxReceiver, Signal};
pub use lane::{Lane, Lanes};
pub use store::{ExternalStore, StoreListener, Unsubscribe};
pub use suspend::{Render, ResumeTarget, ResumeToken};
pub use update::{Payload, Update, UpdateQueue};
