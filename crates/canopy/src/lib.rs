//! # Canopy
//!
//! Concurrent, interruptible UI rendering runtime:
//! - Lane scheduler with time slicing, preemption and starvation escalation
//! - Fiber reconciler: interruptible render phase, synchronous commit phase
//! - Error and suspense boundaries
//! - External store bridge with tearing detection
//!
//! ## Architecture Rules
//!
//! 1. **One pass in flight** - a single work-in-progress tree, discarded
//!    whole when preempted
//! 2. **Host calls in commit only** - render never touches the host adapter
//! 3. **Inbox at event boundaries** - setters and stores never touch the
//!    tree; their signals are drained between units of work
//!
//! ## Example
//!
//! ```rust,ignore
//! use canopy::{Runtime, RuntimeConfig};
//! use canopy_host::MemoryHost;
//!
//! let mut host = MemoryHost::new();
//! let container = host.create_container();
//! let mut runtime = Runtime::new(host, RuntimeConfig::default())?;
//! let handle = runtime.mount(Element::component(&app, ()), container)?;
//! runtime.run_until_idle()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod scheduler;

mod reconciler;
mod runtime;

pub use bridge::SharedStore;
pub use config::{RuntimeConfig, SchedulerConfig, DEFAULT_TIME_SLICE};
pub use error::{ConfigError, RuntimeError, RuntimeResult};
pub use reconciler::{CaughtFault, CaughtKind, CommitReport, Patch, RootHandle, RootStatus};
pub use runtime::{Runtime, RuntimeStats, TickOutcome};
pub use scheduler::{Clock, ManualClock, Scheduler, Selection, SystemClock};

pub use canopy_core::{
    cleanup, Capabilities, Component, Deps, Element, ExternalStore, Fault, HookAddr, Hooks,
    HostAdapter, HostHandle, HostProps, Lane, Lanes, Payload, PropValue, Props, Render,
    RenderError, RenderOutput, ResumeToken, RootId, Setter, UpdateError,
};
