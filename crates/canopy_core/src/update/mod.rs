//! # State Updates
//!
//! - [`UpdateQueue`]: per-hook queue with lane-aware rebasing
//! - [`PendingUpdates`]: updates waiting for a render pass to consume them

mod pending;
mod queue;

pub use pending::PendingUpdates;
pub use queue::{Drained, Payload, QueueFault, StateValue, Update, UpdateId, UpdateQueue, Updater};
