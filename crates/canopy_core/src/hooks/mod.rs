//! # Hook Runtime
//!
//! Ordered slot storage scoped to one component instance. The render
//! function receives a [`Hooks`] context; each hook call claims the next
//! slot.
//!
//! ```rust,ignore
//! let counter = Component::new("Counter", |hooks, _props| {
//!     let (count, set_count) = hooks.use_state(|| 0_i64)?;
//!     hooks.use_effect(deps![*count], move || {
//!         println!("count is now {}", *count);
//!         None
//!     })?;
//!     Ok(Render::Ready(vec![Element::text(count.to_string())]))
//! });
//! ```

mod context;
mod setter;
mod slot;

pub use context::{cleanup, HookEnv, HookOutcome, Hooks};
pub use setter::{Dispatch, RefHandle, Setter};
pub use slot::{
    Cleanup, CleanupCell, Dep, Deps, EffectCreate, EffectSlot, HookAddr, HookKind, HookSlot,
    StateSlot, StoreSlot,
};
