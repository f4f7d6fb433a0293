//! # Canopy In-Memory Host
//!
//! A [`canopy_core::HostAdapter`] that keeps host nodes in a map:
//! - Operation log of every adapter call ([`HostOp`])
//! - Fault injection on the Nth call of a given kind ([`OpKind`])
//! - Debug serializer ([`MemoryHost::render_to_string`])
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut host = MemoryHost::new();
//! let container = host.create_container();
//! let mut runtime = Runtime::new(host, RuntimeConfig::default())?;
//! let root = runtime.mount(app, container)?;
//! assert_eq!(runtime.host().render_to_string(container), "<app>0</app>");
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

mod fault;
mod tree;

pub use fault::OpKind;
pub use tree::{HostNode, HostOp, MemoryHost, NodeKind};
