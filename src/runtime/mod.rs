//! A minimal single-threaded host for stores.
//!
//! This module provides what a UI framework would otherwise supply: a
//! cooperative task queue ([`Runtime`]), component instances ([`Mount`]),
//! and per-mount hooks for local state and effects ([`MountContext`]).
//! State changes are queued and applied on the runtime's next
//! [`flush`](Runtime::flush), never inline.

mod mount;
mod runtime;

pub use mount::{Cleanup, Mount, MountContext, MountId, StateSetter};
pub use runtime::Runtime;
