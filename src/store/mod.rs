//! Shared stores: one logical value kept in sync across every mount.
//!
//! A [`Store`] owns a [`Relay`](crate::relay::Relay) and the actions it was
//! created with. Each mount that calls [`Store::use_store`] gets its own
//! local copy of the value, subscribes that copy to the relay, and
//! republishes whenever its copy changes, so all mounts converge within one
//! scheduling pass.

mod action;
mod store;
mod update;

pub use action::{ActionFn, Actions, BoundAction, BoundActions};
pub use store::{create_store, Connection, Listener, Store, StoreBuilder, UseStore};
pub use update::{Update, Updater};
