//! # Tandem
//!
//! Shared state for component-based UIs: one logical value, many mounted
//! consumers, all kept in sync.
//!
//! ## Relay (low level)
//!
//! - [`Relay<T>`] - publish/subscribe hub keyed by issued subscription ids
//! - [`Subscription`] - RAII handle that unsubscribes on drop
//!
//! ## Store (high level)
//!
//! - [`Store<T, A>`] - initial value, named pure actions and listeners over
//!   one relay
//! - [`Store::use_store`] - per-mount accessor returning the mount's value,
//!   its raw setter and the store's actions bound to that setter
//!
//! ## Runtime (host)
//!
//! - [`Runtime`] - cooperative single-threaded scheduler
//! - [`Mount`] - a component instance with `use_state` / `use_effect` hooks
//!
//! ```
//! use tandem::{Mount, Runtime, Store};
//!
//! Runtime::scope(|| {
//!     let runtime = Runtime::current();
//!     let store = Store::builder(0)
//!         .action("increment", |n: &i32, ()| n + 1)
//!         .action("reset", |_: &i32, ()| 0)
//!         .build();
//!
//!     let a = Mount::new({
//!         let store = store.clone();
//!         move || store.use_store()
//!     });
//!     let b = Mount::new({
//!         let store = store.clone();
//!         move || store.use_store()
//!     });
//!     runtime.flush()?;
//!
//!     let (_, _, actions) = a.output().unwrap();
//!     actions.dispatch("increment", ())?;
//!     actions.dispatch("increment", ())?;
//!     runtime.flush()?;
//!
//!     assert_eq!(a.with_output(|(value, _, _)| *value), Some(2));
//!     assert_eq!(b.with_output(|(value, _, _)| *value), Some(2));
//!     Ok::<_, tandem::Error>(())
//! })?;
//! # Ok::<_, tandem::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod relay;
pub mod runtime;
pub mod store;

// Re-export main types for convenience
pub use config::{RuntimeConfig, SeedPolicy, StoreConfig};
pub use error::{Error, Result};
pub use relay::{PublishReport, Relay, Subscription, SubscriptionId};
pub use runtime::{Cleanup, Mount, MountContext, MountId, Runtime, StateSetter};
pub use store::{
    create_store, Actions, BoundAction, BoundActions, Connection, Listener, Store, Update, Updater,
    UseStore,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        // Basic smoke test
        let relay = Relay::new();
        let seen = std::rc::Rc::new(std::cell::Cell::new(0));
        let _sub = relay.subscribe({
            let seen = seen.clone();
            move |v: &i32| seen.set(*v)
        });
        relay.publish(&42);
        assert_eq!(seen.get(), 42);
    }
}
