use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::action::{Actions, BoundActions};
use super::update::Updater;
use crate::config::{SeedPolicy, StoreConfig};
use crate::error::Result;
use crate::relay::{PublishReport, Relay, Subscription};
use crate::runtime::{Cleanup, MountContext, StateSetter};

/// Observer notified of every published value.
pub type Listener<T> = Rc<dyn Fn(&T)>;

/// What [`Store::use_store`] hands back to a render: the mount's value, its
/// raw setter, and the store's actions bound to that setter.
pub type UseStore<T, A> = (T, StateSetter<T>, BoundActions<T, A>);

struct StoreInner<T, A> {
    initial: T,
    latest: RefCell<T>,
    relay: Relay<T>,
    actions: Actions<T, A>,
    listeners: Vec<Listener<T>>,
    config: StoreConfig,
}

/// A shared store.
///
/// Cloning is cheap and every clone refers to the same relay and value.
///
/// # Examples
///
/// ```
/// use tandem::runtime::{Mount, Runtime};
/// use tandem::Store;
///
/// Runtime::scope(|| {
///     let runtime = Runtime::current();
///     let store = Store::builder(0)
///         .action("increment", |n: &i32, ()| n + 1)
///         .build();
///
///     let a = Mount::new({
///         let store = store.clone();
///         move || store.use_store()
///     });
///     let b = Mount::new({
///         let store = store.clone();
///         move || store.use_store()
///     });
///     runtime.flush().unwrap();
///
///     a.with_output(|(_, _, actions)| actions.dispatch("increment", ()))
///         .unwrap()
///         .unwrap();
///     runtime.flush().unwrap();
///
///     assert_eq!(b.with_output(|(value, _, _)| *value), Some(1));
/// });
/// ```
pub struct Store<T, A = ()> {
    inner: Rc<StoreInner<T, A>>,
}

/// Create a store from an initial value, its actions and its listeners.
pub fn create_store<T, A>(
    initial: T,
    actions: Actions<T, A>,
    listeners: Vec<Listener<T>>,
) -> Store<T, A>
where
    T: Clone + PartialEq + 'static,
    A: 'static,
{
    Store::with_config(initial, actions, listeners, StoreConfig::default())
}

impl<T, A> Store<T, A>
where
    T: Clone + PartialEq + 'static,
    A: 'static,
{
    /// Start building a store.
    pub fn builder(initial: T) -> StoreBuilder<T, A> {
        StoreBuilder {
            initial,
            actions: Actions::new(),
            listeners: Vec::new(),
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(
        initial: T,
        actions: Actions<T, A>,
        listeners: Vec<Listener<T>>,
        config: StoreConfig,
    ) -> Self {
        tracing::debug!(
            actions = actions.len(),
            listeners = listeners.len(),
            seed = ?config.seed,
            "store created"
        );
        Self {
            inner: Rc::new(StoreInner {
                latest: RefCell::new(initial.clone()),
                initial,
                relay: Relay::new(),
                actions,
                listeners,
                config,
            }),
        }
    }

    /// The most recently published value.
    pub fn get(&self) -> T {
        self.inner.latest.borrow().clone()
    }

    /// The value the store was created with.
    pub fn initial(&self) -> &T {
        &self.inner.initial
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Number of entries in the store's relay, mount and external
    /// registrations alike.
    ///
    /// The relay itself is not exposed: values must go through
    /// [`publish`](Self::publish) so that [`get`](Self::get) and
    /// deduplication stay current.
    pub fn subscriber_count(&self) -> usize {
        self.inner.relay.len()
    }

    pub fn actions(&self) -> &Actions<T, A> {
        &self.inner.actions
    }

    /// The value a newly mounted consumer starts from.
    pub fn seed(&self) -> T {
        match self.inner.config.seed {
            SeedPolicy::Latest => self.get(),
            SeedPolicy::Initial => self.inner.initial.clone(),
        }
    }

    /// Broadcast `value` to every subscriber.
    ///
    /// Returns `None` without notifying anyone when deduplication is on and
    /// `value` equals the last published value.
    pub fn publish(&self, value: &T) -> Option<PublishReport> {
        {
            let mut latest = self.inner.latest.borrow_mut();
            if self.inner.config.dedupe_publishes && *latest == *value {
                tracing::trace!("publish skipped, value unchanged");
                return None;
            }
            *latest = value.clone();
        }
        Some(self.inner.relay.publish(value))
    }

    /// Register an observer that is not tied to any mount.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        self.inner.relay.subscribe(callback)
    }

    /// Wire one mount to the relay.
    ///
    /// `on_change` is the mount's local update hook. Configured listeners
    /// are registered with set semantics: each listener has at most one
    /// relay entry no matter how many mounts are connected, and the first
    /// connection holding it to be dropped removes it, even while other
    /// mounts remain.
    pub fn connect<F>(&self, on_change: F) -> Connection
    where
        F: Fn(&T) + 'static,
    {
        let mut subscriptions = Vec::with_capacity(1 + self.inner.listeners.len());
        subscriptions.push(self.inner.relay.subscribe(on_change));
        for listener in &self.inner.listeners {
            subscriptions.push(self.inner.relay.subscribe_shared(Rc::clone(listener)));
        }
        tracing::trace!(subscriptions = subscriptions.len(), "mount connected");
        Connection { subscriptions }
    }

    /// Bind the store's actions to a local-state setter.
    pub fn bind(&self, updater: Rc<dyn Updater<T>>) -> BoundActions<T, A> {
        self.inner.actions.bind(updater)
    }

    /// Accessor for use inside a [`Mount`](crate::runtime::Mount) render.
    ///
    /// On the first render the mount is seeded and connected to the relay;
    /// the connection is torn down when the mount unmounts. Whenever the
    /// mount's value changes it is published to every other mount.
    ///
    /// Fails with [`Error::NoActiveMount`](crate::Error::NoActiveMount)
    /// outside a render.
    pub fn use_store(&self) -> Result<UseStore<T, A>> {
        let cx = MountContext::current()?;
        let (value, setter) = cx.use_state(|| self.seed())?;

        let store = self.clone();
        let local = setter.clone();
        cx.use_effect((), move || {
            let connection = store.connect(move |value: &T| local.set(value.clone()));
            Some(Box::new(move || connection.disconnect()) as Cleanup)
        })?;

        let store = self.clone();
        let changed = value.clone();
        cx.use_effect(value.clone(), move || {
            store.publish(&changed);
            None
        })?;

        let actions = self.bind(Rc::new(setter.clone()));
        Ok((value, setter, actions))
    }
}

impl<T, A> Clone for Store<T, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug, A> fmt::Debug for Store<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("latest", &*self.inner.latest.borrow())
            .field("actions", &self.inner.actions)
            .field("listeners", &self.inner.listeners.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder returned by [`Store::builder`].
pub struct StoreBuilder<T, A = ()> {
    initial: T,
    actions: Actions<T, A>,
    listeners: Vec<Listener<T>>,
    config: StoreConfig,
}

impl<T, A> StoreBuilder<T, A>
where
    T: Clone + PartialEq + 'static,
    A: 'static,
{
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&T, A) -> T + 'static,
    {
        self.actions = self.actions.with(name, action);
        self
    }

    pub fn listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&T) + 'static,
    {
        self.listeners.push(Rc::new(listener));
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Store<T, A> {
        Store::with_config(self.initial, self.actions, self.listeners, self.config)
    }
}

/// The relay registrations owned by one mount.
#[must_use = "dropping a Connection disconnects the mount immediately"]
pub struct Connection {
    subscriptions: Vec<Subscription>,
}

impl Connection {
    /// Remove every registration now.
    pub fn disconnect(self) {
        tracing::trace!(subscriptions = self.subscriptions.len(), "mount disconnected");
        drop(self);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.subscriptions).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_listener(count: &Rc<Cell<usize>>) -> impl Fn(&i32) + 'static {
        let count = count.clone();
        move |_| count.set(count.get() + 1)
    }

    #[test]
    fn publish_updates_latest_and_dedupes() {
        let store: Store<i32> = Store::builder(0).build();
        let hits = Rc::new(Cell::new(0));
        let _sub = store.subscribe(counting_listener(&hits));

        assert!(store.publish(&0).is_none());
        assert_eq!(hits.get(), 0);

        assert_eq!(store.publish(&4).map(|r| r.delivered), Some(1));
        assert!(store.publish(&4).is_none());
        assert_eq!(store.get(), 4);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dedupe_can_be_disabled() {
        let store: Store<i32> = Store::builder(0)
            .config(StoreConfig::default().with_dedupe_publishes(false))
            .build();
        let hits = Rc::new(Cell::new(0));
        let _sub = store.subscribe(counting_listener(&hits));

        store.publish(&0);
        store.publish(&0);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn seed_follows_policy() {
        let latest: Store<i32> = Store::builder(1).build();
        latest.publish(&9);
        assert_eq!(latest.seed(), 9);

        let initial: Store<i32> = Store::builder(1)
            .config(StoreConfig::default().with_seed(SeedPolicy::Initial))
            .build();
        initial.publish(&9);
        assert_eq!(initial.seed(), 1);
        assert_eq!(*initial.initial(), 1);
    }

    #[test]
    fn connection_owns_listener_registrations() {
        let hits = Rc::new(Cell::new(0));
        let store: Store<i32> = Store::builder(0)
            .listener(counting_listener(&hits))
            .build();

        let seen = Rc::new(Cell::new(0));
        let connection = store.connect({
            let seen = seen.clone();
            move |v| seen.set(*v)
        });
        assert_eq!(connection.len(), 2);
        assert_eq!(store.subscriber_count(), 2);

        store.publish(&3);
        assert_eq!(seen.get(), 3);
        assert_eq!(hits.get(), 1);

        connection.disconnect();
        assert_eq!(store.subscriber_count(), 0);
        store.publish(&5);
        assert_eq!(seen.get(), 3);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn listener_is_registered_once_across_connections() {
        let hits = Rc::new(Cell::new(0));
        let store: Store<i32> = Store::builder(0)
            .listener(counting_listener(&hits))
            .build();

        let first = store.connect(|_| {});
        let second = store.connect(|_| {});
        let third = store.connect(|_| {});
        assert_eq!(store.subscriber_count(), 4);

        store.publish(&7);
        assert_eq!(hits.get(), 1);

        drop(first);
        store.publish(&8);
        assert_eq!(hits.get(), 1);
        assert_eq!(store.subscriber_count(), 2);

        drop(second);
        drop(third);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn create_store_takes_actions_and_listeners() {
        let hits = Rc::new(Cell::new(0));
        let listener: Listener<i32> = Rc::new(counting_listener(&hits));
        let store = create_store(
            0,
            Actions::new().with("double", |n: &i32, ()| n * 2),
            vec![listener],
        );

        assert_eq!(store.actions().names().collect::<Vec<_>>(), ["double"]);
        let _connection = store.connect(|_| {});
        store.publish(&1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn use_store_outside_mount_is_rejected() {
        let store: Store<i32> = Store::builder(0).build();
        assert_eq!(
            store.use_store().map(|_| ()),
            Err(crate::Error::NoActiveMount)
        );
    }
}
