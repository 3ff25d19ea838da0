use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// A subscriber callback.
pub type Callback<T> = Rc<dyn Fn(&T)>;

/// Handle identifying one entry in a relay's subscriber table.
///
/// Ids are issued in increasing order and never reused by the same relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Outcome of a single [`Relay::publish`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that returned normally.
    pub delivered: usize,
    /// Subscribers that panicked.
    pub failed: usize,
    /// Subscribers removed by an earlier callback of the same pass.
    pub skipped: usize,
}

struct RelayInner<T> {
    next_id: u64,
    subscribers: BTreeMap<SubscriptionId, Callback<T>>,
}

trait Detach {
    fn detach(&self, id: SubscriptionId) -> bool;
}

impl<T> Detach for RefCell<RelayInner<T>> {
    fn detach(&self, id: SubscriptionId) -> bool {
        let removed = self.borrow_mut().subscribers.remove(&id).is_some();
        if removed {
            tracing::trace!(subscription = %id, "unsubscribed");
        }
        removed
    }
}

/// Single-threaded fan-out of values to subscriber callbacks.
///
/// Cloning a relay yields another handle to the same subscriber table.
///
/// # Delivery
///
/// `publish` delivers to a snapshot of the table taken when the pass starts:
///
/// - a subscriber added during a pass is not called until the next pass;
/// - a subscriber removed during a pass is skipped if it has not been
///   reached yet;
/// - a subscriber that panics is logged and counted, and the remaining
///   subscribers still receive the value.
///
/// Delivery order is not part of the contract.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use tandem::relay::Relay;
///
/// let relay = Relay::new();
/// let seen = Rc::new(Cell::new(0));
/// let sub = relay.subscribe({
///     let seen = seen.clone();
///     move |v: &i32| seen.set(*v)
/// });
///
/// relay.publish(&7);
/// assert_eq!(seen.get(), 7);
///
/// sub.unsubscribe();
/// relay.publish(&9);
/// assert_eq!(seen.get(), 7);
/// ```
pub struct Relay<T> {
    inner: Rc<RefCell<RelayInner<T>>>,
}

impl<T: 'static> Relay<T> {
    /// Create a relay with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RelayInner {
                next_id: 0,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    /// Register a new subscriber.
    ///
    /// Every call creates a distinct entry, even for behaviorally identical
    /// closures.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        self.insert(Rc::new(callback))
    }

    /// Register a shared callback with set semantics.
    ///
    /// If the same `Rc` is already subscribed, no new entry is created and
    /// the returned handle refers to the existing one.
    pub fn subscribe_shared(&self, callback: Callback<T>) -> Subscription {
        let existing = self
            .inner
            .borrow()
            .subscribers
            .iter()
            .find(|&(_, cb)| std::ptr::addr_eq(Rc::as_ptr(cb), Rc::as_ptr(&callback)))
            .map(|(id, _)| *id);

        match existing {
            Some(id) => {
                tracing::trace!(subscription = %id, "callback already subscribed");
                self.handle(id)
            }
            None => self.insert(callback),
        }
    }

    /// Remove the entry for `id`. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.detach(id)
    }

    /// Deliver `value` to every current subscriber.
    pub fn publish(&self, value: &T) -> PublishReport {
        let snapshot: Vec<(SubscriptionId, Callback<T>)> = self
            .inner
            .borrow()
            .subscribers
            .iter()
            .map(|(id, cb)| (*id, Rc::clone(cb)))
            .collect();

        let mut report = PublishReport::default();
        for (id, callback) in snapshot {
            if !self.contains(id) {
                report.skipped += 1;
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.failed += 1;
                    tracing::error!(
                        subscription = %id,
                        panic = %panic_message(payload.as_ref()),
                        "subscriber panicked during publish"
                    );
                }
            }
        }

        tracing::debug!(
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "published"
        );
        report
    }

    /// Whether `id` is currently subscribed.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.inner.borrow().subscribers.contains_key(&id)
    }

    /// Number of current subscribers.
    pub fn len(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, callback: Callback<T>) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = SubscriptionId(inner.next_id);
            inner.next_id += 1;
            inner.subscribers.insert(id, callback);
            id
        };
        tracing::trace!(subscription = %id, "subscribed");
        self.handle(id)
    }

    fn handle(&self, id: SubscriptionId) -> Subscription {
        let inner: Rc<dyn Detach> = self.inner.clone();
        Subscription {
            id,
            relay: Rc::downgrade(&inner),
        }
    }
}

impl<T: 'static> Default for Relay<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Relay<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Relay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("subscribers", &self.inner.borrow().subscribers.len())
            .finish()
    }
}

/// RAII handle for a relay subscription.
///
/// Dropping the handle, or calling [`unsubscribe`](Self::unsubscribe),
/// removes the entry. Both are no-ops once the entry is gone or the relay
/// has been dropped.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    id: SubscriptionId,
    relay: Weak<dyn Detach>,
}

impl Subscription {
    /// Id of the entry this handle removes.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the entry now.
    pub fn unsubscribe(&self) {
        if let Some(relay) = self.relay.upgrade() {
            relay.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.id).finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
