use std::fmt;

/// A change to a mount's local value: a literal replacement or a transform
/// of the previous value.
pub enum Update<T> {
    Replace(T),
    Apply(Box<dyn FnOnce(&T) -> T>),
}

impl<T> Update<T> {
    /// Wrap a transform of the previous value.
    pub fn apply<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> T + 'static,
    {
        Update::Apply(Box::new(f))
    }

    /// Resolve against the previous value.
    pub fn resolve(self, previous: &T) -> T {
        match self {
            Update::Replace(value) => value,
            Update::Apply(f) => f(previous),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Update::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

/// The local-state setter a host hands to a mount.
///
/// Implementations may apply the update later (on the host's next
/// scheduling pass), but must apply queued updates in call order, each
/// against the value left by the one before.
pub trait Updater<T> {
    fn apply(&self, update: Update<T>);

    /// Replace the value.
    fn set(&self, value: T) {
        self.apply(Update::Replace(value));
    }

    /// Transform the previous value.
    fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T + 'static,
        Self: Sized,
    {
        self.apply(Update::apply(f));
    }
}
