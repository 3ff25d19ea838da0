use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::update::{Update, Updater};
use crate::error::{Error, Result};

/// A pure state transition: `(current, args) -> next`.
pub type ActionFn<T, A> = Rc<dyn Fn(&T, A) -> T>;

/// Named set of actions supplied when a store is created.
///
/// `A` is the argument type every action of the store accepts; use a tuple
/// or an enum when actions need several arguments, and `()` for none.
pub struct Actions<T, A = ()> {
    map: BTreeMap<String, ActionFn<T, A>>,
}

impl<T: 'static, A: 'static> Actions<T, A> {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Add an action. A later entry with the same name replaces the earlier.
    pub fn with<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&T, A) -> T + 'static,
    {
        self.map.insert(name.into(), Rc::new(action));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ActionFn<T, A>> {
        self.map.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bind every action to `updater`.
    pub fn bind(&self, updater: Rc<dyn Updater<T>>) -> BoundActions<T, A> {
        let bound = self
            .map
            .iter()
            .map(|(name, action)| {
                (
                    name.clone(),
                    BoundAction {
                        name: Rc::from(name.as_str()),
                        action: Rc::clone(action),
                        updater: Rc::clone(&updater),
                    },
                )
            })
            .collect();
        BoundActions {
            bound: Rc::new(bound),
        }
    }
}

impl<T: 'static, A: 'static> Default for Actions<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> fmt::Debug for Actions<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

/// An action tied to one mount's local state.
pub struct BoundAction<T, A> {
    name: Rc<str>,
    action: ActionFn<T, A>,
    updater: Rc<dyn Updater<T>>,
}

impl<T: 'static, A: 'static> BoundAction<T, A> {
    /// Apply the action to the mount's latest value.
    ///
    /// The previous value is read when the update is applied, not when the
    /// action was bound, so consecutive calls compose.
    pub fn call(&self, args: A) {
        let action = Rc::clone(&self.action);
        tracing::trace!(action = %self.name, "dispatch");
        self.updater
            .apply(Update::apply(move |previous: &T| action(previous, args)));
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T, A> Clone for BoundAction<T, A> {
    fn clone(&self) -> Self {
        Self {
            name: Rc::clone(&self.name),
            action: Rc::clone(&self.action),
            updater: Rc::clone(&self.updater),
        }
    }
}

impl<T, A> fmt::Debug for BoundAction<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoundAction").field(&self.name).finish()
    }
}

/// All actions of a store, bound to one mount.
pub struct BoundActions<T, A = ()> {
    bound: Rc<BTreeMap<String, BoundAction<T, A>>>,
}

impl<T: 'static, A: 'static> BoundActions<T, A> {
    /// Look up a bound action by name.
    pub fn get(&self, name: &str) -> Result<&BoundAction<T, A>> {
        self.bound
            .get(name)
            .ok_or_else(|| Error::UnknownAction(name.to_owned()))
    }

    /// Invoke the action `name` with `args`.
    pub fn dispatch(&self, name: &str, args: A) -> Result<()> {
        self.get(name)?.call(args);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bound.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

impl<T, A> Clone for BoundActions<T, A> {
    fn clone(&self) -> Self {
        Self {
            bound: Rc::clone(&self.bound),
        }
    }
}

impl<T, A> fmt::Debug for BoundActions<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.bound.keys()).finish()
    }
}
