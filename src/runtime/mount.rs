use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::runtime::Runtime;
use crate::error::{Error, Result};
use crate::store::{Update, Updater};

/// Teardown returned by an effect, run before the effect re-runs and when
/// the mount unmounts.
pub type Cleanup = Box<dyn FnOnce()>;

type Effect = Box<dyn FnOnce() -> Option<Cleanup>>;

struct PendingEffect {
    index: usize,
    deps: Box<dyn Any>,
    run: Effect,
}
type Render = Box<dyn FnMut() -> Result<()>>;

/// Identifier of a mount, unique within its runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MountId(u64);

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mount#{}", self.0)
    }
}

enum Hook {
    State(Box<dyn Any>),
    Effect {
        // None until the first run commits
        deps: Option<Box<dyn Any>>,
        cleanup: Option<Cleanup>,
    },
}

struct MountInner {
    id: MountId,
    runtime: Weak<Runtime>,
    alive: Cell<bool>,
    render_queued: Cell<bool>,
    renders: Cell<u64>,
    render: RefCell<Option<Render>>,
    hooks: RefCell<Vec<Hook>>,
    cursor: Cell<usize>,
    pending_effects: RefCell<Vec<PendingEffect>>,
}

// Mounts currently rendering, innermost last
thread_local! {
    static MOUNT_STACK: RefCell<Vec<Rc<MountInner>>> = const { RefCell::new(Vec::new()) };
}

impl MountInner {
    fn schedule_render(self: &Rc<Self>) {
        if !self.alive.get() || self.render_queued.replace(true) {
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            self.render_queued.set(false);
            return;
        };
        let mount = Rc::downgrade(self);
        runtime.enqueue(Box::new(move || match mount.upgrade() {
            Some(mount) => mount.render_now(),
            None => Ok(()),
        }));
    }

    fn render_now(self: &Rc<Self>) -> Result<()> {
        self.render_queued.set(false);
        if !self.alive.get() {
            return Ok(());
        }
        let render = self.render.borrow_mut().take();
        let Some(mut render) = render else {
            return Ok(());
        };

        self.cursor.set(0);
        MOUNT_STACK.with(|stack| stack.borrow_mut().push(Rc::clone(self)));
        let result = panic::catch_unwind(AssertUnwindSafe(|| render()));
        MOUNT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        if self.alive.get() {
            *self.render.borrow_mut() = Some(render);
        }
        let result = match result {
            Ok(r) => r,
            Err(e) => panic::resume_unwind(e),
        };
        if let Err(err) = result {
            self.pending_effects.borrow_mut().clear();
            tracing::debug!(mount = %self.id, error = %err, "render failed");
            return Err(err);
        }

        self.renders.set(self.renders.get() + 1);
        tracing::trace!(mount = %self.id, render = self.renders.get(), "rendered");
        self.commit_effects();
        Ok(())
    }

    fn commit_effects(&self) {
        let effects = std::mem::take(&mut *self.pending_effects.borrow_mut());
        for PendingEffect { index, deps, run } in effects {
            if !self.alive.get() {
                break;
            }
            let previous = match self.hooks.borrow_mut().get_mut(index) {
                Some(Hook::Effect {
                    deps: committed,
                    cleanup,
                }) => {
                    *committed = Some(deps);
                    cleanup.take()
                }
                _ => None,
            };
            if let Some(cleanup) = previous {
                cleanup();
            }

            let cleanup = run();
            if !self.alive.get() {
                // unmounted by the effect itself
                if let Some(cleanup) = cleanup {
                    cleanup();
                }
                break;
            }
            if let Some(Hook::Effect { cleanup: slot, .. }) = self.hooks.borrow_mut().get_mut(index) {
                *slot = cleanup;
            }
        }
    }

    fn unmount(&self) {
        if !self.alive.replace(false) {
            return;
        }
        self.pending_effects.borrow_mut().clear();
        let render = self.render.borrow_mut().take();
        drop(render);

        let hooks = std::mem::take(&mut *self.hooks.borrow_mut());
        let cleanups: Vec<Cleanup> = hooks
            .into_iter()
            .filter_map(|hook| match hook {
                Hook::Effect { cleanup, .. } => cleanup,
                Hook::State(_) => None,
            })
            .collect();
        tracing::debug!(mount = %self.id, cleanups = cleanups.len(), "unmounted");
        for cleanup in cleanups {
            cleanup();
        }
    }
}

/// One component instance: a render function plus its hook state.
///
/// Creating a mount queues its first render on the runtime; nothing runs
/// until the runtime is flushed. Dropping the mount unmounts it.
pub struct Mount<R> {
    inner: Rc<MountInner>,
    output: Rc<RefCell<Option<R>>>,
}

impl<R: 'static> Mount<R> {
    /// Mount `render` on the current runtime.
    pub fn new<F>(render: F) -> Self
    where
        F: FnMut() -> Result<R> + 'static,
    {
        Self::on(&Runtime::current(), render)
    }

    /// Mount `render` on a specific runtime.
    pub fn on<F>(runtime: &Rc<Runtime>, mut render: F) -> Self
    where
        F: FnMut() -> Result<R> + 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&output);
        let render: Render = Box::new(move || {
            let rendered = render()?;
            *slot.borrow_mut() = Some(rendered);
            Ok(())
        });

        let inner = Rc::new(MountInner {
            id: MountId(runtime.next_id()),
            runtime: Rc::downgrade(runtime),
            alive: Cell::new(true),
            render_queued: Cell::new(false),
            renders: Cell::new(0),
            render: RefCell::new(Some(render)),
            hooks: RefCell::new(Vec::new()),
            cursor: Cell::new(0),
            pending_effects: RefCell::new(Vec::new()),
        });
        tracing::debug!(mount = %inner.id, "mounted");
        inner.schedule_render();

        Self { inner, output }
    }

    pub fn id(&self) -> MountId {
        self.inner.id
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.alive.get()
    }

    /// Number of completed renders.
    pub fn render_count(&self) -> u64 {
        self.inner.renders.get()
    }

    /// Read the output of the last completed render.
    pub fn with_output<U>(&self, f: impl FnOnce(&R) -> U) -> Option<U> {
        self.output.borrow().as_ref().map(f)
    }

    /// Queue a render even though no state changed.
    pub fn rerender(&self) {
        self.inner.schedule_render();
    }

    /// Tear the mount down now: every effect cleanup runs before this
    /// returns and queued work for the mount is discarded.
    pub fn unmount(&self) {
        self.inner.unmount();
    }
}

impl<R: Clone + 'static> Mount<R> {
    /// Clone of the last render's output.
    pub fn output(&self) -> Option<R> {
        self.output.borrow().clone()
    }
}

impl<R> Drop for Mount<R> {
    fn drop(&mut self) {
        self.inner.unmount();
    }
}

impl<R> fmt::Debug for Mount<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("id", &self.inner.id)
            .field("mounted", &self.inner.alive.get())
            .field("renders", &self.inner.renders.get())
            .finish()
    }
}

/// Hook access for the mount that is currently rendering.
///
/// Hooks are matched to their state by call order, so a render must call
/// the same hooks in the same order every time.
#[derive(Clone)]
pub struct MountContext {
    inner: Rc<MountInner>,
}

impl MountContext {
    /// The rendering mount, or [`Error::NoActiveMount`] outside a render.
    pub fn current() -> Result<Self> {
        MOUNT_STACK
            .with(|stack| stack.borrow().last().cloned())
            .map(|inner| Self { inner })
            .ok_or(Error::NoActiveMount)
    }

    pub fn id(&self) -> MountId {
        self.inner.id
    }

    /// Local state slot. `init` runs on the first render only.
    pub fn use_state<T, F>(&self, init: F) -> Result<(T, StateSetter<T>)>
    where
        T: Clone + PartialEq + 'static,
        F: FnOnce() -> T,
    {
        let index = self.next_index();
        if index >= self.inner.hooks.borrow().len() {
            let cell = Rc::new(RefCell::new(init()));
            self.inner.hooks.borrow_mut().push(Hook::State(Box::new(cell)));
        }

        let cell = match self.inner.hooks.borrow().get(index) {
            Some(Hook::State(slot)) => slot.downcast_ref::<Rc<RefCell<T>>>().cloned(),
            _ => None,
        }
        .ok_or(Error::HookMismatch { index })?;

        let value = cell.borrow().clone();
        let setter = StateSetter {
            cell: Rc::downgrade(&cell),
            mount: Rc::downgrade(&self.inner),
        };
        Ok((value, setter))
    }

    /// Run `effect` after this render commits if `deps` differ from the
    /// ones of the last committed run (always on the first run).
    ///
    /// `deps` are only recorded once the effect actually runs, so a render
    /// that fails leaves the next render to retry the effect.
    pub fn use_effect<D, F>(&self, deps: D, effect: F) -> Result<()>
    where
        D: PartialEq + 'static,
        F: FnOnce() -> Option<Cleanup> + 'static,
    {
        let index = self.next_index();
        let changed = {
            let mut hooks = self.inner.hooks.borrow_mut();
            if index >= hooks.len() {
                hooks.push(Hook::Effect {
                    deps: None,
                    cleanup: None,
                });
                true
            } else {
                match &hooks[index] {
                    Hook::Effect { deps: None, .. } => true,
                    Hook::Effect {
                        deps: Some(previous),
                        ..
                    } => match previous.downcast_ref::<D>() {
                        Some(previous) => *previous != deps,
                        None => return Err(Error::HookMismatch { index }),
                    },
                    Hook::State(_) => return Err(Error::HookMismatch { index }),
                }
            }
        };

        if changed {
            self.inner.pending_effects.borrow_mut().push(PendingEffect {
                index,
                deps: Box::new(deps),
                run: Box::new(effect),
            });
        }
        Ok(())
    }

    fn next_index(&self) -> usize {
        let index = self.inner.cursor.get();
        self.inner.cursor.set(index + 1);
        index
    }
}

impl fmt::Debug for MountContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MountContext").field(&self.inner.id).finish()
    }
}

/// Setter for a [`use_state`](MountContext::use_state) slot.
///
/// Updates are queued on the runtime and applied in call order, each
/// against the value left by the previous one. An update that yields an
/// equal value does not re-render. Updates to an unmounted mount are
/// dropped.
pub struct StateSetter<T> {
    cell: Weak<RefCell<T>>,
    mount: Weak<MountInner>,
}

impl<T> StateSetter<T> {
    /// Owning mount, if it is still alive.
    pub fn mount_id(&self) -> Option<MountId> {
        self.mount
            .upgrade()
            .filter(|mount| mount.alive.get())
            .map(|mount| mount.id)
    }
}

impl<T: Clone + PartialEq + 'static> Updater<T> for StateSetter<T> {
    fn apply(&self, update: Update<T>) {
        let Some(mount) = self.mount.upgrade().filter(|mount| mount.alive.get()) else {
            tracing::trace!("update for an unmounted mount dropped");
            return;
        };
        let Some(runtime) = mount.runtime.upgrade() else {
            return;
        };

        let cell = self.cell.clone();
        let target = Rc::downgrade(&mount);
        runtime.enqueue(Box::new(move || {
            let (Some(mount), Some(cell)) = (target.upgrade(), cell.upgrade()) else {
                return Ok(());
            };
            if !mount.alive.get() {
                return Ok(());
            }

            let previous = cell.borrow().clone();
            let next = update.resolve(&previous);
            if next == previous {
                tracing::trace!(mount = %mount.id, "update left value unchanged");
                return Ok(());
            }
            *cell.borrow_mut() = next;
            mount.schedule_render();
            Ok(())
        }));
    }
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
            mount: Weak::clone(&self.mount),
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("mount", &self.mount_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    type Counter = (i32, StateSetter<i32>);

    fn counter() -> Result<Counter> {
        MountContext::current()?.use_state(|| 0)
    }

    #[test]
    fn first_render_waits_for_flush() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let mount = Mount::new(counter);
            assert_eq!(mount.render_count(), 0);
            assert!(mount.output().is_none());

            runtime.flush().unwrap();
            assert_eq!(mount.render_count(), 1);
            assert_eq!(mount.with_output(|(value, _)| *value), Some(0));
        });
    }

    #[test]
    fn queued_updates_compose_against_latest_value() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let mount = Mount::new(counter);
            runtime.flush().unwrap();

            let (_, set) = mount.output().unwrap();
            set.update(|n| n + 1);
            set.update(|n| n * 10);
            runtime.flush().unwrap();

            assert_eq!(mount.with_output(|(value, _)| *value), Some(10));
            assert_eq!(mount.render_count(), 2);
        });
    }

    #[test]
    fn equal_update_does_not_rerender() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let mount = Mount::new(counter);
            runtime.flush().unwrap();

            mount.output().unwrap().1.set(0);
            runtime.flush().unwrap();
            assert_eq!(mount.render_count(), 1);
        });
    }

    #[test]
    fn effects_follow_deps_and_clean_up() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let log = Rc::new(RefCell::new(Vec::<String>::new()));
            let mount = Mount::new({
                let log = log.clone();
                move || {
                    let cx = MountContext::current()?;
                    let (value, set) = cx.use_state(|| 0)?;
                    let log = log.clone();
                    cx.use_effect(value, move || {
                        log.borrow_mut().push(format!("run {value}"));
                        Some(Box::new(move || log.borrow_mut().push(format!("clean {value}"))) as Cleanup)
                    })?;
                    Ok(set)
                }
            });
            runtime.flush().unwrap();

            mount.output().unwrap().set(1);
            runtime.flush().unwrap();
            mount.rerender();
            runtime.flush().unwrap();
            mount.unmount();

            assert_eq!(*log.borrow(), ["run 0", "clean 0", "run 1", "clean 1"]);
            assert!(!mount.is_mounted());
        });
    }

    #[test]
    fn unmount_drops_queued_updates() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let mount = Mount::new(counter);
            runtime.flush().unwrap();

            let (_, set) = mount.output().unwrap();
            set.set(5);
            mount.unmount();
            runtime.flush().unwrap();

            assert_eq!(mount.render_count(), 1);
            assert_eq!(set.mount_id(), None);
            set.set(6);
            assert!(runtime.is_idle());
        });
    }

    #[test]
    fn dropping_mount_runs_cleanups() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let cleaned = Rc::new(Cell::new(false));
            let mount = Mount::new({
                let cleaned = cleaned.clone();
                move || {
                    let cleaned = cleaned.clone();
                    MountContext::current()?
                        .use_effect((), move || Some(Box::new(move || cleaned.set(true)) as Cleanup))
                }
            });
            runtime.flush().unwrap();
            assert!(!cleaned.get());

            drop(mount);
            assert!(cleaned.get());
        });
    }

    #[test]
    fn hook_kind_change_is_reported() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let first = Rc::new(Cell::new(true));
            let mount = Mount::new({
                let first = first.clone();
                move || {
                    let cx = MountContext::current()?;
                    if first.replace(false) {
                        cx.use_state(|| 0).map(|_| ())
                    } else {
                        cx.use_effect((), || None)
                    }
                }
            });
            runtime.flush().unwrap();

            mount.rerender();
            assert_eq!(runtime.flush(), Err(Error::HookMismatch { index: 0 }));
        });
    }

    #[test]
    fn failed_render_does_not_swallow_effects() {
        Runtime::scope(|| {
            let runtime = Runtime::current();
            let runs = Rc::new(Cell::new(0));
            let fail = Rc::new(Cell::new(true));
            let mount = Mount::new({
                let runs = runs.clone();
                let fail = fail.clone();
                move || {
                    let cx = MountContext::current()?;
                    let runs = runs.clone();
                    cx.use_effect((), move || {
                        runs.set(runs.get() + 1);
                        None
                    })?;
                    if fail.replace(false) {
                        return Err(Error::NoActiveMount);
                    }
                    Ok(())
                }
            });
            assert_eq!(runtime.flush(), Err(Error::NoActiveMount));
            assert_eq!(runs.get(), 0);

            mount.rerender();
            runtime.flush().unwrap();
            assert_eq!(runs.get(), 1);

            mount.rerender();
            runtime.flush().unwrap();
            assert_eq!(runs.get(), 1);
        });
    }

    #[test]
    fn context_is_only_available_while_rendering() {
        assert_eq!(MountContext::current().map(|_| ()), Err(Error::NoActiveMount));
    }

    #[test]
    fn feedback_loop_is_cut_off() {
        Runtime::scope_with(RuntimeConfig::default().with_max_tasks_per_pass(32), || {
            let runtime = Runtime::current();
            let _mount = Mount::new(|| {
                let cx = MountContext::current()?;
                let (value, set) = cx.use_state(|| 0)?;
                cx.use_effect(value, move || {
                    set.set(value + 1);
                    None
                })
            });

            assert_eq!(runtime.flush(), Err(Error::Unsettled { limit: 32 }));
        });
    }
}
