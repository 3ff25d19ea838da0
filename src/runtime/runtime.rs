use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};

pub(crate) type Task = Box<dyn FnOnce() -> Result<()>>;

/// Cooperative scheduler that owns the pending work of every mount created
/// on it.
///
/// A runtime is the unit of isolation: mounts, setters and effects created
/// while it is current all queue onto it. Work only happens inside
/// [`flush`](Self::flush), which runs one scheduling pass to completion.
///
/// # Examples
///
/// ```
/// use tandem::runtime::Runtime;
///
/// Runtime::scope(|| {
///     let runtime = Runtime::current();
///     assert!(runtime.is_idle());
///     assert_eq!(runtime.flush().unwrap(), 0);
/// });
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    next_id: Cell<u64>,
    queue: RefCell<VecDeque<Task>>,
    flushing: Cell<bool>,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Rc<Runtime>>> = const { RefCell::new(Vec::new()) };
    static GLOBAL: Rc<Runtime> = Runtime::new(RuntimeConfig::default());
}

impl Runtime {
    /// Create a new isolated runtime.
    pub fn new(config: RuntimeConfig) -> Rc<Self> {
        Rc::new(Runtime {
            config,
            next_id: Cell::new(0),
            queue: RefCell::new(VecDeque::new()),
            flushing: Cell::new(false),
        })
    }

    /// Run a function with a fresh isolated runtime as the current one.
    ///
    /// The runtime and any work still queued on it are dropped when the
    /// function returns.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::scope_with(RuntimeConfig::default(), f)
    }

    /// Like [`scope`](Self::scope), with explicit configuration.
    pub fn scope_with<F, R>(config: RuntimeConfig, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_runtime(Self::new(config), f)
    }

    /// The per-thread fallback runtime.
    pub fn global() -> Rc<Self> {
        GLOBAL.with(Rc::clone)
    }

    /// The innermost scoped runtime, or the global one outside any scope.
    pub fn current() -> Rc<Self> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_else(Self::global))
    }

    /// Run a function with `runtime` as the current runtime.
    pub fn with_runtime<F, R>(runtime: Rc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Run queued tasks, including any they enqueue, until the queue is
    /// empty. Returns the number of tasks run.
    ///
    /// The first task error aborts the pass; tasks still queued stay queued.
    /// Calling `flush` from inside a running pass does nothing, since the
    /// outer pass drains the queue anyway.
    pub fn flush(&self) -> Result<usize> {
        if self.flushing.replace(true) {
            tracing::trace!("flush requested inside a running pass");
            return Ok(0);
        }
        let _pass = PassGuard(&self.flushing);

        let limit = self.config.max_tasks_per_pass;
        let mut ran = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            if ran == limit {
                self.queue.borrow_mut().push_front(task);
                tracing::warn!(limit, pending = self.pending(), "scheduling pass did not settle");
                return Err(Error::Unsettled { limit });
            }
            ran += 1;
            task()?;
        }

        tracing::debug!(tasks = ran, "scheduling pass settled");
        Ok(ran)
    }

    pub(crate) fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub(crate) fn enqueue(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .field("flushing", &self.flushing.get())
            .finish()
    }
}

struct PassGuard<'a>(&'a Cell<bool>);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_isolates_runtimes() {
        let outer = Runtime::current();
        Runtime::scope(|| {
            let inner = Runtime::current();
            assert!(!Rc::ptr_eq(&outer, &inner));
            Runtime::scope(|| assert!(!Rc::ptr_eq(&inner, &Runtime::current())));
            assert!(Rc::ptr_eq(&inner, &Runtime::current()));
        });
        assert!(Rc::ptr_eq(&outer, &Runtime::global()));
    }

    #[test]
    fn flush_runs_tasks_in_order_including_follow_ups() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        for n in 0..2 {
            let log = log.clone();
            let rt = runtime.clone();
            runtime.enqueue(Box::new(move || {
                log.borrow_mut().push(n);
                let log = log.clone();
                rt.enqueue(Box::new(move || {
                    log.borrow_mut().push(n + 10);
                    Ok(())
                }));
                Ok(())
            }));
        }

        assert_eq!(runtime.flush(), Ok(4));
        assert_eq!(*log.borrow(), [0, 1, 10, 11]);
        assert!(runtime.is_idle());
    }

    #[test]
    fn nested_flush_is_a_no_op() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let nested = Rc::new(RefCell::new(None));
        {
            let rt = runtime.clone();
            let nested = nested.clone();
            runtime.enqueue(Box::new(move || {
                *nested.borrow_mut() = Some(rt.flush());
                Ok(())
            }));
        }
        assert_eq!(runtime.flush(), Ok(1));
        assert_eq!(*nested.borrow(), Some(Ok(0)));
    }

    #[test]
    fn task_error_aborts_pass_and_keeps_the_rest() {
        let runtime = Runtime::new(RuntimeConfig::default());
        runtime.enqueue(Box::new(|| Err(Error::NoActiveMount)));
        runtime.enqueue(Box::new(|| Ok(())));

        assert_eq!(runtime.flush(), Err(Error::NoActiveMount));
        assert_eq!(runtime.pending(), 1);
        assert_eq!(runtime.flush(), Ok(1));
    }

    #[test]
    fn endless_work_is_reported_as_unsettled() {
        fn respawn(rt: Rc<Runtime>) -> Task {
            Box::new(move || {
                rt.enqueue(respawn(rt.clone()));
                Ok(())
            })
        }

        let runtime = Runtime::new(RuntimeConfig::default().with_max_tasks_per_pass(16));
        runtime.enqueue(respawn(runtime.clone()));

        assert_eq!(runtime.flush(), Err(Error::Unsettled { limit: 16 }));
        assert_eq!(runtime.pending(), 1);
    }
}
