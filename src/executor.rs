// Executor - bounded-lifetime task submission onto a loop thread
//
// Wraps each submitted callable in a Task, posts task.run to the bound
// loop via the call-scheduling primitive, and tracks the task until it
// reaches a terminal state. A condition variable is signalled whenever the
// outstanding set empties, which is what shutdown(wait=true) blocks on -
// from any thread, while the loop thread keeps draining.

use crate::bridge::post_call;
use crate::event_loop::{DispatchError, LoopHandle};
use crate::future::Future;
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::task::Task;
use indexmap::IndexMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from [`Executor::submit`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// Shutdown has begun; the executor accepts no further submissions.
    #[error("executor is shut down")]
    ShutDown,

    /// The bound loop refused the posting.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Errors from [`Executor::shutdown_with`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// The bounded wait expired with tasks still outstanding.
    #[error("shutdown wait timed out after {0:?}")]
    Timeout(Duration),
}

/// Options for [`Executor::shutdown_with`].
#[derive(Debug, Clone, Copy)]
pub struct ShutdownOptions {
    /// Block until every outstanding task reaches a terminal state.
    pub wait: bool,
    /// Cancel outstanding tasks first. Tasks already running are
    /// unaffected and still complete normally.
    pub cancel_futures: bool,
    /// Bound for the wait; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            wait: true,
            cancel_futures: false,
            timeout: None,
        }
    }
}

/// Type-erased cancel handle kept in the outstanding set.
trait CancelHandle: Send + Sync {
    fn cancel_task(&self) -> bool;
}

impl<T: Send + 'static> CancelHandle for Task<T> {
    fn cancel_task(&self) -> bool {
        self.cancel()
    }
}

struct ExecState {
    accepting: bool,
    outstanding: IndexMap<u64, Arc<dyn CancelHandle>>,
    next_id: u64,
}

struct ExecutorShared {
    state: Mutex<ExecState>,
    idle: Condvar,
    target: LoopHandle,
    metrics: Arc<Metrics>,
}

impl ExecutorShared {
    /// Done-callback path: drop the task from the outstanding set and
    /// signal waiters when the set empties.
    fn complete(&self, id: u64) {
        let mut state = self.state.lock().unwrap();
        if state.outstanding.shift_remove(&id).is_some() {
            self.metrics.record_task_completed();
            if state.outstanding.is_empty() {
                self.idle.notify_all();
            }
        }
    }
}

/// Submits callables to a loop thread and tracks them until completion.
///
/// Submissions may come from any thread. Once shut down, the executor
/// permanently refuses new submissions. Dropping the executor performs
/// `shutdown(wait = true)` if shutdown has not already begun, so scoped
/// use never silently abandons tasks.
///
/// # Example
/// ```no_run
/// use crossloop::{Executor, process_events};
///
/// let executor = Executor::new().unwrap();
/// let future = executor.submit(|| 1 + 1).unwrap();
/// process_events().unwrap(); // on the loop thread
/// assert_eq!(future.result(None).unwrap(), 2);
/// ```
pub struct Executor {
    shared: Arc<ExecutorShared>,
}

impl Executor {
    /// Create an executor bound to the default target loop of the global
    /// [`Registry`] (the current thread's loop, or the main loop).
    pub fn new() -> Result<Self, DispatchError> {
        Self::with_registry(&Registry::global())
    }

    /// Create an executor bound to the default target loop of an explicit
    /// registry.
    pub fn with_registry(registry: &Registry) -> Result<Self, DispatchError> {
        let target = registry.resolve_default()?;
        Ok(Self::bound(target, registry.metrics_arc()))
    }

    /// Create an executor bound to the loop registered for `thread`.
    pub fn bound_to(registry: &Registry, thread: ThreadId) -> Result<Self, DispatchError> {
        let target = registry.resolve(thread)?;
        Ok(Self::bound(target, registry.metrics_arc()))
    }

    fn bound(target: LoopHandle, metrics: Arc<Metrics>) -> Self {
        Self {
            shared: Arc::new(ExecutorShared {
                state: Mutex::new(ExecState {
                    accepting: true,
                    outstanding: IndexMap::new(),
                    next_id: 0,
                }),
                idle: Condvar::new(),
                target,
                metrics,
            }),
        }
    }

    /// The thread this executor submits to.
    pub fn target_thread(&self) -> ThreadId {
        self.shared.target.owner()
    }

    /// Whether submissions are still accepted.
    pub fn is_accepting(&self) -> bool {
        self.shared.state.lock().unwrap().accepting
    }

    /// Number of submitted tasks not yet in a terminal state.
    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().unwrap().outstanding.len()
    }

    /// Wrap `callable` in a [`Task`], schedule it on the bound loop
    /// thread, and return the task's [`Future`].
    ///
    /// # Returns
    /// - `Err(SubmitError::ShutDown)` once shutdown has begun; the
    ///   outstanding set is left unchanged
    /// - `Err(SubmitError::Dispatch)` if the bound loop refused the post
    pub fn submit<F, T>(&self, callable: F) -> Result<Future<T>, SubmitError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let task = Task::new(callable);
        let id = {
            let mut state = self.shared.state.lock().unwrap();
            if !state.accepting {
                return Err(SubmitError::ShutDown);
            }
            let id = state.next_id;
            state.next_id += 1;
            let handle: Arc<dyn CancelHandle> = Arc::new(task.clone());
            state.outstanding.insert(id, handle);
            id
        };

        let shared = Arc::downgrade(&self.shared);
        task.future().add_done_callback(move |_| {
            if let Some(shared) = shared.upgrade() {
                shared.complete(id);
            }
        });

        let runner = task.clone();
        if let Err(err) = post_call(&self.shared.target, move || runner.run()) {
            let mut state = self.shared.state.lock().unwrap();
            state.outstanding.shift_remove(&id);
            if state.outstanding.is_empty() {
                self.shared.idle.notify_all();
            }
            return Err(SubmitError::Dispatch(err));
        }

        self.shared.metrics.record_task_submitted();
        tracing::debug!(
            "task {} submitted to loop thread {:?}",
            id,
            self.shared.target.owner()
        );
        Ok(task.future())
    }

    /// Shut down with default options: wait for outstanding tasks, cancel
    /// nothing.
    pub fn shutdown(&self) {
        // Infallible without a timeout bound.
        let _ = self.shutdown_with(ShutdownOptions::default());
    }

    /// Shut down the executor.
    ///
    /// Idempotent: the first call permanently stops submissions; later
    /// calls return immediately. With `cancel_futures`, tasks still
    /// pending are cancelled in submission order (running tasks complete
    /// normally). With `wait`, blocks until the outstanding set is empty -
    /// valid from any thread, including while the loop thread keeps
    /// draining - honoring `timeout` if one is set.
    pub fn shutdown_with(&self, opts: ShutdownOptions) -> Result<(), ShutdownError> {
        let to_cancel: Vec<Arc<dyn CancelHandle>> = {
            let mut state = self.shared.state.lock().unwrap();
            if !state.accepting {
                return Ok(());
            }
            state.accepting = false;
            tracing::debug!(
                "executor shutting down with {} outstanding tasks",
                state.outstanding.len()
            );
            if opts.cancel_futures {
                state.outstanding.values().cloned().collect()
            } else {
                Vec::new()
            }
        };

        // Cancellation happens outside the executor lock: a successful
        // cancel fires the task's done callbacks, which re-enter
        // complete().
        for handle in to_cancel {
            if handle.cancel_task() {
                self.shared.metrics.record_task_cancelled();
            }
        }

        if opts.wait {
            self.wait_idle(opts.timeout)?;
        }
        Ok(())
    }

    fn wait_idle(&self, timeout: Option<Duration>) -> Result<(), ShutdownError> {
        let deadline = timeout.map(|d| (Instant::now() + d, d));
        let mut state = self.shared.state.lock().unwrap();
        while !state.outstanding.is_empty() {
            match deadline {
                None => {
                    state = self.shared.idle.wait(state).unwrap();
                }
                Some((deadline, bound)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ShutdownError::Timeout(bound));
                    }
                    let (guard, wait_result) = self
                        .shared
                        .idle
                        .wait_timeout(state, deadline - now)
                        .unwrap();
                    state = guard;
                    if wait_result.timed_out() && !state.outstanding.is_empty() {
                        return Err(ShutdownError::Timeout(bound));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let accepting = self.shared.state.lock().unwrap().accepting;
        if accepting {
            tracing::debug!("executor dropped while accepting, shutting down");
            self.shutdown();
        }
    }
}
