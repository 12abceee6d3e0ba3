// Future - thread-safe, single-assignment result cell with done callbacks
//
// A Future is shared between the submitting side (which reads the result)
// and the executing side (which writes it). All state transitions happen
// under a single internal mutex; a condition variable wakes blocked readers
// when the future reaches a terminal state. Done callbacks always run
// outside the lock, on whichever thread performed the triggering
// transition.
//
// The type is deliberately sealed: specialized behavior (see [`Task`]) is
// built by composing a Future, not by subclassing it.
//
// [`Task`]: crate::task::Task

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Observable lifecycle state of a [`Future`].
///
/// `Cancelled` and `Finished` are terminal: once either is reached, no
/// further state or result mutation is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    /// Created, not yet running and not yet resolved.
    Pending,
    /// The executing side has started the wrapped work.
    Running,
    /// Cancelled before the work started. Terminal.
    Cancelled,
    /// Resolved with a value or a captured fault. Terminal.
    Finished,
}

impl FutureState {
    /// Whether this state permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, FutureState::Cancelled | FutureState::Finished)
    }
}

/// A fault captured from a panicking callable.
///
/// Rust callables signal unrecoverable faults by unwinding, and an unwind
/// payload can be neither cloned nor shared across threads. The fault is
/// therefore reduced to its conventional string form at capture time
/// (`&str` and `String` payloads are preserved verbatim), which lets the
/// same fault surface on every retrieval call without being consumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("callable panicked: {message}")]
pub struct CapturedFault {
    message: String,
}

impl CapturedFault {
    /// Create a fault with an explicit message, for use with
    /// [`Future::set_exception`].
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The panic message, or a placeholder for non-string payloads.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Build a fault from an unwind payload as returned by
    /// `std::panic::catch_unwind`.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// Errors surfaced by [`Future`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FutureError {
    /// The operation is not permitted in the future's current state
    /// (e.g. resolving a future that is already terminal).
    #[error("future is already {0:?}")]
    InvalidState(FutureState),

    /// The future was cancelled before it produced a result.
    #[error("future was cancelled")]
    Cancelled,

    /// A bounded wait expired before the future reached a terminal state.
    #[error("wait timed out after {0:?}")]
    Timeout(Duration),

    /// The wrapped callable faulted; the fault was captured, not propagated.
    #[error(transparent)]
    Fault(#[from] CapturedFault),
}

/// Lifecycle plus outcome, kept in one enum so a `Finished` future always
/// carries its outcome.
enum Lifecycle<T> {
    Pending,
    Running,
    Cancelled,
    Finished(Result<T, CapturedFault>),
}

impl<T> Lifecycle<T> {
    fn state(&self) -> FutureState {
        match self {
            Lifecycle::Pending => FutureState::Pending,
            Lifecycle::Running => FutureState::Running,
            Lifecycle::Cancelled => FutureState::Cancelled,
            Lifecycle::Finished(_) => FutureState::Finished,
        }
    }
}

type DoneCallback<T> = Box<dyn FnOnce(&Future<T>) + Send>;

struct Inner<T> {
    lifecycle: Lifecycle<T>,
    callbacks: Vec<DoneCallback<T>>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    done: Condvar,
}

/// Thread-safe, single-assignment result cell.
///
/// A `Future` is a cheap-to-clone handle; all clones observe the same
/// underlying cell. The submitting thread typically holds one handle to
/// read the result while the executing thread holds another to write it.
///
/// # Example
/// ```
/// use crossloop::Future;
///
/// let future: Future<i32> = Future::new();
/// let writer = future.clone();
/// std::thread::spawn(move || {
///     writer.set_result(42).expect("first resolution");
/// });
/// assert_eq!(future.result(None).unwrap(), 42);
/// ```
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Future<T> {
    /// Create a pending future with no registered callbacks.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    lifecycle: Lifecycle::Pending,
                    callbacks: Vec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FutureState {
        self.shared.inner.lock().unwrap().lifecycle.state()
    }

    /// Whether the future has reached a terminal state.
    pub fn done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether the future was cancelled.
    pub fn cancelled(&self) -> bool {
        self.state() == FutureState::Cancelled
    }

    /// Block until the future is terminal, then return the stored value.
    ///
    /// # Arguments
    /// * `timeout` - Maximum time to wait; `None` waits indefinitely
    ///
    /// # Returns
    /// - `Ok(value)` if the future finished with a value
    /// - `Err(FutureError::Fault)` if the callable faulted
    /// - `Err(FutureError::Cancelled)` if the future was cancelled
    /// - `Err(FutureError::Timeout)` if the wait expired first
    ///
    /// The stored value is cloned on each retrieval rather than consumed,
    /// so repeated calls observe the same result.
    pub fn result(&self, timeout: Option<Duration>) -> Result<T, FutureError>
    where
        T: Clone,
    {
        let deadline = timeout.map(|d| (Instant::now() + d, d));
        let mut inner = self.shared.inner.lock().unwrap();
        loop {
            match &inner.lifecycle {
                Lifecycle::Cancelled => return Err(FutureError::Cancelled),
                Lifecycle::Finished(Ok(value)) => return Ok(value.clone()),
                Lifecycle::Finished(Err(fault)) => {
                    return Err(FutureError::Fault(fault.clone()));
                }
                Lifecycle::Pending | Lifecycle::Running => {}
            }
            inner = self.wait_step(inner, deadline)?;
        }
    }

    /// Block until the future is terminal, then return the captured fault.
    ///
    /// Same waiting semantics as [`result`](Self::result). Returns
    /// `Ok(None)` when the future finished with a value, `Ok(Some(fault))`
    /// when the callable faulted, and `Err(FutureError::Cancelled)` when
    /// the future was cancelled. The fault is not cleared by retrieval.
    pub fn exception(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<CapturedFault>, FutureError> {
        let deadline = timeout.map(|d| (Instant::now() + d, d));
        let mut inner = self.shared.inner.lock().unwrap();
        loop {
            match &inner.lifecycle {
                Lifecycle::Cancelled => return Err(FutureError::Cancelled),
                Lifecycle::Finished(Ok(_)) => return Ok(None),
                Lifecycle::Finished(Err(fault)) => return Ok(Some(fault.clone())),
                Lifecycle::Pending | Lifecycle::Running => {}
            }
            inner = self.wait_step(inner, deadline)?;
        }
    }

    /// Resolve the future with a value.
    ///
    /// Callable only by the executing side. Fails with
    /// [`FutureError::InvalidState`] if the future is already terminal.
    /// On success, wakes all blocked readers and invokes registered done
    /// callbacks in registration order, outside the lock.
    pub fn set_result(&self, value: T) -> Result<(), FutureError> {
        self.finish(Ok(value))
    }

    /// Resolve the future with a captured fault.
    ///
    /// Same transition rules and callback semantics as
    /// [`set_result`](Self::set_result).
    pub fn set_exception(&self, fault: CapturedFault) -> Result<(), FutureError> {
        self.finish(Err(fault))
    }

    /// Register a callback to run when the future reaches a terminal state.
    ///
    /// Callbacks run in registration order and receive the future itself.
    /// If the future is already terminal, the callback runs immediately on
    /// the registering thread instead of being queued.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&Future<T>) + Send + 'static,
    {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            if !inner.lifecycle.state().is_terminal() {
                inner.callbacks.push(Box::new(callback));
                return;
            }
        }
        Self::invoke_callback(self, Box::new(callback));
    }

    /// Cancel the future.
    ///
    /// Succeeds only while the state is `Pending`; a running or terminal
    /// future is unaffected and `false` is returned. On success, wakes all
    /// blocked readers and invokes done callbacks exactly as
    /// [`set_result`](Self::set_result) does.
    pub fn cancel(&self) -> bool {
        let callbacks = {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.lifecycle.state() != FutureState::Pending {
                return false;
            }
            inner.lifecycle = Lifecycle::Cancelled;
            self.shared.done.notify_all();
            std::mem::take(&mut inner.callbacks)
        };
        self.run_callbacks(callbacks);
        true
    }

    /// Transition `Pending -> Running`. Returns `false` if the future is
    /// in any other state. Used by [`Task::run`](crate::task::Task::run).
    pub(crate) fn begin_running(&self) -> bool {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.lifecycle.state() != FutureState::Pending {
            return false;
        }
        inner.lifecycle = Lifecycle::Running;
        true
    }

    fn finish(&self, outcome: Result<T, CapturedFault>) -> Result<(), FutureError> {
        let callbacks = {
            let mut inner = self.shared.inner.lock().unwrap();
            let state = inner.lifecycle.state();
            if state.is_terminal() {
                return Err(FutureError::InvalidState(state));
            }
            inner.lifecycle = Lifecycle::Finished(outcome);
            self.shared.done.notify_all();
            std::mem::take(&mut inner.callbacks)
        };
        self.run_callbacks(callbacks);
        Ok(())
    }

    fn run_callbacks(&self, callbacks: Vec<DoneCallback<T>>) {
        for callback in callbacks {
            Self::invoke_callback(self, callback);
        }
    }

    /// A faulting done callback must not unwind into the thread that
    /// performed the transition (usually the loop thread), so each
    /// invocation is isolated.
    fn invoke_callback(future: &Future<T>, callback: DoneCallback<T>) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(future))) {
            let fault = CapturedFault::from_panic(payload);
            tracing::error!("done callback panicked: {}", fault.message());
        }
    }

    fn wait_step<'a>(
        &'a self,
        guard: MutexGuard<'a, Inner<T>>,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<MutexGuard<'a, Inner<T>>, FutureError> {
        match deadline {
            None => Ok(self.shared.done.wait(guard).unwrap()),
            Some((deadline, timeout)) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(FutureError::Timeout(timeout));
                }
                let (guard, wait_result) = self
                    .shared
                    .done
                    .wait_timeout(guard, deadline - now)
                    .unwrap();
                if wait_result.timed_out() && !guard.lifecycle.state().is_terminal() {
                    return Err(FutureError::Timeout(timeout));
                }
                Ok(guard)
            }
        }
    }
}
