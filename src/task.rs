// Task - a Future specialized to wrap and run exactly one callable
//
// A Task composes a Future with a zero-argument callable. Running the task
// executes the callable at most once and resolves the future with its
// return value, or with a CapturedFault if the callable unwinds. Because
// run() typically executes on the event loop thread, no fault category is
// allowed to propagate out of it: an uncaught unwind there would corrupt
// the loop for all other pending work.

use crate::future::{CapturedFault, Future};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

type Callable<T> = Box<dyn FnOnce() -> T + Send>;

/// A cancellable unit of work producing a value of type `T`.
///
/// Like [`Future`], a `Task` is a cheap-to-clone handle: the submitting
/// side keeps one clone to cancel or observe, while the executing side
/// receives another to [`run`](Self::run). Cancellation is cooperative: it
/// only succeeds before `run` begins, in which case the callable is
/// released without ever being invoked.
///
/// # Example
/// ```
/// use crossloop::Task;
///
/// let task = Task::new(|| 2 + 2);
/// task.run();
/// assert_eq!(task.future().result(None).unwrap(), 4);
/// ```
pub struct Task<T> {
    future: Future<T>,
    callable: Arc<Mutex<Option<Callable<T>>>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            callable: Arc::clone(&self.callable),
        }
    }
}

impl<T: Send + 'static> Task<T> {
    /// Wrap a callable in a pending task.
    pub fn new<F>(callable: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            future: Future::new(),
            callable: Arc::new(Mutex::new(Some(Box::new(callable)))),
        }
    }

    /// A handle to the task's future, for reading the result, registering
    /// done callbacks, or waiting.
    pub fn future(&self) -> Future<T> {
        self.future.clone()
    }

    /// Execute the wrapped callable and resolve the future.
    ///
    /// If the task was cancelled before this call, nothing runs. Otherwise
    /// the state moves to `Running`, the callable is invoked, and the
    /// future is resolved with the returned value or with the captured
    /// fault if the callable unwound. Never panics outward.
    pub fn run(&self) {
        if !self.future.begin_running() {
            tracing::debug!("task not run: state is {:?}", self.future.state());
            return;
        }
        let callable = self.callable.lock().unwrap().take();
        let Some(callable) = callable else {
            let _ = self
                .future
                .set_exception(CapturedFault::new("task callable already consumed"));
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(callable)) {
            Ok(value) => {
                if self.future.set_result(value).is_err() {
                    tracing::warn!("task finished but its future was already resolved");
                }
            }
            Err(payload) => {
                let fault = CapturedFault::from_panic(payload);
                tracing::debug!("task callable panicked, fault stored: {}", fault.message());
                if self.future.set_exception(fault).is_err() {
                    tracing::warn!("task faulted but its future was already resolved");
                }
            }
        }
    }

    /// Cancel the task before it runs.
    ///
    /// Returns `true` and releases the callable (it will never be invoked)
    /// if the task was still pending; returns `false` once `run` has
    /// started or the task is terminal.
    pub fn cancel(&self) -> bool {
        if !self.future.cancel() {
            return false;
        }
        // Release captured resources now rather than at task drop.
        let _ = self.callable.lock().unwrap().take();
        true
    }
}
