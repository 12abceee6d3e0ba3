// Cross-thread scheduling surface
//
// call_soon_threadsafe is the primitive everything else builds on: wrap a
// callback in a CallRequest, register a transient Caller on the target
// loop, and post the request to it. Posting never blocks and never
// re-enters the caller; the callback runs later, strictly on the target
// thread's loop. The module-level helpers here operate on the
// process-global Registry; use the methods on Registry for an explicit
// context.

use crate::caller::Caller;
use crate::event::{CallRequest, Event};
use crate::event_loop::{DispatchError, LoopHandle};
use crate::registry::Registry;
use std::thread::{self, ThreadId};

/// Register a transient [`Caller`] on `handle`'s loop and post `callback`
/// to it. The caller retires itself after handling the request; if the
/// post fails, it is unregistered immediately so nothing leaks.
pub(crate) fn post_call<F>(handle: &LoopHandle, callback: F) -> Result<(), DispatchError>
where
    F: FnOnce() + Send + 'static,
{
    let receiver = handle.register(Box::new(Caller::new()));
    match handle.post(receiver, Event::Call(CallRequest::new(callback))) {
        Ok(()) => {
            handle.metrics().record_caller_spawned();
            Ok(())
        }
        Err(err) => {
            handle.unregister(receiver);
            Err(err)
        }
    }
}

/// Schedule `callback` to run on the default target loop.
///
/// The default target is the calling thread's own loop if it has one
/// registered with the global [`Registry`]; otherwise the registry's
/// fallback policy applies (the main loop by default - a calling thread
/// without a loop has nothing draining events, so it cannot be its own
/// target).
///
/// # Returns
/// `Ok(())` once the request is queued. The callback runs later, on the
/// target loop's thread, after its next
/// [`process_events`](crate::process_events) pass.
///
/// # Example
/// ```no_run
/// use crossloop::{call_soon_threadsafe, process_events};
///
/// call_soon_threadsafe(|| println!("on the loop thread")).unwrap();
/// process_events().unwrap();
/// ```
pub fn call_soon_threadsafe<F>(callback: F) -> Result<(), DispatchError>
where
    F: FnOnce() + Send + 'static,
{
    Registry::global().call_soon_threadsafe(callback)
}

/// Schedule `callback` to run on the loop registered for `thread` in the
/// global [`Registry`].
pub fn call_soon_threadsafe_to<F>(thread: ThreadId, callback: F) -> Result<(), DispatchError>
where
    F: FnOnce() + Send + 'static,
{
    Registry::global().call_soon_threadsafe_to(thread, callback)
}

/// Dispatch pending events once on the current thread's globally
/// registered loop.
pub fn process_events() -> Result<usize, DispatchError> {
    current_loop()?.process_events()
}

/// Flush deferred receiver deletions on the current thread's globally
/// registered loop.
pub fn process_deferred_deletes() -> Result<usize, DispatchError> {
    current_loop()?.flush_deferred_deletes()
}

fn current_loop() -> Result<LoopHandle, DispatchError> {
    let current = thread::current().id();
    Registry::global()
        .lookup(current)
        .ok_or(DispatchError::NoLoopForThread(current))
}
