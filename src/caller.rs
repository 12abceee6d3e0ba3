// Caller - the loop-resident dispatcher for cross-thread call requests
//
// A Caller holds no business state; it exists so a CallRequest has a
// receiver affined to the target thread. After handling one request it
// schedules itself for deferred destruction - never synchronous
// destruction, since the loop may still be iterating over events addressed
// to it. Events of any other kind are declined untouched.

use crate::event::Event;
use crate::event_loop::{DispatchContext, EventHandler, Handled};
use crate::future::CapturedFault;
use std::panic::{self, AssertUnwindSafe};

/// Dispatch target for [`CallRequest`](crate::CallRequest) events.
///
/// Usually created implicitly and transiently by
/// [`call_soon_threadsafe`](crate::call_soon_threadsafe): registered, sent
/// one request, retired at the loop's next deferred-deletion flush. It can
/// also be registered explicitly; requests already queued to it are still
/// dispatched while its deferred deletion is pending.
#[derive(Debug, Default)]
pub struct Caller;

impl Caller {
    /// Create a caller ready for registration with a loop.
    pub fn new() -> Self {
        Self
    }
}

impl EventHandler for Caller {
    fn handle(&mut self, event: Event, ctx: &mut DispatchContext<'_>) -> Handled {
        match event {
            Event::Call(request) => {
                // A panicking callback must not unwind into the loop's
                // dispatch pass.
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| request.invoke())) {
                    let fault = CapturedFault::from_panic(payload);
                    tracing::error!("call request callback panicked: {}", fault.message());
                    ctx.metrics().record_call_fault();
                }
                ctx.metrics().record_call_invoked();
                ctx.defer_delete_self();
                Handled::Yes
            }
            other => {
                tracing::trace!("caller ignoring {:?} event", other.kind());
                Handled::No
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CallRequest;
    use crate::event_loop::EventLoop;
    use crate::registry::Registry;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Wraps a Caller so its destruction is observable.
    struct Probe {
        inner: Caller,
        dropped: Arc<AtomicBool>,
    }

    impl EventHandler for Probe {
        fn handle(&mut self, event: Event, ctx: &mut DispatchContext<'_>) -> Handled {
            self.inner.handle(event, ctx)
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_calls_callback_in_call_requests() {
        let registry = Registry::new();
        let event_loop = EventLoop::with_registry(&registry).unwrap();
        let handle = event_loop.handle();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let id = handle.register(Box::new(Caller::new()));
        handle
            .post(
                id,
                Event::Call(CallRequest::new(move || {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();

        event_loop.process_events();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deletes_self_only_after_deferred_flush() {
        let registry = Registry::new();
        let event_loop = EventLoop::with_registry(&registry).unwrap();
        let handle = event_loop.handle();

        let dropped = Arc::new(AtomicBool::new(false));
        let id = handle.register(Box::new(Probe {
            inner: Caller::new(),
            dropped: Arc::clone(&dropped),
        }));
        handle
            .post(id, Event::Call(CallRequest::new(|| {})))
            .unwrap();

        event_loop.process_events();
        // Handled, but destruction waits for the flush.
        assert!(!dropped.load(Ordering::SeqCst));
        assert!(handle.contains_receiver(id));

        event_loop.flush_deferred_deletes();
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!handle.contains_receiver(id));
    }

    #[test]
    fn test_ignores_events_that_are_not_call_requests() {
        let registry = Registry::new();
        let event_loop = EventLoop::with_registry(&registry).unwrap();
        let handle = event_loop.handle();

        let dropped = Arc::new(AtomicBool::new(false));
        let id = handle.register(Box::new(Probe {
            inner: Caller::new(),
            dropped: Arc::clone(&dropped),
        }));
        handle.post(id, Event::User(9)).unwrap();

        event_loop.process_events();
        event_loop.flush_deferred_deletes();

        // Not destroyed: a non-call event must not retire the caller.
        assert!(!dropped.load(Ordering::SeqCst));
        assert!(handle.contains_receiver(id));
        assert_eq!(
            registry.metrics().events_unhandled.load(Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_panicking_callback_does_not_abort_the_loop() {
        let registry = Registry::new();
        let event_loop = EventLoop::with_registry(&registry).unwrap();
        let handle = event_loop.handle();

        let id = handle.register(Box::new(Caller::new()));
        handle
            .post(id, Event::Call(CallRequest::new(|| panic!("user fault"))))
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let next = handle.register(Box::new(Caller::new()));
        handle
            .post(
                next,
                Event::Call(CallRequest::new(move || {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();

        // Both events dispatch despite the first callback faulting.
        assert_eq!(event_loop.process_events(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.metrics().call_faults.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_handles_multiple_requests_queued_before_flush() {
        let registry = Registry::new();
        let event_loop = EventLoop::with_registry(&registry).unwrap();
        let handle = event_loop.handle();

        let calls = Arc::new(AtomicUsize::new(0));
        let id = handle.register(Box::new(Caller::new()));
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            handle
                .post(
                    id,
                    Event::Call(CallRequest::new(move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                    })),
                )
                .unwrap();
        }

        // All three dispatch: deferred deletion keeps the caller alive
        // while the queue drains.
        event_loop.process_events();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        event_loop.flush_deferred_deletes();
        assert!(!handle.contains_receiver(id));
    }
}
