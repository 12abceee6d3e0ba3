// EventLoop - a cooperative, single-thread-affined event queue
//
// This is the minimal substrate the bridge needs from "an event loop":
// 1. Post an event to a receiver affined to the loop's thread, thread-safely
//    and without blocking (any thread).
// 2. Dispatch pending events once, when asked (loop thread only).
// 3. Flush deferred-destruction requests, when asked (loop thread only).
//
// The EventLoop itself is owned by the loop thread and is not Send; a
// LoopHandle is the cloneable, Send view used by every other thread.
// Receivers never have their handler code run under a crate-held lock: a
// handler is taken out of the receiver table for the duration of its
// dispatch and put back afterwards.

use crate::event::Event;
use crate::metrics::Metrics;
use crate::registry::Registry;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use thiserror::Error;

/// Errors from posting to or driving an event loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No loop is registered for the addressed thread.
    #[error("no event loop registered for thread {0:?}")]
    NoLoopForThread(ThreadId),

    /// No main loop has been registered yet.
    #[error("no main event loop registered")]
    NoMainLoop,

    /// A loop is already registered for this thread.
    #[error("an event loop is already registered for thread {0:?}")]
    AlreadyRegistered(ThreadId),

    /// The addressed loop has been shut down.
    #[error("event loop has shut down")]
    LoopClosed,

    /// The operation is only valid on the loop's own thread.
    #[error("operation requires the loop thread {owner:?}")]
    WrongThread {
        /// The thread the loop is affined to.
        owner: ThreadId,
    },
}

/// Identifier of a receiver registered with a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(u64);

/// Whether a receiver consumed an event or declined it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The event was consumed; dispatch stops here.
    Yes,
    /// The event was declined; default dispatch proceeds.
    No,
}

/// A loop-resident event receiver.
///
/// Handlers always run on the loop's affinity thread, serialized by the
/// loop's event-processing order, and never under a crate-held lock.
pub trait EventHandler: Send {
    /// Dispatch one event. Return [`Handled::No`] to let default dispatch
    /// proceed.
    fn handle(&mut self, event: Event, ctx: &mut DispatchContext<'_>) -> Handled;
}

/// Per-dispatch context handed to [`EventHandler::handle`].
pub struct DispatchContext<'a> {
    receiver: ReceiverId,
    shared: &'a Arc<LoopShared>,
}

impl DispatchContext<'_> {
    /// The id the event was addressed to.
    pub fn receiver(&self) -> ReceiverId {
        self.receiver
    }

    /// A handle to the dispatching loop, e.g. for posting follow-up events.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            shared: Arc::clone(self.shared),
        }
    }

    /// Metrics of the registry this loop belongs to.
    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    /// Schedule the receiving handler for destruction at the loop's next
    /// deferred-deletion flush.
    ///
    /// Destruction never happens synchronously inside the handler: the
    /// loop may still be iterating over events addressed to this receiver.
    /// Idempotent within a flush cycle.
    pub fn defer_delete_self(&mut self) {
        let mut deferred = self.shared.deferred.lock().unwrap();
        if !deferred.contains(&self.receiver) {
            deferred.push(self.receiver);
        }
    }
}

struct Envelope {
    to: ReceiverId,
    event: Event,
}

pub(crate) struct LoopShared {
    owner: ThreadId,
    queue: Mutex<VecDeque<Envelope>>,
    receivers: Mutex<HashMap<ReceiverId, Box<dyn EventHandler>>>,
    deferred: Mutex<Vec<ReceiverId>>,
    next_receiver: AtomicU64,
    closed: AtomicBool,
    queue_warn_depth: usize,
    queue_warned: AtomicBool,
    metrics: Arc<Metrics>,
}

impl LoopShared {
    fn ensure_owner(&self) -> Result<(), DispatchError> {
        if thread::current().id() != self.owner {
            return Err(DispatchError::WrongThread { owner: self.owner });
        }
        Ok(())
    }

    /// Dispatch the events queued at entry. Events posted by handlers
    /// during this pass stay queued for the next one.
    fn dispatch_pending(self: &Arc<Self>) -> usize {
        let batch: Vec<Envelope> = {
            let mut queue = self.queue.lock().unwrap();
            let snapshot = queue.len();
            queue.drain(..snapshot).collect()
        };
        self.queue_warned.store(false, Ordering::Relaxed);

        let mut dispatched = 0;
        for envelope in batch {
            let handler = self.receivers.lock().unwrap().remove(&envelope.to);
            let Some(mut handler) = handler else {
                tracing::debug!(
                    "dropping {:?} event for unknown receiver {:?}",
                    envelope.event.kind(),
                    envelope.to
                );
                self.metrics.record_event_dropped();
                continue;
            };

            let mut ctx = DispatchContext {
                receiver: envelope.to,
                shared: self,
            };
            let kind = envelope.event.kind();
            match handler.handle(envelope.event, &mut ctx) {
                Handled::Yes => {}
                Handled::No => {
                    tracing::trace!("default dispatch for {:?} event to {:?}", kind, envelope.to);
                    self.metrics.record_event_unhandled();
                }
            }
            self.receivers.lock().unwrap().insert(envelope.to, handler);
            self.metrics.record_event_dispatched();
            dispatched += 1;
        }
        dispatched
    }

    fn flush_deferred(&self) -> usize {
        let ids: Vec<ReceiverId> = {
            let mut deferred = self.deferred.lock().unwrap();
            deferred.drain(..).collect()
        };
        let mut removed = Vec::with_capacity(ids.len());
        {
            let mut receivers = self.receivers.lock().unwrap();
            for id in ids {
                if let Some(handler) = receivers.remove(&id) {
                    removed.push(handler);
                }
            }
        }
        let count = removed.len();
        // Handler destructors run outside the receiver-table lock.
        drop(removed);
        if count > 0 {
            tracing::debug!("flushed {} deferred receiver deletions", count);
            self.metrics.record_receivers_retired(count as u64);
        }
        count
    }
}

/// Cloneable, Send view of an event loop, usable from any thread.
pub struct LoopHandle {
    shared: Arc<LoopShared>,
}

impl Clone for LoopHandle {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl LoopHandle {
    /// The thread this loop is affined to.
    pub fn owner(&self) -> ThreadId {
        self.shared.owner
    }

    /// Whether the owning [`EventLoop`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of events currently queued.
    pub fn pending_events(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    /// Register a receiver with this loop. The handler will only ever run
    /// on the loop's thread, but registration itself is thread-safe.
    pub fn register(&self, handler: Box<dyn EventHandler>) -> ReceiverId {
        let id = ReceiverId(self.shared.next_receiver.fetch_add(1, Ordering::Relaxed));
        self.shared.receivers.lock().unwrap().insert(id, handler);
        id
    }

    /// Remove a receiver without dispatching anything further to it.
    pub fn unregister(&self, id: ReceiverId) {
        self.shared.receivers.lock().unwrap().remove(&id);
        self.shared.deferred.lock().unwrap().retain(|d| *d != id);
    }

    /// Whether a receiver is still registered (deferred-deleted receivers
    /// remain registered until the next flush).
    pub fn contains_receiver(&self, id: ReceiverId) -> bool {
        self.shared.receivers.lock().unwrap().contains_key(&id)
    }

    /// Post an event to a receiver of this loop.
    ///
    /// Never blocks and never re-enters the caller; the event is
    /// dispatched later, on the loop's thread. Events posted to the same
    /// receiver are delivered in post order.
    pub fn post(&self, to: ReceiverId, event: Event) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::LoopClosed);
        }
        let depth = {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.push_back(Envelope { to, event });
            queue.len()
        };
        self.shared.metrics.record_event_posted();
        if depth >= self.shared.queue_warn_depth
            && !self.shared.queue_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "event queue for thread {:?} is {} deep; loop may not be draining",
                self.shared.owner,
                depth
            );
        }
        Ok(())
    }

    /// Dispatch pending events once. Must be called on the loop's thread.
    ///
    /// # Returns
    /// The number of events dispatched in this pass.
    pub fn process_events(&self) -> Result<usize, DispatchError> {
        self.shared.ensure_owner()?;
        Ok(self.shared.dispatch_pending())
    }

    /// Destroy receivers scheduled by
    /// [`DispatchContext::defer_delete_self`]. Must be called on the
    /// loop's thread.
    ///
    /// # Returns
    /// The number of receivers destroyed.
    pub fn flush_deferred_deletes(&self) -> Result<usize, DispatchError> {
        self.shared.ensure_owner()?;
        Ok(self.shared.flush_deferred())
    }
}

/// A cooperative event loop bound to the thread that created it.
///
/// Creating the loop registers it with the given [`Registry`], making the
/// thread addressable by [`call_soon_threadsafe`](crate::call_soon_threadsafe)
/// and [`Executor`](crate::Executor). Dropping it closes the loop
/// (subsequent posts fail) and deregisters the thread.
///
/// The loop is deliberately passive: it dispatches only when
/// [`process_events`](Self::process_events) is called, which lets a host
/// framework interleave these passes with its own work.
pub struct EventLoop {
    shared: Arc<LoopShared>,
    registry: Registry,
    // An EventLoop must stay on the thread it is affined to.
    _not_send: PhantomData<*const ()>,
}

impl EventLoop {
    /// Create a loop on the current thread and register it with the
    /// process-global registry.
    pub fn new() -> Result<Self, DispatchError> {
        Self::with_registry(&Registry::global())
    }

    /// Create a loop on the current thread and register it with an
    /// explicit registry.
    ///
    /// # Returns
    /// `Err(DispatchError::AlreadyRegistered)` if this thread already has
    /// a loop in that registry.
    pub fn with_registry(registry: &Registry) -> Result<Self, DispatchError> {
        let owner = thread::current().id();
        let shared = Arc::new(LoopShared {
            owner,
            queue: Mutex::new(VecDeque::new()),
            receivers: Mutex::new(HashMap::new()),
            deferred: Mutex::new(Vec::new()),
            next_receiver: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            queue_warn_depth: registry.config().queue_warn_depth,
            queue_warned: AtomicBool::new(false),
            metrics: registry.metrics_arc(),
        });
        let handle = LoopHandle {
            shared: Arc::clone(&shared),
        };
        registry.register(handle)?;
        tracing::debug!("event loop registered for thread {:?}", owner);
        Ok(Self {
            shared,
            registry: registry.clone(),
            _not_send: PhantomData,
        })
    }

    /// A Send handle to this loop.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Dispatch pending events once. See [`LoopHandle::process_events`];
    /// infallible here because the loop cannot leave its thread.
    pub fn process_events(&self) -> usize {
        self.shared.dispatch_pending()
    }

    /// Flush deferred receiver deletions. See
    /// [`LoopHandle::flush_deferred_deletes`].
    pub fn flush_deferred_deletes(&self) -> usize {
        self.shared.flush_deferred()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.registry.deregister(self.shared.owner);
        tracing::debug!("event loop closed for thread {:?}", self.shared.owner);
    }
}
