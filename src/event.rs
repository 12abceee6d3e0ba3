// Event values delivered to loop-resident receivers
//
// CallRequest is the distinguished event kind that carries a cross-thread
// callback; Event::User stands in for any unrelated event a receiver may
// be handed on the same loop, so dispatchers can tell the two apart.

use std::fmt;

/// Discriminant for [`Event`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A [`CallRequest`].
    Call,
    /// An application-defined event with no meaning to this crate.
    User,
}

/// An immutable, single-use event value carrying a zero-argument callback.
///
/// The embedded callback is consumed exactly once, by whichever receiver
/// the request is dispatched to. Single use is enforced by move semantics:
/// [`invoke`](Self::invoke) takes the request by value.
pub struct CallRequest {
    callback: Box<dyn FnOnce() + Send>,
}

impl CallRequest {
    /// Wrap a callback in a postable request.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Consume the request and run its callback on the current thread.
    pub fn invoke(self) {
        (self.callback)();
    }
}

impl fmt::Debug for CallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallRequest").finish_non_exhaustive()
    }
}

/// An event deliverable to a loop-resident receiver.
#[derive(Debug)]
pub enum Event {
    /// A cross-thread call request; handled by [`Caller`](crate::Caller).
    Call(CallRequest),
    /// Anything else delivered to the same receiver. Carries an opaque
    /// application tag.
    User(u64),
}

impl Event {
    /// The event's kind tag.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Call(_) => EventKind::Call,
            Event::User(_) => EventKind::User,
        }
    }
}
