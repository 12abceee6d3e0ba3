// crossloop - cross-thread call scheduling for cooperative event loops
//
// This is the library crate containing the cross-thread task bridge:
// futures, cancellable tasks, call requests and their loop-resident
// dispatchers, the thread-to-loop registry, and the executor facade.
//
// The model: exactly one designated thread drives a cooperative event loop
// per loop instance. Any number of worker threads schedule callbacks onto
// it with call_soon_threadsafe, or submit tasks through an Executor, and
// observe results through thread-safe Future handles. The loop thread
// stays in control: it dispatches only when asked to process pending
// events, and receiver destruction is deferred to an explicit flush pass.

pub mod bridge;
pub mod caller;
pub mod config;
pub mod event;
pub mod event_loop;
pub mod executor;
pub mod future;
pub mod metrics;
pub mod registry;
pub mod task;

// Re-export commonly used types for convenience
pub use bridge::{
    call_soon_threadsafe, call_soon_threadsafe_to, process_deferred_deletes, process_events,
};
pub use caller::Caller;
pub use config::{BridgeConfig, FallbackTarget};
pub use event::{CallRequest, Event, EventKind};
pub use event_loop::{
    DispatchContext, DispatchError, EventHandler, EventLoop, Handled, LoopHandle, ReceiverId,
};
pub use executor::{Executor, ShutdownError, ShutdownOptions, SubmitError};
pub use future::{CapturedFault, Future, FutureError, FutureState};
pub use metrics::Metrics;
pub use registry::Registry;
pub use task::Task;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
