// Performance metrics module
//
// Provides lightweight metrics tracking for monitoring bridge activity

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Bridge activity metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// One instance is carried by each [`Registry`](crate::Registry) and
/// shared with the loops and executors created through it; counters can be
/// logged periodically or on shutdown for analysis.
#[derive(Debug)]
pub struct Metrics {
    /// Events posted to any loop
    pub events_posted: AtomicU64,

    /// Events dispatched to a receiver
    pub events_dispatched: AtomicU64,

    /// Events a receiver declined (default dispatch)
    pub events_unhandled: AtomicU64,

    /// Events dropped because their receiver was gone
    pub events_dropped: AtomicU64,

    /// Transient callers registered by call scheduling
    pub callers_spawned: AtomicU64,

    /// Receivers destroyed by a deferred-deletion flush
    pub receivers_retired: AtomicU64,

    /// Call request callbacks invoked
    pub calls_invoked: AtomicU64,

    /// Call request callbacks that panicked
    pub call_faults: AtomicU64,

    /// Tasks accepted by an executor
    pub tasks_submitted: AtomicU64,

    /// Tasks that reached a terminal state under an executor
    pub tasks_completed: AtomicU64,

    /// Tasks cancelled during executor shutdown
    pub tasks_cancelled: AtomicU64,

    /// Instance creation time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            events_posted: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            events_unhandled: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            callers_spawned: AtomicU64::new(0),
            receivers_retired: AtomicU64::new(0),
            calls_invoked: AtomicU64::new(0),
            call_faults: AtomicU64::new(0),
            tasks_submitted: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an event posted to a loop
    pub fn record_event_posted(&self) {
        self.events_posted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event dispatched to a receiver
    pub fn record_event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event the receiver declined
    pub fn record_event_unhandled(&self) {
        self.events_unhandled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event whose receiver was gone
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transient caller registration
    pub fn record_caller_spawned(&self) {
        self.callers_spawned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record receivers removed by a deferred-deletion flush
    pub fn record_receivers_retired(&self, count: u64) {
        self.receivers_retired.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a call request callback invocation
    pub fn record_call_invoked(&self) {
        self.calls_invoked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a panicking call request callback
    pub fn record_call_fault(&self) {
        self.call_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task accepted by an executor
    pub fn record_task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task reaching a terminal state
    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task cancelled by shutdown
    pub fn record_task_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Bridge Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Events: {} posted, {} dispatched, {} unhandled, {} dropped",
            self.events_posted.load(Ordering::Relaxed),
            self.events_dispatched.load(Ordering::Relaxed),
            self.events_unhandled.load(Ordering::Relaxed),
            self.events_dropped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Calls: {} invoked, {} faulted; callers: {} spawned, {} retired",
            self.calls_invoked.load(Ordering::Relaxed),
            self.call_faults.load(Ordering::Relaxed),
            self.callers_spawned.load(Ordering::Relaxed),
            self.receivers_retired.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Tasks: {} submitted, {} completed, {} cancelled",
            self.tasks_submitted.load(Ordering::Relaxed),
            self.tasks_completed.load(Ordering::Relaxed),
            self.tasks_cancelled.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
