// Registry - the explicit thread-to-loop table
//
// "Which thread currently runs which loop" is process-wide mutable state.
// It is represented here as an explicit registry object rather than an
// ambient singleton, so tests can run against private registries without a
// live global loop; Registry::global() is the shared instance behind the
// free-function API.

use crate::config::{BridgeConfig, FallbackTarget};
use crate::event_loop::{DispatchError, LoopHandle};
use crate::metrics::Metrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, ThreadId};

static GLOBAL: OnceLock<Registry> = OnceLock::new();

struct RegistryState {
    loops: HashMap<ThreadId, LoopHandle>,
    main: Option<ThreadId>,
}

struct RegistryInner {
    state: Mutex<RegistryState>,
    config: BridgeConfig,
    metrics: Arc<Metrics>,
}

/// Thread-id to loop-handle table with a designated main loop.
///
/// A `Registry` is a cheap-to-clone handle. Loops register themselves at
/// creation ([`EventLoop::with_registry`](crate::EventLoop::with_registry))
/// and deregister on drop. The first loop registered becomes the main
/// loop; [`set_main`](Self::set_main) can override that choice.
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a registry with explicit configuration.
    pub fn with_config(config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState {
                    loops: HashMap::new(),
                    main: None,
                }),
                config,
                metrics: Arc::new(Metrics::new()),
            }),
        }
    }

    /// The process-global registry used by the free-function API.
    pub fn global() -> Registry {
        GLOBAL.get_or_init(Registry::new).clone()
    }

    /// The registry's configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// The registry's activity metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub(crate) fn metrics_arc(&self) -> Arc<Metrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Record a loop for its owning thread. The first registered loop
    /// becomes the main loop.
    pub(crate) fn register(&self, handle: LoopHandle) -> Result<(), DispatchError> {
        let owner = handle.owner();
        let mut state = self.inner.state.lock().unwrap();
        if state.loops.contains_key(&owner) {
            return Err(DispatchError::AlreadyRegistered(owner));
        }
        state.loops.insert(owner, handle);
        if state.main.is_none() {
            tracing::debug!("thread {:?} designated as main loop", owner);
            state.main = Some(owner);
        }
        Ok(())
    }

    /// Drop the record for a thread's loop. Clears the main designation if
    /// that loop held it.
    pub(crate) fn deregister(&self, owner: ThreadId) {
        let mut state = self.inner.state.lock().unwrap();
        state.loops.remove(&owner);
        if state.main == Some(owner) {
            state.main = None;
        }
    }

    /// The loop registered for a thread, if any.
    pub fn lookup(&self, thread: ThreadId) -> Option<LoopHandle> {
        self.inner.state.lock().unwrap().loops.get(&thread).cloned()
    }

    /// The main loop, if one is registered.
    pub fn main_loop(&self) -> Option<LoopHandle> {
        let state = self.inner.state.lock().unwrap();
        state.main.and_then(|owner| state.loops.get(&owner).cloned())
    }

    /// Designate the loop registered for `thread` as the main loop.
    ///
    /// # Returns
    /// `Err(DispatchError::NoLoopForThread)` if that thread has no loop.
    pub fn set_main(&self, thread: ThreadId) -> Result<(), DispatchError> {
        let mut state = self.inner.state.lock().unwrap();
        if !state.loops.contains_key(&thread) {
            return Err(DispatchError::NoLoopForThread(thread));
        }
        state.main = Some(thread);
        Ok(())
    }

    /// Resolve the loop a default-target call should land on: the calling
    /// thread's own loop if it has one, otherwise the configured fallback.
    pub fn resolve_default(&self) -> Result<LoopHandle, DispatchError> {
        let current = thread::current().id();
        if let Some(handle) = self.lookup(current) {
            return Ok(handle);
        }
        match self.inner.config.fallback_target {
            FallbackTarget::Main => self.main_loop().ok_or(DispatchError::NoMainLoop),
            FallbackTarget::Strict => Err(DispatchError::NoLoopForThread(current)),
        }
    }

    /// Resolve an explicitly addressed thread's loop.
    pub fn resolve(&self, thread: ThreadId) -> Result<LoopHandle, DispatchError> {
        self.lookup(thread)
            .ok_or(DispatchError::NoLoopForThread(thread))
    }

    /// Schedule `callback` on this registry's default target loop. See
    /// [`call_soon_threadsafe`](crate::call_soon_threadsafe).
    pub fn call_soon_threadsafe<F>(&self, callback: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.resolve_default()?;
        crate::bridge::post_call(&handle, callback)
    }

    /// Schedule `callback` on the loop registered for `thread`. See
    /// [`call_soon_threadsafe_to`](crate::call_soon_threadsafe_to).
    pub fn call_soon_threadsafe_to<F>(
        &self,
        thread: ThreadId,
        callback: F,
    ) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.resolve(thread)?;
        crate::bridge::post_call(&handle, callback)
    }
}
