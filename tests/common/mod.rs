//! Shared fixture: a loop thread that pumps its event loop on command.
//!
//! Mirrors how a host framework drives the loop: the owning thread stays
//! in control and processes pending events (plus the deferred-deletion
//! flush) only when asked. Tests command pumps from the outside, which
//! keeps "the loop has not run yet" observable.

use crossloop::{EventLoop, Registry};
use std::sync::{Once, mpsc};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

static INIT_LOGGING: Once = Once::new();

/// Install a fmt subscriber once per test binary, honoring RUST_LOG.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

enum Command {
    Pump,
    Stop,
}

/// A dedicated thread owning an [`EventLoop`], pumped on command.
pub struct LoopThread {
    commands: mpsc::Sender<Command>,
    acks: mpsc::Receiver<usize>,
    thread_id: ThreadId,
    join: Option<JoinHandle<()>>,
}

impl LoopThread {
    /// Spawn a loop thread registered with `registry`.
    pub fn spawn(registry: Registry) -> Self {
        Self::spawn_inner(Some(registry))
    }

    /// Spawn a loop thread registered with the process-global registry,
    /// driven through the free-function API.
    pub fn spawn_global() -> Self {
        Self::spawn_inner(None)
    }

    fn spawn_inner(registry: Option<Registry>) -> Self {
        init_test_logging();
        let (command_tx, command_rx) = mpsc::channel();
        let (ack_tx, ack_rx) = mpsc::channel();
        let (id_tx, id_rx) = mpsc::channel();

        let join = thread::spawn(move || {
            let global = registry.is_none();
            let event_loop = match &registry {
                Some(registry) => EventLoop::with_registry(registry),
                None => EventLoop::new(),
            }
            .expect("loop registration");
            id_tx.send(thread::current().id()).expect("fixture channel");

            while let Ok(command) = command_rx.recv() {
                match command {
                    Command::Pump => {
                        let dispatched = if global {
                            let dispatched = crossloop::process_events().expect("process events");
                            crossloop::process_deferred_deletes().expect("flush deletes");
                            dispatched
                        } else {
                            let dispatched = event_loop.process_events();
                            event_loop.flush_deferred_deletes();
                            dispatched
                        };
                        let _ = ack_tx.send(dispatched);
                    }
                    Command::Stop => break,
                }
            }
        });

        let thread_id = id_rx.recv().expect("fixture channel");
        Self {
            commands: command_tx,
            acks: ack_rx,
            thread_id,
            join: Some(join),
        }
    }

    /// The loop's affinity thread.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Run one process-events pass plus a deferred-deletion flush.
    /// Returns the number of events dispatched.
    pub fn pump(&self) -> usize {
        self.commands.send(Command::Pump).expect("loop thread alive");
        self.acks.recv().expect("loop thread alive")
    }

    /// Pump repeatedly until `predicate` holds, or give up after two
    /// seconds. Returns whether the predicate held.
    pub fn pump_until(&self, predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if predicate() {
                return true;
            }
            if Instant::now() >= deadline {
                return predicate();
            }
            self.pump();
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
