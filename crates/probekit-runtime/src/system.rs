//! Actor system: registry of cells plus shared services
//!
//! TigerStyle: Explicit limits on actor count, bounded shutdown wait.

use crate::actor::{DispatcherKind, Props};
use crate::cell::ActorCell;
use crate::dispatcher::{CallingThreadDispatcher, Dispatcher, Task};
use crate::tokio_dispatcher::TokioDispatcher;
use parking_lot::Mutex;
use probekit_core::actor::{ActorId, ActorRef};
use probekit_core::config::ProbekitConfig;
use probekit_core::constants::{
    ACTOR_CONCURRENT_COUNT_MAX, SHUTDOWN_POLL_INTERVAL_MS, SHUTDOWN_WAIT_MS_MAX,
};
use probekit_core::error::{Error, Result};
use probekit_core::interrupt;
use probekit_core::logging::{EventStream, LogEvent, LogLevel};
use probekit_core::message::{Envelope, PoisonPill, Terminated};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub(crate) struct SystemInner {
    config: ProbekitConfig,
    cells: Mutex<HashMap<ActorId, Arc<ActorCell>>>,
    calling_thread: Arc<CallingThreadDispatcher>,
    concurrent: Arc<TokioDispatcher>,
    event_stream: EventStream,
    dead_letter_count: AtomicU64,
    terminated: AtomicBool,
}

impl Drop for SystemInner {
    fn drop(&mut self) {
        // Tasks on the runtime hold their cells; stopping it breaks the cycle
        self.concurrent.shutdown();
    }
}

/// Container of actors and the services they share
///
/// Cheap to clone; all clones refer to the same system.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// Create a system from a validated configuration
    pub fn new(config: ProbekitConfig) -> Result<Self> {
        config.validate()?;

        let concurrent = Arc::new(TokioDispatcher::new(
            &config.system.name,
            config.system.worker_threads_count,
        ));

        info!(
            name = %config.system.name,
            time_factor = config.testkit.time_factor,
            "Actor system created"
        );

        Ok(Self {
            inner: Arc::new(SystemInner {
                config,
                cells: Mutex::new(HashMap::new()),
                calling_thread: Arc::new(CallingThreadDispatcher::new()),
                concurrent,
                event_stream: EventStream::new(),
                dead_letter_count: AtomicU64::new(0),
                terminated: AtomicBool::new(false),
            }),
        })
    }

    /// Create a system with the given name and default settings
    pub fn with_name(name: impl Into<String>) -> Result<Self> {
        let mut config = ProbekitConfig::default();
        config.system.name = name.into();
        Self::new(config)
    }

    pub(crate) fn from_inner(inner: Arc<SystemInner>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.system.name
    }

    pub fn config(&self) -> &ProbekitConfig {
        &self.inner.config
    }

    pub fn event_stream(&self) -> &EventStream {
        &self.inner.event_stream
    }

    /// The shared calling-thread dispatcher
    pub fn calling_thread_dispatcher(&self) -> &Arc<CallingThreadDispatcher> {
        &self.inner.calling_thread
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Number of live actors
    pub fn actor_count(&self) -> usize {
        self.inner.cells.lock().len()
    }

    // =========================================================================
    // Actors
    // =========================================================================

    /// Create and start an actor
    ///
    /// Without a name the actor gets a generated `$`-prefixed one.
    pub fn spawn(&self, props: Props, name: Option<&str>) -> Result<ActorRef> {
        self.spawn_cell(props, name).map(|cell| cell.actor_ref())
    }

    pub(crate) fn spawn_cell(&self, props: Props, name: Option<&str>) -> Result<Arc<ActorCell>> {
        if self.is_terminated() {
            return Err(Error::SystemTerminated {
                name: self.name().to_string(),
            });
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => format!("${}", uuid::Uuid::new_v4().simple()),
        };
        let id = ActorId::new(self.name(), name)?;

        let dispatcher: Arc<dyn Dispatcher> = match props.dispatcher() {
            DispatcherKind::Default => self.inner.concurrent.clone(),
            DispatcherKind::CallingThread => self.inner.calling_thread.clone(),
        };
        let cell = ActorCell::new(id.clone(), props, dispatcher, Arc::downgrade(&self.inner));

        {
            let mut cells = self.inner.cells.lock();
            if cells.contains_key(&id) {
                return Err(Error::ActorAlreadyExists { id: id.to_string() });
            }
            if cells.len() >= ACTOR_CONCURRENT_COUNT_MAX {
                return Err(Error::internal(format!(
                    "actor count limit {} reached",
                    ACTOR_CONCURRENT_COUNT_MAX
                )));
            }
            cells.insert(id.clone(), Arc::clone(&cell));
        }

        match cell.start() {
            Ok(()) => Ok(cell),
            Err(e) if e.is_interrupted() => {
                interrupt::interrupt_current();
                Ok(cell)
            }
            Err(e) => {
                self.remove_cell(&id);
                Err(e)
            }
        }
    }

    /// Find a live actor by name
    pub fn lookup(&self, name: &str) -> Option<ActorRef> {
        let id = ActorId::new(self.name(), name).ok()?;
        self.inner.cells.lock().get(&id).map(|cell| cell.actor_ref())
    }

    pub(crate) fn cell(&self, id: &ActorId) -> Option<Arc<ActorCell>> {
        self.inner.cells.lock().get(id).cloned()
    }

    pub(crate) fn remove_cell(&self, id: &ActorId) {
        self.inner.cells.lock().remove(id);
    }

    /// Stop an actor after the messages already queued for it
    pub fn stop(&self, actor: &ActorRef) {
        actor.tell(PoisonPill, None);
    }

    // =========================================================================
    // Death watch
    // =========================================================================

    /// Deliver `Terminated` to `watcher` when `target` stops
    ///
    /// If `target` already stopped, `Terminated` is sent right away.
    pub fn watch(&self, watcher: &ActorRef, target: &ActorRef) -> Result<()> {
        let registered = match self.cell(target.id()) {
            Some(cell) => cell.add_watcher(watcher.clone()),
            None => false,
        };

        if registered {
            if let Some(watcher_cell) = self.cell(watcher.id()) {
                watcher_cell.note_watching(target);
            }
            debug!(watcher = %watcher.id(), target = %target.id(), "Watching");
        } else {
            watcher.tell(
                Terminated {
                    actor: target.clone(),
                },
                Some(target),
            );
        }
        Ok(())
    }

    /// Stop delivering `Terminated` for `target` to `watcher`
    pub fn unwatch(&self, watcher: &ActorRef, target: &ActorRef) -> Result<()> {
        self.remove_watcher(target, watcher);
        if let Some(watcher_cell) = self.cell(watcher.id()) {
            watcher_cell.note_unwatching(target);
        }
        Ok(())
    }

    pub(crate) fn remove_watcher(&self, target: &ActorRef, watcher: &ActorRef) {
        if let Some(cell) = self.cell(target.id()) {
            cell.remove_watcher(watcher);
        }
    }

    // =========================================================================
    // Dead letters and scheduling
    // =========================================================================

    /// Total messages that could not be delivered
    pub fn dead_letter_count(&self) -> u64 {
        self.inner.dead_letter_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_dead_letter(&self, envelope: &Envelope, recipient: &str) {
        let count = self.inner.dead_letter_count.fetch_add(1, Ordering::Relaxed) + 1;
        let sender = envelope
            .sender
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "no sender".to_string());

        self.inner.event_stream.publish(LogEvent::new(
            LogLevel::Info,
            recipient,
            format!(
                "Message [{}] from {} to {} was not delivered. [{}] dead letters encountered.",
                envelope.message.type_name(),
                sender,
                recipient,
                count
            ),
        ));
    }

    /// Run `task` after `delay` on the system's timer
    pub fn schedule_once(&self, delay: Duration, task: Task) {
        self.inner.concurrent.schedule_once(delay, task);
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop every actor and the concurrent dispatcher
    ///
    /// Waits a bounded time for actors to process their stop request. Must
    /// not be called from inside an actor.
    pub fn shutdown(&self) {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        let cells: Vec<Arc<ActorCell>> = self.inner.cells.lock().values().cloned().collect();
        info!(name = %self.name(), actors = cells.len(), "Shutting down actor system");
        for cell in &cells {
            cell.actor_ref().tell(PoisonPill, None);
        }

        let deadline = Instant::now() + Duration::from_millis(SHUTDOWN_WAIT_MS_MAX);
        while self.actor_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(SHUTDOWN_POLL_INTERVAL_MS));
        }

        let remaining = self.actor_count();
        if remaining > 0 {
            debug!(remaining, "Actors still running at shutdown");
            self.inner.cells.lock().clear();
        }
        self.inner.concurrent.shutdown();
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("name", &self.name())
            .field("actors", &self.actor_count())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
