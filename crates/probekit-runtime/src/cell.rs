//! Actor cell: one running actor instance plus its lifecycle state
//!
//! TigerStyle: Explicit lifecycle states, side effects performed after the
//! actor lock is released.
//!
//! ```text
//!   +----------+   pre_start ok   +---------+   stop    +----------+
//!   | Starting | ---------------> | Running | --------> | Stopped  |
//!   +----------+                  +---------+           +----------+
//!        |                                                   ^
//!        +------------------- pre_start failed --------------+
//! ```

use crate::actor::{Actor, ActorContext, DispatcherKind, Props, SupervisorDirective};
use crate::dispatcher::Dispatcher;
use crate::system::{ActorSystem, SystemInner};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use probekit_core::actor::{ActorId, ActorRef, MessageTarget};
use probekit_core::error::{Error, Result};
use probekit_core::logging::{LogEvent, LogLevel};
use probekit_core::message::{Envelope, PoisonPill, ReceiveTimeout, Terminated};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Lifecycle state of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// `pre_start` has not completed yet
    #[default]
    Starting,
    /// Processing messages
    Running,
    /// Stopped for good; deliveries become dead letters
    Stopped,
}

impl LifecycleState {
    /// Check if the transition is allowed
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        match (self, next) {
            (LifecycleState::Starting, LifecycleState::Running) => true,
            (LifecycleState::Starting, LifecycleState::Stopped) => true,
            (LifecycleState::Running, LifecycleState::Stopped) => true,
            _ if *self == next => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

/// What to do once the actor lock is released
enum Outcome {
    Continue,
    Stop(Option<Box<dyn Actor>>),
}

/// Target behind every `ActorRef` to a cell; does not keep the cell alive
struct CellTarget {
    id: ActorId,
    cell: Weak<ActorCell>,
    system: Weak<SystemInner>,
}

impl MessageTarget for CellTarget {
    fn deliver(&self, envelope: Envelope) -> Result<()> {
        match self.cell.upgrade() {
            Some(cell) => cell.deliver(envelope),
            None => {
                if let Some(inner) = self.system.upgrade() {
                    ActorSystem::from_inner(inner).record_dead_letter(&envelope, &self.id.to_string());
                }
                Ok(())
            }
        }
    }

    fn is_terminated(&self) -> bool {
        self.cell
            .upgrade()
            .map_or(true, |cell| cell.is_terminated())
    }
}

/// Runtime container of one actor
pub struct ActorCell {
    id: ActorId,
    self_weak: Weak<ActorCell>,
    self_ref: ActorRef,
    actor: Mutex<Option<Box<dyn Actor>>>,
    props: Props,
    dispatcher: Arc<dyn Dispatcher>,
    system: Weak<SystemInner>,
    state: Mutex<LifecycleState>,
    /// Locked while flipping `terminated` so late watchers are told at once
    watchers: Mutex<HashSet<ActorRef>>,
    watching: Mutex<HashSet<ActorRef>>,
    receive_timeout: Mutex<Option<Duration>>,
    receive_timeout_generation: AtomicU64,
    terminated: AtomicBool,
    invocation_count: AtomicU64,
}

impl ActorCell {
    pub(crate) fn new(
        id: ActorId,
        props: Props,
        dispatcher: Arc<dyn Dispatcher>,
        system: Weak<SystemInner>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| {
            let target = CellTarget {
                id: id.clone(),
                cell: self_weak.clone(),
                system: system.clone(),
            };
            Self {
                self_ref: ActorRef::new(id.clone(), Arc::new(target)),
                id,
                self_weak: self_weak.clone(),
                actor: Mutex::new(None),
                props,
                dispatcher,
                system,
                state: Mutex::new(LifecycleState::Starting),
                watchers: Mutex::new(HashSet::new()),
                watching: Mutex::new(HashSet::new()),
                receive_timeout: Mutex::new(None),
                receive_timeout_generation: AtomicU64::new(0),
                terminated: AtomicBool::new(false),
                invocation_count: AtomicU64::new(0),
            }
        })
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Reference to this actor
    pub fn actor_ref(&self) -> ActorRef {
        self.self_ref.clone()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Messages handed to the actor so far
    pub fn invocation_count(&self) -> u64 {
        self.invocation_count.load(Ordering::Relaxed)
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub(crate) fn dispatcher_kind(&self) -> DispatcherKind {
        self.props.dispatcher()
    }

    pub(crate) fn system(&self) -> Result<ActorSystem> {
        self.system
            .upgrade()
            .map(ActorSystem::from_inner)
            .ok_or_else(|| Error::SystemTerminated {
                name: self.id.namespace().to_string(),
            })
    }

    /// Typed access to the running instance
    pub(crate) fn typed_actor<A: Actor>(&self) -> Result<MappedMutexGuard<'_, A>> {
        let guard = self.actor.lock();
        if guard.is_none() {
            return Err(Error::ActorTerminated {
                id: self.id.to_string(),
            });
        }
        MutexGuard::try_map(guard, |slot| {
            slot.as_mut()
                .and_then(|actor| (**actor).as_any_mut().downcast_mut::<A>())
        })
        .map_err(|_| Error::ActorTypeMismatch {
            id: self.id.to_string(),
            expected: std::any::type_name::<A>().to_string(),
        })
    }

    /// Hand an envelope to the dispatcher
    pub(crate) fn deliver(self: &Arc<Self>, envelope: Envelope) -> Result<()> {
        if self.is_terminated() {
            self.dead_letter(envelope);
            return Ok(());
        }
        self.dispatcher.dispatch(self, envelope)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the instance and run `pre_start`
    ///
    /// Deliveries made meanwhile (including self-sends from `pre_start`) are
    /// held back and processed once the actor is running.
    pub(crate) fn start(self: &Arc<Self>) -> Result<()> {
        self.dispatcher.attach(self)?;
        self.dispatcher.suspend(self);

        let mut actor = self.props.create();
        let mut ctx = ActorContext::new(self, None);
        let started = actor.pre_start(&mut ctx);
        let stop_requested = ctx.stop_requested();

        match started {
            Ok(()) => {
                *self.actor.lock() = Some(actor);
                self.transition(LifecycleState::Running);
                debug!(actor_id = %self.id, dispatcher = self.dispatcher.name(), "Actor started");
                if stop_requested {
                    self.self_ref.tell(PoisonPill, None);
                }
                self.dispatcher.resume(self)
            }
            Err(e) => {
                self.publish_failure(&e, "pre_start failed");
                self.finish_stop(None);
                Err(Error::actor_failed(self.id.to_string(), e.to_string()))
            }
        }
    }

    /// Process one envelope with supervision
    pub(crate) fn invoke(self: &Arc<Self>, envelope: Envelope) -> Result<()> {
        if self.is_terminated() {
            self.dead_letter(envelope);
            return Ok(());
        }

        if envelope.message.is::<PoisonPill>() {
            let actor = self.actor.lock().take();
            self.finish_stop(actor);
            return Ok(());
        }

        self.invocation_count.fetch_add(1, Ordering::Relaxed);
        let mut interrupted = false;

        let outcome = {
            let mut guard = self.actor.lock();
            let Some(actor) = guard.as_mut() else {
                self.dead_letter(envelope);
                return Ok(());
            };

            let mut ctx = ActorContext::new(self, envelope.sender.clone());
            let result = actor.receive(&mut ctx, envelope.message);

            let failure = match result {
                Ok(()) => None,
                Err(e) if e.is_interrupted() => {
                    interrupted = true;
                    None
                }
                Err(e) => {
                    let directive = actor.on_failure(&e);
                    debug!(actor_id = %self.id, ?directive, error = %e, "Supervising failure");
                    self.publish_failure(&e, "receive failed");
                    Some((directive, e))
                }
            };

            match failure {
                Some((SupervisorDirective::Stop, _)) => Outcome::Stop(guard.take()),
                Some((SupervisorDirective::Restart, reason)) => {
                    actor.pre_restart(&mut ctx, &reason);
                    let mut fresh = self.props.create();
                    let mut restart_ctx = ActorContext::new(self, None);
                    match fresh.pre_start(&mut restart_ctx) {
                        Ok(()) => {
                            *guard = Some(fresh);
                            info!(actor_id = %self.id, "Actor restarted");
                            Outcome::Continue
                        }
                        Err(e) => {
                            self.publish_failure(&e, "pre_start failed on restart");
                            Outcome::Stop(guard.take())
                        }
                    }
                }
                _ if ctx.stop_requested() => Outcome::Stop(guard.take()),
                _ => Outcome::Continue,
            }
        };

        match outcome {
            Outcome::Continue => self.arm_receive_timeout(),
            Outcome::Stop(actor) => self.finish_stop(actor),
        }

        if interrupted {
            return Err(Error::interrupted(format!("actor {}", self.id)));
        }
        Ok(())
    }

    /// Run the handler directly, bypassing mailbox and supervision
    pub(crate) fn receive_direct(self: &Arc<Self>, envelope: Envelope) -> Result<()> {
        let (result, stop) = {
            let mut guard = self.actor.lock();
            let Some(actor) = guard.as_mut() else {
                return Err(Error::ActorTerminated {
                    id: self.id.to_string(),
                });
            };
            self.invocation_count.fetch_add(1, Ordering::Relaxed);
            let mut ctx = ActorContext::new(self, envelope.sender.clone());
            let result = actor.receive(&mut ctx, envelope.message);
            let stop = ctx.stop_requested().then(|| guard.take());
            (result, stop)
        };

        if let Some(actor) = stop {
            self.finish_stop(actor);
        }
        result
    }

    /// Stop now: run `post_stop`, drop leftovers, notify watchers
    fn finish_stop(self: &Arc<Self>, actor: Option<Box<dyn Actor>>) {
        {
            let _watchers = self.watchers.lock();
            if self.terminated.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        self.transition(LifecycleState::Stopped);
        self.receive_timeout_generation.fetch_add(1, Ordering::SeqCst);

        if let Some(mut actor) = actor {
            let mut ctx = ActorContext::new(self, None);
            actor.post_stop(&mut ctx);
        }

        for envelope in self.dispatcher.detach(&self.id) {
            self.dead_letter(envelope);
        }

        let system = self.system().ok();
        if let Some(system) = &system {
            system.remove_cell(&self.id);
            for target in std::mem::take(&mut *self.watching.lock()) {
                system.remove_watcher(&target, &self.self_ref);
            }
        }

        let watchers = std::mem::take(&mut *self.watchers.lock());
        debug!(actor_id = %self.id, watchers = watchers.len(), "Actor stopped");
        for watcher in watchers {
            watcher.tell(
                Terminated {
                    actor: self.self_ref.clone(),
                },
                Some(&self.self_ref),
            );
        }
    }

    fn transition(&self, next: LifecycleState) {
        let mut state = self.state.lock();
        debug_assert!(
            state.can_transition_to(next),
            "invalid transition {} -> {}",
            *state,
            next
        );
        *state = next;
    }

    // =========================================================================
    // Death watch
    // =========================================================================

    /// Register a watcher; `false` if the actor already stopped
    pub(crate) fn add_watcher(&self, watcher: ActorRef) -> bool {
        let mut watchers = self.watchers.lock();
        if self.is_terminated() {
            return false;
        }
        watchers.insert(watcher);
        true
    }

    pub(crate) fn remove_watcher(&self, watcher: &ActorRef) {
        self.watchers.lock().remove(watcher);
    }

    pub(crate) fn note_watching(&self, target: &ActorRef) {
        self.watching.lock().insert(target.clone());
    }

    pub(crate) fn note_unwatching(&self, target: &ActorRef) {
        self.watching.lock().remove(target);
    }

    // =========================================================================
    // Receive timeout
    // =========================================================================

    pub(crate) fn set_receive_timeout(&self, timeout: Option<Duration>) {
        if !self.props.receive_timeout_enabled() {
            debug!(actor_id = %self.id, ?timeout, "Receive timeout ignored");
            return;
        }
        *self.receive_timeout.lock() = timeout;
        self.receive_timeout_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Schedule `ReceiveTimeout`; any later message invalidates it
    fn arm_receive_timeout(&self) {
        let Some(timeout) = *self.receive_timeout.lock() else {
            return;
        };
        let Ok(system) = self.system() else {
            return;
        };

        let generation = self.receive_timeout_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = self.self_weak.clone();
        system.schedule_once(
            timeout,
            Box::new(move || {
                if let Some(cell) = weak.upgrade() {
                    let current = cell.receive_timeout_generation.load(Ordering::SeqCst);
                    if current == generation && !cell.is_terminated() {
                        cell.self_ref.tell(ReceiveTimeout, None);
                    }
                }
            }),
        );
    }

    // =========================================================================
    // Dead letters and failures
    // =========================================================================

    pub(crate) fn dead_letter(&self, envelope: Envelope) {
        match self.system() {
            Ok(system) => system.record_dead_letter(&envelope, &self.id.to_string()),
            Err(_) => debug!(actor_id = %self.id, "Dead letter after system shutdown"),
        }
    }

    fn publish_failure(&self, error: &Error, context: &str) {
        if let Ok(system) = self.system() {
            system.event_stream().publish(
                LogEvent::new(
                    LogLevel::Error,
                    self.id.to_string(),
                    format!("{}: {}", context, error),
                )
                .with_cause(error),
            );
        }
    }
}

impl std::fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorCell")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("dispatcher", &self.dispatcher.name())
            .finish()
    }
}
