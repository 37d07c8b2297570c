//! Message dispatchers
//!
//! TigerStyle: Single-threaded per-actor execution, explicit ownership,
//! iterative draining (no recursion).
//!
//! `CallingThreadDispatcher` runs every delivery synchronously on the thread
//! that sends it. The first thread to deliver to an idle actor becomes its
//! owner and drains the mailbox, including messages the actor sends to
//! itself along the way. Threads arriving while another thread owns the
//! actor (or while it is suspended) park their envelopes in a per-thread
//! pending queue; the owner merges those queues whenever its mailbox runs
//! dry, and `resume` merges them eagerly.

use crate::cell::ActorCell;
use crate::mailbox::Mailbox;
use parking_lot::Mutex;
use probekit_core::actor::ActorId;
use probekit_core::error::{Error, Result};
use probekit_core::interrupt;
use probekit_core::message::Envelope;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A unit of work handed to a dispatcher
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedules actor processing
///
/// Delivery never fails for the caller. The only error a dispatcher may
/// return is the deferred `Error::Interrupted` signal.
pub trait Dispatcher: Send + Sync {
    /// Name for diagnostics
    fn name(&self) -> &'static str;

    /// Create the per-actor state
    fn attach(&self, cell: &Arc<ActorCell>) -> Result<()>;

    /// Remove the per-actor state, returning undelivered envelopes
    fn detach(&self, id: &ActorId) -> Vec<Envelope>;

    /// Deliver an envelope
    fn dispatch(&self, cell: &Arc<ActorCell>, envelope: Envelope) -> Result<()>;

    /// Stop processing after the current message; deliveries keep queueing
    fn suspend(&self, cell: &ActorCell);

    /// Undo `suspend` and process everything queued meanwhile
    fn resume(&self, cell: &Arc<ActorCell>) -> Result<()>;

    /// Run a task
    fn execute(&self, task: Task);

    /// Run a task after `delay`
    fn schedule_once(&self, delay: Duration, task: Task);
}

// =============================================================================
// CallingThreadDispatcher
// =============================================================================

/// Per-actor dispatcher state
#[derive(Debug, Default)]
struct ActorSlot {
    mailbox: Mailbox,
    /// Thread currently draining the mailbox
    owner: Option<ThreadId>,
    suspended: bool,
    /// Envelopes from non-owning threads, one queue per thread in arrival order
    pending: Vec<(ThreadId, VecDeque<Envelope>)>,
}

impl ActorSlot {
    fn enqueue_pending(&mut self, thread: ThreadId, envelope: Envelope) {
        match self.pending.iter_mut().find(|(t, _)| *t == thread) {
            Some((_, queue)) => queue.push_back(envelope),
            None => self.pending.push((thread, VecDeque::from([envelope]))),
        }
    }

    fn merge_pending(&mut self) {
        for (_, queue) in self.pending.drain(..) {
            self.mailbox.push_all(queue);
        }
    }

    fn pending_len(&self) -> usize {
        self.pending.iter().map(|(_, q)| q.len()).sum()
    }
}

/// Reentrant dispatcher running everything on the delivering thread
///
/// Guarantees:
/// - at most one thread runs a given actor at any instant
/// - envelopes from one thread are processed in the order that thread sent them
/// - same-thread self-sends are processed in strict enqueue order, after the
///   current message, without recursion
///
/// No ordering is guaranteed between envelopes from different threads.
#[derive(Debug, Default)]
pub struct CallingThreadDispatcher {
    slots: Mutex<HashMap<ActorId, ActorSlot>>,
}

/// Where a delivery went
enum Route {
    /// The caller claimed ownership and must drain
    Drain,
    /// Queued for the owner or a later `resume`
    Queued,
    /// No such actor attached
    DeadLetter(Envelope),
}

/// Clears ownership if the drain loop unwinds
struct OwnershipGuard<'a> {
    dispatcher: &'a CallingThreadDispatcher,
    id: &'a ActorId,
    armed: bool,
}

impl OwnershipGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for OwnershipGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let me = thread::current().id();
        let mut slots = self.dispatcher.slots.lock();
        if let Some(slot) = slots.get_mut(self.id) {
            if slot.owner == Some(me) {
                slot.owner = None;
            }
        }
        warn!(actor_id = %self.id, "Drain loop unwound, ownership released");
    }
}

impl CallingThreadDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of envelopes queued for an actor (mailbox plus pending)
    pub fn queued_count(&self, id: &ActorId) -> usize {
        self.slots
            .lock()
            .get(id)
            .map(|slot| slot.mailbox.len() + slot.pending_len())
            .unwrap_or(0)
    }

    /// Whether any thread currently runs the actor
    pub fn is_owned(&self, id: &ActorId) -> bool {
        self.slots
            .lock()
            .get(id)
            .map(|slot| slot.owner.is_some())
            .unwrap_or(false)
    }

    /// Whether the actor is suspended
    pub fn is_suspended(&self, id: &ActorId) -> bool {
        self.slots
            .lock()
            .get(id)
            .map(|slot| slot.suspended)
            .unwrap_or(false)
    }

    /// Run `f` while holding the actor's ownership
    ///
    /// Deliveries made by `f` on this thread queue up in the mailbox instead
    /// of running inline, and are drained once `f` returns. If another thread
    /// owns the actor, `f` runs without ownership.
    pub fn run_exclusive<R>(&self, cell: &Arc<ActorCell>, f: impl FnOnce() -> R) -> (R, Result<()>) {
        let me = thread::current().id();
        let claimed = {
            let mut slots = self.slots.lock();
            match slots.get_mut(cell.id()) {
                Some(slot) if slot.owner.is_none() => {
                    slot.owner = Some(me);
                    true
                }
                _ => false,
            }
        };

        if !claimed {
            return (f(), Ok(()));
        }

        let mut guard = OwnershipGuard {
            dispatcher: self,
            id: cell.id(),
            armed: true,
        };
        let value = f();
        guard.disarm();
        drop(guard);

        (value, self.drain(cell))
    }

    /// Run a future to completion on the current thread
    pub fn spawn_future<F: Future>(&self, future: F) -> F::Output {
        futures::executor::block_on(future)
    }

    /// Drain the mailbox of an actor owned by the current thread
    fn drain(&self, cell: &Arc<ActorCell>) -> Result<()> {
        let me = thread::current().id();
        let id = cell.id();
        let mut guard = OwnershipGuard {
            dispatcher: self,
            id,
            armed: true,
        };
        let mut interrupted = false;
        let mut processed: u64 = 0;

        loop {
            let next = {
                let mut slots = self.slots.lock();
                let Some(slot) = slots.get_mut(id) else {
                    // Detached while draining
                    guard.disarm();
                    break;
                };
                debug_assert_eq!(slot.owner, Some(me), "drain loop must own the actor");

                if slot.suspended {
                    slot.owner = None;
                    guard.disarm();
                    break;
                }
                if slot.mailbox.is_empty() {
                    slot.merge_pending();
                }
                match slot.mailbox.pop() {
                    Some(envelope) => envelope,
                    None => {
                        // Release atomically with the emptiness check
                        slot.owner = None;
                        guard.disarm();
                        break;
                    }
                }
            };

            match cell.invoke(next) {
                Ok(()) => {}
                Err(e) if e.is_interrupted() => interrupted = true,
                Err(e) => warn!(actor_id = %id, error = %e, "Invocation reported an error"),
            }
            if interrupt::take_interrupted() {
                interrupted = true;
            }
            processed += 1;
        }

        trace!(actor_id = %id, processed, "Drain loop finished");

        if interrupted {
            warn!(actor_id = %id, "Interrupted during calling-thread processing");
            return Err(Error::interrupted(format!(
                "calling-thread processing of {}",
                id
            )));
        }
        Ok(())
    }
}

impl Dispatcher for CallingThreadDispatcher {
    fn name(&self) -> &'static str {
        "calling-thread"
    }

    fn attach(&self, cell: &Arc<ActorCell>) -> Result<()> {
        let mut slots = self.slots.lock();
        if slots.contains_key(cell.id()) {
            return Err(Error::ActorAlreadyExists {
                id: cell.id().to_string(),
            });
        }
        slots.insert(cell.id().clone(), ActorSlot::default());
        debug!(actor_id = %cell.id(), "Attached to calling-thread dispatcher");
        Ok(())
    }

    fn detach(&self, id: &ActorId) -> Vec<Envelope> {
        let Some(mut slot) = self.slots.lock().remove(id) else {
            return Vec::new();
        };
        slot.merge_pending();
        slot.mailbox.drain()
    }

    fn dispatch(&self, cell: &Arc<ActorCell>, envelope: Envelope) -> Result<()> {
        let me = thread::current().id();
        let route = {
            let mut slots = self.slots.lock();
            match slots.get_mut(cell.id()) {
                None => Route::DeadLetter(envelope),
                Some(slot) => match slot.owner {
                    None if !slot.suspended => {
                        slot.mailbox.push(envelope);
                        slot.owner = Some(me);
                        Route::Drain
                    }
                    Some(owner) if owner == me => {
                        // Reentrant send; the active loop picks it up
                        slot.mailbox.push(envelope);
                        Route::Queued
                    }
                    // Suspended, or owned by another thread
                    _ => {
                        slot.enqueue_pending(me, envelope);
                        Route::Queued
                    }
                },
            }
        };

        match route {
            Route::Drain => self.drain(cell),
            Route::Queued => Ok(()),
            Route::DeadLetter(envelope) => {
                cell.dead_letter(envelope);
                Ok(())
            }
        }
    }

    fn suspend(&self, cell: &ActorCell) {
        if let Some(slot) = self.slots.lock().get_mut(cell.id()) {
            slot.suspended = true;
            debug!(actor_id = %cell.id(), "Suspended");
        }
    }

    fn resume(&self, cell: &Arc<ActorCell>) -> Result<()> {
        let me = thread::current().id();
        let claimed = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(cell.id()) else {
                return Ok(());
            };
            slot.suspended = false;
            slot.merge_pending();
            if slot.owner.is_none() {
                slot.owner = Some(me);
                true
            } else {
                false
            }
        };

        debug!(actor_id = %cell.id(), claimed, "Resumed");
        if claimed {
            self.drain(cell)
        } else {
            Ok(())
        }
    }

    fn execute(&self, task: Task) {
        task();
    }

    fn schedule_once(&self, delay: Duration, task: Task) {
        trace!(delay_ms = delay.as_millis() as u64, "Scheduled task runs immediately");
        task();
    }
}
