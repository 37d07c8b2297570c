//! Synchronous actor handle for unit tests
//!
//! TigerStyle: Everything runs on the calling thread; no hidden scheduling.

use crate::actor::{Actor, Props};
use crate::cell::{ActorCell, LifecycleState};
use crate::dispatcher::{CallingThreadDispatcher, Dispatcher};
use crate::system::ActorSystem;
use parking_lot::MappedMutexGuard;
use probekit_core::actor::{ActorId, ActorRef};
use probekit_core::error::{Error, Result};
use probekit_core::interrupt;
use probekit_core::message::{Envelope, Message, PoisonPill};
use std::marker::PhantomData;
use std::sync::Arc;

/// Handle to an actor running on the calling-thread dispatcher
///
/// Offers three ways in:
/// - `underlying_actor()` for direct access to the instance
/// - `tell` / `actor_ref()` behaving like any live reference, supervision
///   included
/// - `receive()` calling the handler directly, bypassing mailbox and
///   supervision so failures reach the caller
///
/// Receive timeouts are disabled for actors created this way.
///
/// # Deadlocks
/// The guard from `underlying_actor()` holds the actor's lock. Sending to the
/// actor on the same thread while the guard is alive deadlocks; drop the
/// guard first.
pub struct TestActorRef<A: Actor> {
    cell: Arc<ActorCell>,
    dispatcher: Arc<CallingThreadDispatcher>,
    _actor: PhantomData<fn() -> A>,
}

impl<A: Actor> TestActorRef<A> {
    /// Create an anonymous actor from `factory`
    pub fn new<F>(system: &ActorSystem, factory: F) -> Result<Self>
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::create(system, factory, None)
    }

    /// Create a named actor from `factory`
    pub fn with_name<F>(system: &ActorSystem, name: &str, factory: F) -> Result<Self>
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::create(system, factory, Some(name))
    }

    fn create<F>(system: &ActorSystem, factory: F, name: Option<&str>) -> Result<Self>
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        let props = Props::new(factory)
            .calling_thread()
            .without_receive_timeout();
        let cell = system.spawn_cell(props, name)?;
        Ok(Self {
            cell,
            dispatcher: Arc::clone(system.calling_thread_dispatcher()),
            _actor: PhantomData,
        })
    }

    /// A live reference to the actor
    pub fn actor_ref(&self) -> ActorRef {
        self.cell.actor_ref()
    }

    pub fn id(&self) -> &ActorId {
        self.cell.id()
    }

    /// Typed access to the current instance
    ///
    /// After a restart this is the fresh instance.
    pub fn underlying_actor(&self) -> Result<MappedMutexGuard<'_, A>> {
        self.cell.typed_actor::<A>()
    }

    /// Send through the dispatcher, exactly like `ActorRef::tell`
    pub fn tell<M: Message>(&self, message: M, sender: Option<&ActorRef>) {
        self.cell.actor_ref().tell(message, sender);
    }

    /// Send through the dispatcher, surfacing the deferred interruption
    pub fn try_tell<M: Message>(&self, message: M, sender: Option<&ActorRef>) -> Result<()> {
        self.cell.actor_ref().try_tell(message, sender)
    }

    /// Invoke the handler directly with `message`
    ///
    /// Errors from the handler are returned instead of being supervised.
    /// Messages the actor sends to itself meanwhile are processed after the
    /// handler returns.
    pub fn receive<M: Message>(&self, message: M, sender: Option<&ActorRef>) -> Result<()> {
        let envelope = Envelope::of(message, sender.cloned());
        let (result, drained) = self
            .dispatcher
            .run_exclusive(&self.cell, || self.cell.receive_direct(envelope));
        match (result, drained) {
            (Err(error), Err(Error::Interrupted { .. })) => {
                // The handler error wins; keep the interruption for the caller
                interrupt::interrupt_current();
                Err(error)
            }
            (result, drained) => {
                result?;
                drained
            }
        }
    }

    /// Hold back processing; deliveries keep queueing
    pub fn suspend(&self) {
        self.dispatcher.suspend(&self.cell);
    }

    /// Process everything queued while suspended
    pub fn resume(&self) -> Result<()> {
        self.dispatcher.resume(&self.cell)
    }

    /// Stop after the messages already queued
    pub fn stop(&self) {
        self.tell(PoisonPill, None);
    }

    pub fn is_terminated(&self) -> bool {
        self.cell.is_terminated()
    }

    pub fn state(&self) -> LifecycleState {
        self.cell.state()
    }

    /// Messages handed to the actor so far
    pub fn invocation_count(&self) -> u64 {
        self.cell.invocation_count()
    }
}

impl<A: Actor> std::fmt::Debug for TestActorRef<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestActorRef")
            .field("id", self.cell.id())
            .field("actor", &std::any::type_name::<A>())
            .finish()
    }
}
