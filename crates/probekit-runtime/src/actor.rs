//! Actor trait, context and props
//!
//! TigerStyle: Actors own their state; every side effect goes through the
//! context so the cell can order it after the handler returns.

use crate::cell::ActorCell;
use crate::system::ActorSystem;
use probekit_core::actor::ActorRef;
use probekit_core::error::{Error, Result};
use probekit_core::message::{AnyMessage, Envelope, Message};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Downcasting support for boxed actors
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What the cell does after `receive` fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorDirective {
    /// Keep the current instance and state
    Resume,
    /// Replace the instance with a fresh one from the props factory
    Restart,
    /// Stop the actor
    Stop,
}

/// Message-handling logic
///
/// Handlers run with exclusive access to `self`: one message at a time,
/// whichever dispatcher the actor is attached to.
pub trait Actor: AsAny + Send + 'static {
    /// Called once before the first message
    fn pre_start(&mut self, _ctx: &mut ActorContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Handle one message
    fn receive(&mut self, ctx: &mut ActorContext<'_>, message: AnyMessage) -> Result<()>;

    /// Called once after the actor stopped
    fn post_stop(&mut self, _ctx: &mut ActorContext<'_>) {}

    /// Called on the failing instance before it is replaced
    fn pre_restart(&mut self, _ctx: &mut ActorContext<'_>, _reason: &Error) {}

    /// Decide how to handle a failure of `receive`
    fn on_failure(&self, _error: &Error) -> SupervisorDirective {
        SupervisorDirective::Restart
    }
}

/// Which dispatcher an actor is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatcherKind {
    /// The system's tokio-backed concurrent dispatcher
    #[default]
    Default,
    /// The reentrant calling-thread dispatcher
    CallingThread,
}

type ActorFactory = Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

/// Recipe for creating (and re-creating) an actor
#[derive(Clone)]
pub struct Props {
    factory: ActorFactory,
    dispatcher: DispatcherKind,
    receive_timeout_enabled: bool,
}

impl Props {
    /// Props for actors produced by `factory`
    pub fn new<A, F>(factory: F) -> Self
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Actor>),
            dispatcher: DispatcherKind::Default,
            receive_timeout_enabled: true,
        }
    }

    /// Select the dispatcher
    pub fn with_dispatcher(mut self, dispatcher: DispatcherKind) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Attach to the calling-thread dispatcher
    pub fn calling_thread(self) -> Self {
        self.with_dispatcher(DispatcherKind::CallingThread)
    }

    /// Ignore `set_receive_timeout` requests
    pub fn without_receive_timeout(mut self) -> Self {
        self.receive_timeout_enabled = false;
        self
    }

    pub fn dispatcher(&self) -> DispatcherKind {
        self.dispatcher
    }

    pub fn receive_timeout_enabled(&self) -> bool {
        self.receive_timeout_enabled
    }

    pub(crate) fn create(&self) -> Box<dyn Actor> {
        (self.factory)()
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("dispatcher", &self.dispatcher)
            .field("receive_timeout_enabled", &self.receive_timeout_enabled)
            .finish_non_exhaustive()
    }
}

/// Per-message view of the actor's cell
pub struct ActorContext<'a> {
    cell: &'a Arc<ActorCell>,
    sender: Option<ActorRef>,
    stop_requested: bool,
}

impl<'a> ActorContext<'a> {
    pub(crate) fn new(cell: &'a Arc<ActorCell>, sender: Option<ActorRef>) -> Self {
        Self {
            cell,
            sender,
            stop_requested: false,
        }
    }

    /// Reference to the actor being run
    pub fn self_ref(&self) -> ActorRef {
        self.cell.actor_ref()
    }

    /// Sender of the current message
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    /// Send a message back to the current sender
    ///
    /// Without a sender the reply becomes a dead letter.
    pub fn reply<M: Message>(&self, message: M) {
        let me = self.self_ref();
        match &self.sender {
            Some(sender) => sender.tell(message, Some(&me)),
            None => {
                if let Ok(system) = self.system() {
                    system.record_dead_letter(&Envelope::of(message, Some(me)), "no sender");
                }
            }
        }
    }

    /// The owning actor system
    pub fn system(&self) -> Result<ActorSystem> {
        self.cell.system()
    }

    /// Spawn a child on this actor's dispatcher
    pub fn spawn(&self, props: Props, name: Option<&str>) -> Result<ActorRef> {
        let props = props.with_dispatcher(self.cell.dispatcher_kind());
        self.system()?.spawn(props, name)
    }

    /// Receive `Terminated` when `target` stops
    pub fn watch(&self, target: &ActorRef) -> Result<()> {
        self.system()?.watch(&self.self_ref(), target)
    }

    /// Stop receiving `Terminated` for `target`
    pub fn unwatch(&self, target: &ActorRef) -> Result<()> {
        self.system()?.unwatch(&self.self_ref(), target)
    }

    /// Stop after the current message
    pub fn stop_self(&mut self) {
        self.stop_requested = true;
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Deliver `ReceiveTimeout` after `timeout` without messages (`None` disables)
    pub fn set_receive_timeout(&self, timeout: Option<Duration>) {
        self.cell.set_receive_timeout(timeout);
    }
}
