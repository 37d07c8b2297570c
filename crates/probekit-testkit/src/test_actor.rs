//! The receiving actor behind every test kit
//!
//! TigerStyle: Control messages travel through the mailbox, so filter and
//! pilot changes take effect in order with ordinary traffic.

use crate::queue::MessageQueue;
use parking_lot::Mutex;
use probekit_core::error::Result;
use probekit_core::message::{AnyMessage, Envelope};
use probekit_runtime::{Actor, ActorContext};
use std::fmt;
use std::sync::Arc;

/// Predicate deciding which messages never reach the queue
pub type IgnoreFilter = Arc<dyn Fn(&AnyMessage) -> bool + Send + Sync>;

type PilotFn = Box<dyn FnMut(&mut ActorContext<'_>, &AnyMessage) -> AutoPilot + Send>;

/// Reacts to messages before they become visible to expectations
///
/// The value a pilot returns replaces it: `KeepRunning` keeps the current
/// pilot, `NoAutoPilot` switches auto-piloting off, and another `Pilot`
/// takes over for the next message.
#[derive(Default)]
pub enum AutoPilot {
    #[default]
    NoAutoPilot,
    KeepRunning,
    Pilot(PilotFn),
}

impl AutoPilot {
    /// Wrap a pilot function
    pub fn new<F>(pilot: F) -> Self
    where
        F: FnMut(&mut ActorContext<'_>, &AnyMessage) -> AutoPilot + Send + 'static,
    {
        AutoPilot::Pilot(Box::new(pilot))
    }

    /// A pilot that runs `f` for every message and never hands over
    pub fn keep_running<F>(mut f: F) -> Self
    where
        F: FnMut(&mut ActorContext<'_>, &AnyMessage) + Send + 'static,
    {
        Self::new(move |ctx, message| {
            f(ctx, message);
            AutoPilot::KeepRunning
        })
    }

    fn run(self, ctx: &mut ActorContext<'_>, message: &AnyMessage) -> AutoPilot {
        match self {
            AutoPilot::Pilot(mut pilot) => match pilot(ctx, message) {
                AutoPilot::KeepRunning => AutoPilot::Pilot(pilot),
                next => next,
            },
            idle => idle,
        }
    }
}

impl fmt::Debug for AutoPilot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoPilot::NoAutoPilot => f.write_str("NoAutoPilot"),
            AutoPilot::KeepRunning => f.write_str("KeepRunning"),
            AutoPilot::Pilot(_) => f.write_str("Pilot(..)"),
        }
    }
}

// =============================================================================
// Control messages
// =============================================================================

/// Install or clear the ignore filter
#[derive(Clone)]
pub(crate) struct SetIgnore(pub(crate) Option<IgnoreFilter>);

impl fmt::Debug for SetIgnore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.0.is_some() { "Some(..)" } else { "None" };
        write!(f, "SetIgnore({})", state)
    }
}

/// Replace the auto-pilot
///
/// The pilot is taken out on delivery; a second delivery of the same
/// message is a no-op.
pub(crate) struct SetAutoPilot(pub(crate) Mutex<Option<AutoPilot>>);

impl SetAutoPilot {
    pub(crate) fn new(pilot: AutoPilot) -> Self {
        Self(Mutex::new(Some(pilot)))
    }
}

impl fmt::Debug for SetAutoPilot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SetAutoPilot(..)")
    }
}

// =============================================================================
// TestActor
// =============================================================================

/// Runs the auto-pilot, applies the ignore filter and queues the rest
pub(crate) struct TestActor {
    queue: Arc<MessageQueue>,
    ignore: Option<IgnoreFilter>,
    pilot: AutoPilot,
}

impl TestActor {
    pub(crate) fn new(queue: Arc<MessageQueue>) -> Self {
        Self {
            queue,
            ignore: None,
            pilot: AutoPilot::NoAutoPilot,
        }
    }
}

impl Actor for TestActor {
    fn receive(&mut self, ctx: &mut ActorContext<'_>, message: AnyMessage) -> Result<()> {
        if let Some(SetIgnore(filter)) = message.downcast_ref::<SetIgnore>() {
            self.ignore = filter.clone();
            return Ok(());
        }
        if let Some(set) = message.downcast_ref::<SetAutoPilot>() {
            if let Some(pilot) = set.0.lock().take() {
                tracing::debug!(actor_id = %ctx.self_ref().id(), ?pilot, "Auto-pilot replaced");
                self.pilot = pilot;
            }
            return Ok(());
        }

        let pilot = std::mem::take(&mut self.pilot);
        self.pilot = pilot.run(ctx, &message);

        let ignored = self.ignore.as_ref().is_some_and(|filter| filter(&message));
        if ignored {
            tracing::trace!(actor_id = %ctx.self_ref().id(), ?message, "Ignored");
        } else {
            self.queue
                .push_back(Envelope::new(message, ctx.sender().cloned()));
        }
        Ok(())
    }
}
