//! Addressable test kits
//!
//! TigerStyle: A probe is a kit plus identity; nothing else is shared.

use crate::kit::TestKit;
use probekit_core::actor::ActorRef;
use probekit_core::error::{Error, Result};
use probekit_core::message::Message;
use probekit_runtime::ActorSystem;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

static PROBE_SEQ: AtomicU64 = AtomicU64::new(1);

/// A named test kit usable as a participant in a message flow
///
/// Dereferences to [`TestKit`] for every expectation.
///
/// # Deadlocks
/// The probe's receiving actor runs on the calling-thread dispatcher.
/// Delivery never blocks, but an expectation does: if the thread blocked in
/// `expect_*` currently owns an actor (for example a test calling it from
/// inside a handler or an auto-pilot), messages other threads send to that
/// actor wait in its pending queue until the owner unwinds, and the
/// expectation times out instead of seeing the reply.
pub struct TestProbe {
    kit: TestKit,
    name: String,
}

impl TestProbe {
    /// Create a probe named `test-probe-N`
    pub fn new(system: &ActorSystem) -> Result<Self> {
        let name = format!("test-probe-{}", PROBE_SEQ.fetch_add(1, Ordering::Relaxed));
        Self::with_name(system, &name)
    }

    /// Create a probe with a chosen actor name
    pub fn with_name(system: &ActorSystem, name: &str) -> Result<Self> {
        Ok(Self {
            kit: TestKit::with_actor_name(system, name)?,
            name: name.to_string(),
        })
    }

    /// Reference messages can be sent to
    pub fn actor_ref(&self) -> &ActorRef {
        self.kit.test_actor()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send `message` to `target` with the probe as sender
    pub fn send<M: Message>(&self, target: &ActorRef, message: M) {
        target.tell(message, Some(self.actor_ref()));
    }

    /// Answer the sender of the last received message
    pub fn reply<M: Message>(&self, message: M) -> Result<()> {
        let last = self.kit.last_message().ok_or(Error::NoLastMessage)?;
        let sender = last
            .sender
            .ok_or_else(|| Error::assertion("last message has no sender to reply to"))?;
        sender.tell(message, Some(self.actor_ref()));
        Ok(())
    }

    /// Pass the last received message on to `target`, keeping its sender
    pub fn forward(&self, target: &ActorRef) -> Result<()> {
        let last = self.kit.last_message().ok_or(Error::NoLastMessage)?;
        target.forward(&last);
        Ok(())
    }

    /// Send `message` to `target` as if the last sender had sent it
    pub fn forward_msg<M: Message>(&self, target: &ActorRef, message: M) {
        target.tell(message, self.kit.last_sender().as_ref());
    }
}

impl Deref for TestProbe {
    type Target = TestKit;

    fn deref(&self) -> &TestKit {
        &self.kit
    }
}

impl std::fmt::Debug for TestProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestProbe")
            .field("name", &self.name)
            .field("actor", self.actor_ref())
            .finish()
    }
}
