//! Actor identity and references
//!
//! TigerStyle: Explicit types, assertions, bounded operations.

use crate::constants::*;
use crate::error::{Error, Result};
use crate::interrupt;
use crate::message::{AnyMessage, Envelope, Message};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// =============================================================================
// ActorId
// =============================================================================

/// Unique identifier for an actor
///
/// Actor IDs consist of a namespace (the owning system's name) and a name
/// unique within that system.
///
/// # TigerStyle
/// - Explicit validation on construction
/// - Immutable after creation
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ActorId {
    namespace: String,
    id: String,
}

impl ActorId {
    /// Create a new ActorId with validation
    ///
    /// # Errors
    /// Returns error if namespace or id exceeds length limits or contains invalid characters.
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let id = id.into();

        if namespace.is_empty() || id.is_empty() {
            return Err(Error::InvalidActorId {
                id: format!("{}:{}", namespace, id),
                reason: "namespace and id must not be empty".into(),
            });
        }

        if namespace.len() > ACTOR_NAMESPACE_LENGTH_BYTES_MAX {
            return Err(Error::InvalidActorId {
                id: format!("{}:{}", namespace, id),
                reason: format!(
                    "namespace length {} exceeds limit {}",
                    namespace.len(),
                    ACTOR_NAMESPACE_LENGTH_BYTES_MAX
                ),
            });
        }

        if id.len() > ACTOR_ID_LENGTH_BYTES_MAX {
            return Err(Error::ActorIdTooLong {
                length: id.len(),
                limit: ACTOR_ID_LENGTH_BYTES_MAX,
            });
        }

        // Alphanumeric, dash, underscore, dot, and `$` for generated names
        let valid_chars = |s: &str| {
            s.chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '$'))
        };

        if !valid_chars(&namespace) {
            return Err(Error::InvalidActorId {
                id: format!("{}:{}", namespace, id),
                reason: "namespace contains invalid characters".into(),
            });
        }

        if !valid_chars(&id) {
            return Err(Error::InvalidActorId {
                id: format!("{}:{}", namespace, id),
                reason: "id contains invalid characters".into(),
            });
        }

        Ok(Self { namespace, id })
    }

    /// Get the namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the full qualified name (namespace:id)
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.namespace, self.id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

// =============================================================================
// MessageTarget
// =============================================================================

/// Anything an `ActorRef` can deliver envelopes to
///
/// The runtime implements this for actor cells. Delivery is fire-and-forget;
/// the only error a target may report is the deferred interruption signal.
pub trait MessageTarget: Send + Sync {
    /// Deliver an envelope
    fn deliver(&self, envelope: Envelope) -> Result<()>;

    /// Whether the target has stopped for good
    fn is_terminated(&self) -> bool;
}

// =============================================================================
// ActorRef
// =============================================================================

/// Location-transparent reference to an actor
///
/// References can be cloned and shared across threads. Equality and hashing
/// use the actor ID only.
#[derive(Clone)]
pub struct ActorRef {
    id: ActorId,
    target: Arc<dyn MessageTarget>,
}

impl ActorRef {
    /// Create a new reference
    pub fn new(id: ActorId, target: Arc<dyn MessageTarget>) -> Self {
        Self { id, target }
    }

    /// Get the actor's ID
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Get the actor's name within its system
    pub fn name(&self) -> &str {
        self.id.id()
    }

    /// Whether the referenced actor has stopped
    pub fn is_terminated(&self) -> bool {
        self.target.is_terminated()
    }

    /// Send a message (fire-and-forget)
    ///
    /// A deferred interruption raised while the message was processed inline
    /// is re-signalled on the calling thread's interruption flag.
    pub fn tell<M: Message>(&self, message: M, sender: Option<&ActorRef>) {
        self.tell_envelope(Envelope::of(message, sender.cloned()));
    }

    /// Send an already type-erased message
    pub fn tell_any(&self, message: AnyMessage, sender: Option<&ActorRef>) {
        self.tell_envelope(Envelope::new(message, sender.cloned()));
    }

    /// Send a prepared envelope, keeping its sender untouched
    pub fn tell_envelope(&self, envelope: Envelope) {
        if let Err(e) = self.try_tell_envelope(envelope) {
            if e.is_interrupted() {
                interrupt::interrupt_current();
            }
            tracing::debug!(actor_id = %self.id, error = %e, "Delivery reported an error");
        }
    }

    /// Send a message, surfacing the deferred interruption signal
    pub fn try_tell<M: Message>(&self, message: M, sender: Option<&ActorRef>) -> Result<()> {
        self.try_tell_envelope(Envelope::of(message, sender.cloned()))
    }

    /// Send a prepared envelope, surfacing the deferred interruption signal
    pub fn try_tell_envelope(&self, envelope: Envelope) -> Result<()> {
        self.target.deliver(envelope)
    }

    /// Forward an envelope, preserving its original sender
    pub fn forward(&self, envelope: &Envelope) {
        self.tell_envelope(envelope.clone());
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActorRef {}

impl Hash for ActorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef({})", self.id)
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}
