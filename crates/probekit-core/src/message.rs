//! Type-erased messages and envelopes
//!
//! TigerStyle: Messages are immutable once enqueued; envelopes carry the
//! sender explicitly.

use crate::actor::ActorRef;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Message
// =============================================================================

/// Anything that can travel between actors
///
/// Implemented for every `'static + Debug + Send + Sync` type; there is no
/// need to implement it by hand.
pub trait Message: Any + fmt::Debug + Send + Sync {
    /// View as `Any` for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Concrete type ID of the message
    fn message_type_id(&self) -> TypeId;

    /// Concrete type name, for diagnostics
    fn message_type_name(&self) -> &'static str;
}

impl<T> Message for T
where
    T: Any + fmt::Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn message_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn message_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A type-erased, cheaply clonable message
#[derive(Clone)]
pub struct AnyMessage(Arc<dyn Message>);

impl AnyMessage {
    /// Wrap a concrete message
    pub fn new<M: Message>(message: M) -> Self {
        Self(Arc::new(message))
    }

    /// Check the concrete type
    pub fn is<T: Message>(&self) -> bool {
        (*self.0).message_type_id() == TypeId::of::<T>()
    }

    /// Borrow as a concrete type
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    /// Concrete type ID
    pub fn concrete_type_id(&self) -> TypeId {
        (*self.0).message_type_id()
    }

    /// Concrete type name
    pub fn type_name(&self) -> &'static str {
        (*self.0).message_type_name()
    }
}

impl fmt::Debug for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Class-based matcher for a message type
///
/// Rust has no subtyping, so a class conforms when the concrete types match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageClass {
    type_id: TypeId,
    name: &'static str,
}

impl MessageClass {
    /// Class of `T`
    pub fn of<T: Message>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Check whether a message belongs to this class
    pub fn matches(&self, message: &AnyMessage) -> bool {
        message.concrete_type_id() == self.type_id
    }

    /// Type name of the class
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// A message plus the reference of whoever sent it
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The message payload
    pub message: AnyMessage,
    /// The sending actor, if any
    pub sender: Option<ActorRef>,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(message: AnyMessage, sender: Option<ActorRef>) -> Self {
        Self { message, sender }
    }

    /// Create an envelope from a concrete message
    pub fn of<M: Message>(message: M, sender: Option<ActorRef>) -> Self {
        Self::new(AnyMessage::new(message), sender)
    }
}

// =============================================================================
// Well-known messages
// =============================================================================

/// Stops the receiving actor once every message queued before it is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoisonPill;

/// Delivered when an actor saw no message for its configured receive timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveTimeout;

/// Delivered to watchers when a watched actor stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminated {
    /// The actor that stopped
    pub actor: ActorRef,
}
