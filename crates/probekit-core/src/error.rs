//! Error types for probekit
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for probekit operations
pub type Result<T> = std::result::Result<T, Error>;

/// probekit error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Actor Errors
    // =========================================================================
    #[error("Actor already exists: {id}")]
    ActorAlreadyExists { id: String },

    #[error("Actor terminated: {id}")]
    ActorTerminated { id: String },

    #[error("Actor failed: {id}, reason: {reason}")]
    ActorFailed { id: String, reason: String },

    #[error("Actor type mismatch: {id} is not a {expected}")]
    ActorTypeMismatch { id: String, expected: String },

    #[error("Invalid actor ID: {id}, reason: {reason}")]
    InvalidActorId { id: String, reason: String },

    #[error("Actor ID too long: {length} bytes exceeds limit of {limit} bytes")]
    ActorIdTooLong { length: usize, limit: usize },

    // =========================================================================
    // Dispatch Errors
    // =========================================================================
    #[error("Interrupted: {context}")]
    Interrupted { context: String },

    #[error("Actor system terminated: {name}")]
    SystemTerminated { name: String },

    // =========================================================================
    // Expectation Errors
    // =========================================================================
    #[error("Timeout ({elapsed:?}) while waiting for {expected}")]
    Timeout { elapsed: Duration, expected: String },

    #[error("Unexpected message: expected {expected}, found {actual}")]
    UnexpectedMessage { expected: String, actual: String },

    #[error("Assertion failed: {reason}")]
    AssertionFailure { reason: String },

    #[error("Block took {elapsed:?}, should at least have been {min:?}")]
    MinDurationNotReached { elapsed: Duration, min: Duration },

    #[error("Block took {elapsed:?}, exceeding {max:?}")]
    MaxDurationExceeded { elapsed: Duration, max: Duration },

    #[error("Required min time {min:?} not possible, only {remaining:?} left")]
    DeadlineUnreachable { min: Duration, remaining: Duration },

    #[error("remaining() is only available inside a within block")]
    NotWithinBlock,

    #[error("No message has been received yet")]
    NoLastMessage,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an actor failed error
    pub fn actor_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActorFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create an interruption signal
    pub fn interrupted(context: impl Into<String>) -> Self {
        Self::Interrupted {
            context: context.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(elapsed: Duration, expected: impl Into<String>) -> Self {
        Self::Timeout {
            elapsed,
            expected: expected.into(),
        }
    }

    /// Create an unexpected message error
    pub fn unexpected(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::UnexpectedMessage {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an assertion failure
    pub fn assertion(reason: impl Into<String>) -> Self {
        Self::AssertionFailure {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is the deferred interruption signal
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// Check if this error is an expectation failure (as opposed to a runtime error)
    pub fn is_expectation_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::UnexpectedMessage { .. }
                | Self::AssertionFailure { .. }
                | Self::MinDurationNotReached { .. }
                | Self::MaxDurationExceeded { .. }
                | Self::DeadlineUnreachable { .. }
        )
    }
}
