//! probekit Core
//!
//! Core types, errors, and constants for the probekit actor test harness.
//!
//! # Overview
//!
//! probekit drives actors deterministically on the calling thread and
//! asserts on the messages they emit under explicit deadlines. This crate
//! holds what every other crate shares: message and identity types, the
//! error taxonomy, timing configuration and the log event stream.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `ACTOR_ID_LENGTH_BYTES_MAX`)
//! - No recursion (bounded iteration only)

pub mod actor;
pub mod config;
pub mod constants;
pub mod error;
pub mod interrupt;
pub mod logging;
pub mod message;
pub mod telemetry;

pub use actor::{ActorId, ActorRef, MessageTarget};
pub use config::{ProbekitConfig, SystemConfig, TestKitConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use interrupt::InterruptHandle;
pub use logging::{EventStream, EventStreamLayer, LogEvent, LogLevel, Subscription};
pub use message::{AnyMessage, Envelope, Message, MessageClass, PoisonPill, ReceiveTimeout, Terminated};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
