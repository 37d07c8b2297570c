//! probekit Runtime
//!
//! A minimal actor runtime for probekit test harnesses.
//!
//! # Overview
//!
//! The runtime provides:
//! - Actor trait, context and props
//! - Actor cells with lifecycle, supervision directives and death watch
//! - A reentrant calling-thread dispatcher running actors synchronously
//! - A tokio-backed concurrent dispatcher
//! - `TestActorRef` for driving one actor deterministically
//!
//! It is not a production runtime: there is no supervision hierarchy and
//! no remoting.
//!
//! # TigerStyle
//! - One thread runs an actor at any instant
//! - Explicit lifecycle states
//! - Iterative draining, no recursion

pub mod actor;
pub mod cell;
pub mod dispatcher;
pub mod handle;
pub mod mailbox;
pub mod system;
pub mod tokio_dispatcher;

pub use actor::{Actor, ActorContext, AsAny, DispatcherKind, Props, SupervisorDirective};
pub use cell::{ActorCell, LifecycleState};
pub use dispatcher::{CallingThreadDispatcher, Dispatcher, Task};
pub use handle::TestActorRef;
pub use mailbox::Mailbox;
pub use system::ActorSystem;
pub use tokio_dispatcher::TokioDispatcher;
