//! probekit TestKit
//!
//! Blocking, deadline-aware assertions over the messages actors emit.
//!
//! # Overview
//!
//! - [`TestKit`]: a receiving actor plus `expect_*`/`receive_*` calls that
//!   block the test thread under nested `within` deadlines
//! - [`TestProbe`]: an addressable kit with `reply`, `forward` and
//!   auto-pilot support
//! - [`EventFilter`]: expect and swallow log events for the duration of a
//!   block
//!
//! Every explicit duration is scaled by the configured time factor, so a
//! slow CI machine only needs `PROBEKIT_TIME_FACTOR` raised.
//!
//! # Example
//!
//! ```rust,ignore
//! let system = ActorSystem::with_name("example")?;
//! let probe = TestProbe::new(&system)?;
//! echo.tell("ping", Some(probe.actor_ref()));
//! probe.within_max(Duration::from_secs(1), || {
//!     probe.expect_msg(None, "pong")?;
//!     probe.expect_no_msg(Duration::from_millis(100))
//! })?;
//! ```

pub mod deadline;
pub mod event_filter;
pub mod kit;
mod poll;
pub mod probe;
pub mod queue;
pub mod test_actor;

pub use deadline::{DeadlineFrame, DeadlineStack};
pub use event_filter::EventFilter;
pub use kit::TestKit;
pub use probe::TestProbe;
pub use queue::MessageQueue;
pub use test_actor::{AutoPilot, IgnoreFilter};
