//! TigerStyle constants for probekit
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Actor Limits
// =============================================================================

/// Maximum length of an actor name in bytes
pub const ACTOR_ID_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of an actor namespace (system name) in bytes
pub const ACTOR_NAMESPACE_LENGTH_BYTES_MAX: usize = 128;

/// Maximum number of actors per system
pub const ACTOR_CONCURRENT_COUNT_MAX: usize = 1_000_000;

/// Default namespace used by `ActorSystem::default`
pub const SYSTEM_NAME_DEFAULT: &str = "probekit";

// =============================================================================
// Dispatcher Limits
// =============================================================================

/// Default number of worker threads for the concurrent dispatcher
pub const DISPATCHER_WORKER_THREADS_COUNT_DEFAULT: usize = 2;

/// Maximum number of worker threads for the concurrent dispatcher
pub const DISPATCHER_WORKER_THREADS_COUNT_MAX: usize = 256;

/// Upper bound on how long `shutdown` waits for actors to stop (3 sec)
pub const SHUTDOWN_WAIT_MS_MAX: u64 = 3 * 1000;

/// Poll interval while `shutdown` waits for actors to stop
pub const SHUTDOWN_POLL_INTERVAL_MS: u64 = 5;

// =============================================================================
// Expectation Timing
// =============================================================================

/// Default timeout for a single expectation call in milliseconds (3 sec)
pub const EXPECT_TIMEOUT_MS_DEFAULT: u64 = 3 * 1000;

/// Default timeout for `expect_no_msg` when no deadline is active (3 sec)
pub const EXPECT_NO_MSG_TIMEOUT_MS_DEFAULT: u64 = 3 * 1000;

/// Default poll interval for `await_cond` / `await_assert` in milliseconds
pub const AWAIT_INTERVAL_MS_DEFAULT: u64 = 100;

/// Shortest poll interval; smaller requests are raised to this
pub const AWAIT_INTERVAL_MS_MIN: u64 = 1;

/// Poll interval while an event filter waits for its occurrences
pub const EVENT_FILTER_POLL_INTERVAL_MS: u64 = 10;

/// Default leeway for log event filters in milliseconds (3 sec)
pub const EVENT_FILTER_LEEWAY_MS_DEFAULT: u64 = 3 * 1000;

/// Default scale applied to explicit durations
pub const TIME_FACTOR_DEFAULT: f64 = 1.0;

/// Maximum scale applied to explicit durations
pub const TIME_FACTOR_MAX: f64 = 1000.0;

/// Maximum nesting depth of `within` blocks
pub const DEADLINE_STACK_DEPTH_MAX: usize = 64;

// Compile-time assertions for constant validity
const _: () = {
    assert!(ACTOR_ID_LENGTH_BYTES_MAX >= 64);
    assert!(DISPATCHER_WORKER_THREADS_COUNT_DEFAULT <= DISPATCHER_WORKER_THREADS_COUNT_MAX);
    assert!(AWAIT_INTERVAL_MS_DEFAULT < EXPECT_TIMEOUT_MS_DEFAULT);
    assert!(AWAIT_INTERVAL_MS_MIN > 0);
    assert!(AWAIT_INTERVAL_MS_MIN <= AWAIT_INTERVAL_MS_DEFAULT);
    assert!(SHUTDOWN_POLL_INTERVAL_MS < SHUTDOWN_WAIT_MS_MAX);
    assert!(DEADLINE_STACK_DEPTH_MAX > 0);
};
