//! Bounded polling helpers
//!
//! TigerStyle: Every loop has a deadline; every sleep checks interruption.

use probekit_core::constants::AWAIT_INTERVAL_MS_MIN;
use probekit_core::error::{Error, Result};
use probekit_core::interrupt;
use std::time::{Duration, Instant};

/// Instant `max` from now; `None` when it cannot be represented
pub(crate) fn deadline_after(max: Duration) -> Option<Instant> {
    Instant::now().checked_add(max)
}

/// Time left until `stop`; unbounded stops never run out
pub(crate) fn time_left(stop: Option<Instant>) -> Duration {
    stop.map_or(Duration::MAX, |stop| {
        stop.saturating_duration_since(Instant::now())
    })
}

/// `interval` raised to the shortest allowed poll interval
pub(crate) fn poll_interval(interval: Duration) -> Duration {
    interval.max(Duration::from_millis(AWAIT_INTERVAL_MS_MIN))
}

/// Sleep for `duration`, failing if the thread gets interrupted
pub(crate) fn pause(duration: Duration, context: &str) -> Result<()> {
    if interrupt::take_interrupted() {
        return Err(Error::interrupted(context));
    }
    std::thread::sleep(duration);
    if interrupt::take_interrupted() {
        return Err(Error::interrupted(context));
    }
    Ok(())
}

/// Check `condition` every `interval` until it holds or `max` elapses
///
/// Returns whether the condition held in time.
pub(crate) fn poll_until<F>(max: Duration, interval: Duration, mut condition: F) -> Result<bool>
where
    F: FnMut() -> bool,
{
    let interval = poll_interval(interval);
    let stop = deadline_after(max);
    let mut checks: u64 = 0;
    loop {
        checks += 1;
        if condition() {
            tracing::trace!(checks, "Condition satisfied");
            return Ok(true);
        }
        let left = time_left(stop);
        if left.is_zero() {
            tracing::debug!(checks, max_ms = max.as_millis() as u64, "Condition not satisfied in time");
            return Ok(false);
        }
        pause(left.min(interval), "polling for a condition")?;
    }
}
