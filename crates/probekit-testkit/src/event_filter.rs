//! Expected log events
//!
//! TigerStyle: A filter is installed for exactly one block and counts every
//! event it swallows.

use crate::poll::poll_until;
use probekit_core::constants::EVENT_FILTER_POLL_INTERVAL_MS;
use probekit_core::error::{Error, Result};
use probekit_core::logging::{LogEvent, LogLevel};
use probekit_runtime::ActorSystem;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextMatch {
    Any,
    Exact(String),
    Contains(String),
    StartsWith(String),
}

impl TextMatch {
    fn matches(&self, text: &str) -> bool {
        match self {
            TextMatch::Any => true,
            TextMatch::Exact(expected) => text == expected,
            TextMatch::Contains(part) => text.contains(part.as_str()),
            TextMatch::StartsWith(prefix) => text.starts_with(prefix.as_str()),
        }
    }
}

/// Matches log events of one level and swallows them while installed
///
/// ```rust,ignore
/// EventFilter::error()
///     .with_message_containing("boom")
///     .occurrences(1)
///     .intercept(&system, || {
///         actor.tell("explode", None);
///         Ok(())
///     })?;
/// ```
#[derive(Debug, Clone)]
pub struct EventFilter {
    level: LogLevel,
    source: Option<String>,
    message: TextMatch,
    occurrences: Option<usize>,
}

impl EventFilter {
    fn of_level(level: LogLevel) -> Self {
        Self {
            level,
            source: None,
            message: TextMatch::Any,
            occurrences: None,
        }
    }

    pub fn error() -> Self {
        Self::of_level(LogLevel::Error)
    }

    pub fn warning() -> Self {
        Self::of_level(LogLevel::Warning)
    }

    pub fn info() -> Self {
        Self::of_level(LogLevel::Info)
    }

    pub fn debug() -> Self {
        Self::of_level(LogLevel::Debug)
    }

    /// Only events logged by `source`
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = TextMatch::Exact(message.into());
        self
    }

    pub fn with_message_containing(mut self, part: impl Into<String>) -> Self {
        self.message = TextMatch::Contains(part.into());
        self
    }

    pub fn with_message_starting(mut self, prefix: impl Into<String>) -> Self {
        self.message = TextMatch::StartsWith(prefix.into());
        self
    }

    /// Require exactly `n` matching events
    ///
    /// Without a count any number is swallowed and none is required.
    pub fn occurrences(mut self, n: usize) -> Self {
        self.occurrences = Some(n);
        self
    }

    /// Whether `event` is one this filter expects
    pub fn matches(&self, event: &LogEvent) -> bool {
        event.level == self.level
            && self
                .source
                .as_deref()
                .map_or(true, |source| event.logger_name == source)
            && self.message.matches(&event.message)
    }

    /// Run `block` with this filter installed on the system's event stream
    ///
    /// Matching events are swallowed. After the block returns, waits up to
    /// the scaled filter leeway for the expected occurrences; fails when
    /// fewer arrived, or when more did.
    pub fn intercept<R, F>(&self, system: &ActorSystem, block: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let seen = Arc::new(AtomicUsize::new(0));
        let subscription = {
            let filter = self.clone();
            let seen = Arc::clone(&seen);
            system.event_stream().subscribe(move |event| {
                if filter.matches(event) {
                    seen.fetch_add(1, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            })
        };

        let value = block()?;

        let Some(expected) = self.occurrences else {
            drop(subscription);
            return Ok(value);
        };

        let leeway = system.config().testkit.filter_leeway();
        let interval = Duration::from_millis(EVENT_FILTER_POLL_INTERVAL_MS);
        poll_until(leeway, interval, || seen.load(Ordering::SeqCst) >= expected)?;
        drop(subscription);

        let actual = seen.load(Ordering::SeqCst);
        tracing::debug!(filter = %self, expected, actual, "Event filter finished");
        if actual < expected {
            return Err(Error::assertion(format!(
                "timeout ({:?}) waiting for {} messages on {}",
                leeway,
                expected - actual,
                self
            )));
        }
        if actual > expected {
            return Err(Error::assertion(format!(
                "received {} excess messages on {}",
                actual - expected,
                self
            )));
        }
        Ok(value)
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventFilter({}", self.level)?;
        if let Some(source) = &self.source {
            write!(f, ", source={}", source)?;
        }
        match &self.message {
            TextMatch::Any => {}
            TextMatch::Exact(text) => write!(f, ", message=\"{}\"", text)?,
            TextMatch::Contains(text) => write!(f, ", message contains \"{}\"", text)?,
            TextMatch::StartsWith(text) => write!(f, ", message starts with \"{}\"", text)?,
        }
        if let Some(n) = self.occurrences {
            write!(f, ", occurrences={}", n)?;
        }
        f.write_str(")")
    }
}
