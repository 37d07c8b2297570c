//! Log event stream
//!
//! Every actor system owns an `EventStream`. Runtime failures and dead
//! letters are published to it, and `EventStreamLayer` bridges arbitrary
//! `tracing` events into it. Subscribers may swallow events; anything not
//! swallowed is emitted through `tracing`.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Target used when re-emitting published events through `tracing`
pub const EVENT_STREAM_TARGET: &str = "probekit::event_stream";

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// A structured log event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: LogLevel,
    /// Source of the event (actor ID or tracing target)
    pub logger_name: String,
    pub message: String,
    /// Rendered cause, for error events
    pub cause: Option<String>,
}

impl LogEvent {
    /// Create an event without a cause
    pub fn new(level: LogLevel, logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a cause
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

type Subscriber = Arc<dyn Fn(&LogEvent) -> bool + Send + Sync>;

struct EventStreamInner {
    subscribers: RwLock<Vec<(u64, Subscriber)>>,
    next_id: AtomicU64,
}

/// Publish/subscribe channel for log events
#[derive(Clone)]
pub struct EventStream {
    inner: Arc<EventStreamInner>,
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventStreamInner {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a subscriber
    ///
    /// The callback returns `true` to swallow the event. The most recent
    /// subscriber sees events first. Dropping the returned `Subscription`
    /// removes the subscriber.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&LogEvent) -> bool + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().push((id, Arc::new(callback)));
        Subscription {
            stream: self.clone(),
            id,
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Offer an event to subscribers, returning whether one swallowed it
    pub fn intercept(&self, event: &LogEvent) -> bool {
        // Callbacks run without the lock held so they may publish or unsubscribe
        let snapshot: Vec<Subscriber> = self
            .inner
            .subscribers
            .read()
            .iter()
            .rev()
            .map(|(_, s)| Arc::clone(s))
            .collect();

        snapshot.iter().any(|subscriber| subscriber(event))
    }

    /// Publish an event; events nobody swallows go to `tracing`
    pub fn publish(&self, event: LogEvent) {
        if self.intercept(&event) {
            return;
        }

        let cause = event.cause.as_deref().unwrap_or("");
        match event.level {
            LogLevel::Error => tracing::error!(
                target: EVENT_STREAM_TARGET,
                logger = %event.logger_name,
                cause = %cause,
                "{}",
                event.message
            ),
            LogLevel::Warning => tracing::warn!(
                target: EVENT_STREAM_TARGET,
                logger = %event.logger_name,
                "{}",
                event.message
            ),
            LogLevel::Info => tracing::info!(
                target: EVENT_STREAM_TARGET,
                logger = %event.logger_name,
                "{}",
                event.message
            ),
            LogLevel::Debug => tracing::debug!(
                target: EVENT_STREAM_TARGET,
                logger = %event.logger_name,
                "{}",
                event.message
            ),
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.write().retain(|(sid, _)| *sid != id);
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// RAII handle for an `EventStream` subscriber
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    stream: EventStream,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stream.unsubscribe(self.id);
    }
}

// =============================================================================
// tracing bridge
// =============================================================================

/// `tracing_subscriber` layer forwarding events into an `EventStream`
///
/// Events swallowed by a stream subscriber are still seen by the other
/// layers; a layer cannot veto its siblings. Events re-emitted by
/// `EventStream::publish` are skipped.
pub struct EventStreamLayer {
    stream: EventStream,
}

impl EventStreamLayer {
    pub fn new(stream: EventStream) -> Self {
        Self { stream }
    }
}

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    logger: Option<String>,
    cause: Option<String>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "logger" => self.logger = Some(value.to_string()),
            "cause" | "error" => self.cause = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(rendered),
            "logger" => self.logger = Some(rendered),
            "cause" | "error" => self.cause = Some(rendered),
            _ => {}
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for EventStreamLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target() == EVENT_STREAM_TARGET {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let log_event = LogEvent {
            level: LogLevel::from(metadata.level()),
            logger_name: visitor
                .logger
                .unwrap_or_else(|| metadata.target().to_string()),
            message: visitor.message.unwrap_or_default(),
            cause: visitor.cause,
        };
        self.stream.intercept(&log_event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_subscriber_swallows_event() {
        let stream = EventStream::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _sub = stream.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.message.clone());
            event.level == LogLevel::Error
        });

        assert!(stream.intercept(&LogEvent::new(LogLevel::Error, "a", "boom")));
        assert!(!stream.intercept(&LogEvent::new(LogLevel::Info, "a", "fine")));
        assert_eq!(*seen.lock().unwrap(), vec!["boom", "fine"]);
    }

    #[test]
    fn test_subscription_drop_unsubscribes() {
        let stream = EventStream::new();
        {
            let _sub = stream.subscribe(|_| true);
            assert_eq!(stream.subscriber_count(), 1);
        }
        assert_eq!(stream.subscriber_count(), 0);
        assert!(!stream.intercept(&LogEvent::new(LogLevel::Error, "a", "boom")));
    }

    #[test]
    fn test_newest_subscriber_first() {
        let stream = EventStream::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        let _outer = stream.subscribe(move |_| {
            o1.lock().unwrap().push("outer");
            true
        });
        let o2 = order.clone();
        let _inner = stream.subscribe(move |_| {
            o2.lock().unwrap().push("inner");
            true
        });

        stream.publish(LogEvent::new(LogLevel::Warning, "a", "w"));
        assert_eq!(*order.lock().unwrap(), vec!["inner"]);
    }

    #[test]
    fn test_layer_bridges_tracing_events() {
        let stream = EventStream::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = stream.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.clone());
            true
        });

        let subscriber =
            tracing_subscriber::registry().with(EventStreamLayer::new(stream.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(logger = "my-actor", "disk at {}%", 91);
            tracing::error!(error = "io failure", "write failed");
            // Re-emitted stream events are not bridged twice
            tracing::error!(target: EVENT_STREAM_TARGET, "ignored");
        });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].level, LogLevel::Warning);
        assert_eq!(seen[0].logger_name, "my-actor");
        assert_eq!(seen[0].message, "disk at 91%");
        assert_eq!(seen[1].level, LogLevel::Error);
        assert_eq!(seen[1].cause.as_deref(), Some("io failure"));
    }
}
