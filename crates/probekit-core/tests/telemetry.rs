//! Tests for installing the global tracing subscriber
//!
//! TigerStyle: One process-wide install, checked once.

use probekit_core::logging::{EventStream, LogEvent, LogLevel};
use probekit_core::telemetry::{init_telemetry, TelemetryConfig};
use std::sync::{Arc, Mutex};

#[test]
fn test_init_telemetry_bridges_events_into_stream() {
    let stream = EventStream::new();
    let seen: Arc<Mutex<Vec<LogEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let _subscription = {
        let seen = seen.clone();
        stream.subscribe(move |event| {
            seen.lock().unwrap().push(event.clone());
            true
        })
    };

    let _guard = init_telemetry(
        TelemetryConfig::new("telemetry-test")
            .with_log_level("info")
            .with_event_stream(stream.clone())
            .without_stdout(),
    )
    .unwrap();

    tracing::warn!(logger = "disk", "almost full");
    tracing::debug!(logger = "disk", "below the level filter");

    let events = seen.lock().unwrap().clone();
    let bridged: Vec<&LogEvent> = events.iter().filter(|e| e.logger_name == "disk").collect();
    assert_eq!(bridged.len(), 1);
    assert_eq!(bridged[0].level, LogLevel::Warning);
    assert!(bridged[0].message.contains("almost full"));

    // A second install is rejected
    let again = init_telemetry(TelemetryConfig::new("again").without_stdout());
    assert!(again.is_err());
}
