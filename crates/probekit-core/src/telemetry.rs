//! Tracing subscriber setup
//!
//! TigerStyle: Explicit telemetry configuration, initialised once per process.

use crate::error::{Error, Result};
use crate::logging::{EventStream, EventStreamLayer};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Whether to output traces to stdout
    pub stdout_enabled: bool,
    /// Log level filter, used when `RUST_LOG` is unset
    pub log_level: String,
    /// Stream that receives every `tracing` event, if any
    pub event_stream: Option<EventStream>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "probekit".to_string(),
            stdout_enabled: true,
            log_level: "info".to_string(),
            event_stream: None,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Disable stdout tracing
    pub fn without_stdout(mut self) -> Self {
        self.stdout_enabled = false;
        self
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Bridge all `tracing` events into an event stream
    pub fn with_event_stream(mut self, stream: EventStream) -> Self {
        self.event_stream = Some(stream);
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - `PROBEKIT_SERVICE_NAME`: Service name (default: "probekit")
    /// - `RUST_LOG`: Log level filter (default: "info")
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("PROBEKIT_SERVICE_NAME").unwrap_or_else(|_| "probekit".to_string());
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            service_name,
            log_level,
            ..Default::default()
        }
    }
}

/// Install the global tracing subscriber
///
/// # Example
///
/// ```rust,ignore
/// use probekit_core::telemetry::{init_telemetry, TelemetryConfig};
///
/// let _guard = init_telemetry(TelemetryConfig::new("my-tests").with_log_level("debug"))?;
/// ```
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.stdout_enabled {
        Some(tracing_subscriber::fmt::layer().with_test_writer())
    } else {
        None
    };

    let stream_layer = config.event_stream.clone().map(EventStreamLayer::new);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(stream_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("failed to initialize tracing subscriber: {}", e)))?;

    tracing::info!(
        service = %config.service_name,
        event_stream = config.event_stream.is_some(),
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        _service_name: config.service_name,
    })
}

/// Guard returned by `init_telemetry`
///
/// The global subscriber lives for the rest of the process; keeping the
/// guard documents the intent at the call site.
pub struct TelemetryGuard {
    _service_name: String,
}
