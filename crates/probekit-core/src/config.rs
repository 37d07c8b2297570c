//! Configuration for probekit
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.
//!
//! The harness consumes plain numeric values only. Loading them from a file
//! is left to the caller; `from_env` covers the common CI override of the
//! time factor.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for probekit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbekitConfig {
    /// Actor system configuration
    #[serde(default)]
    pub system: SystemConfig,

    /// Test kit timing configuration
    #[serde(default)]
    pub testkit: TestKitConfig,
}

impl ProbekitConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.system.validate()?;
        self.testkit.validate()?;
        Ok(())
    }

    /// Create from defaults, applying environment overrides
    ///
    /// Reads:
    /// - `PROBEKIT_SYSTEM_NAME`: system name (default: "probekit")
    /// - `PROBEKIT_WORKER_THREADS`: concurrent dispatcher threads (default: 2)
    /// - `PROBEKIT_TIME_FACTOR`: duration scale (default: 1.0)
    /// - `PROBEKIT_SINGLE_EXPECT_DEFAULT_MS`: default expectation timeout
    /// - `PROBEKIT_FILTER_LEEWAY_MS`: log filter leeway
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("PROBEKIT_SYSTEM_NAME") {
            config.system.name = name;
        }
        if let Some(threads) = env_parse("PROBEKIT_WORKER_THREADS")? {
            config.system.worker_threads_count = threads;
        }
        if let Some(factor) = env_parse("PROBEKIT_TIME_FACTOR")? {
            config.testkit.time_factor = factor;
        }
        if let Some(ms) = env_parse("PROBEKIT_SINGLE_EXPECT_DEFAULT_MS")? {
            config.testkit.single_expect_default_ms = ms;
        }
        if let Some(ms) = env_parse("PROBEKIT_FILTER_LEEWAY_MS")? {
            config.testkit.filter_leeway_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfiguration {
                field: key.to_string(),
                reason: format!("cannot parse '{}'", raw),
            }),
        Err(_) => Ok(None),
    }
}

/// Actor system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// System name, used as the namespace of every actor ID
    #[serde(default = "default_system_name")]
    pub name: String,

    /// Worker threads for the concurrent (tokio) dispatcher
    #[serde(default = "default_worker_threads")]
    pub worker_threads_count: usize,
}

fn default_system_name() -> String {
    SYSTEM_NAME_DEFAULT.to_string()
}

fn default_worker_threads() -> usize {
    DISPATCHER_WORKER_THREADS_COUNT_DEFAULT
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: default_system_name(),
            worker_threads_count: default_worker_threads(),
        }
    }
}

impl SystemConfig {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > ACTOR_NAMESPACE_LENGTH_BYTES_MAX {
            return Err(Error::InvalidConfiguration {
                field: "system.name".into(),
                reason: format!(
                    "length must be in 1..={}",
                    ACTOR_NAMESPACE_LENGTH_BYTES_MAX
                ),
            });
        }

        if self.worker_threads_count == 0
            || self.worker_threads_count > DISPATCHER_WORKER_THREADS_COUNT_MAX
        {
            return Err(Error::InvalidConfiguration {
                field: "system.worker_threads_count".into(),
                reason: format!(
                    "{} outside 1..={}",
                    self.worker_threads_count, DISPATCHER_WORKER_THREADS_COUNT_MAX
                ),
            });
        }

        Ok(())
    }
}

/// Timing configuration consumed by the test kit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestKitConfig {
    /// Default timeout of a single expectation outside `within` (milliseconds)
    #[serde(default = "default_single_expect_ms")]
    pub single_expect_default_ms: u64,

    /// Default timeout of `expect_no_msg` outside `within` (milliseconds)
    #[serde(default = "default_expect_no_msg_ms")]
    pub expect_no_msg_default_ms: u64,

    /// Scale applied to every explicit duration
    #[serde(default = "default_time_factor")]
    pub time_factor: f64,

    /// How long an event filter waits for its occurrences (milliseconds)
    #[serde(default = "default_filter_leeway_ms")]
    pub filter_leeway_ms: u64,

    /// Default poll interval for `await_cond` / `await_assert` (milliseconds)
    #[serde(default = "default_await_interval_ms")]
    pub await_interval_ms_default: u64,
}

fn default_single_expect_ms() -> u64 {
    EXPECT_TIMEOUT_MS_DEFAULT
}

fn default_expect_no_msg_ms() -> u64 {
    EXPECT_NO_MSG_TIMEOUT_MS_DEFAULT
}

fn default_time_factor() -> f64 {
    TIME_FACTOR_DEFAULT
}

fn default_filter_leeway_ms() -> u64 {
    EVENT_FILTER_LEEWAY_MS_DEFAULT
}

fn default_await_interval_ms() -> u64 {
    AWAIT_INTERVAL_MS_DEFAULT
}

impl Default for TestKitConfig {
    fn default() -> Self {
        Self {
            single_expect_default_ms: default_single_expect_ms(),
            expect_no_msg_default_ms: default_expect_no_msg_ms(),
            time_factor: default_time_factor(),
            filter_leeway_ms: default_filter_leeway_ms(),
            await_interval_ms_default: default_await_interval_ms(),
        }
    }
}

impl TestKitConfig {
    fn validate(&self) -> Result<()> {
        if !self.time_factor.is_finite()
            || self.time_factor <= 0.0
            || self.time_factor > TIME_FACTOR_MAX
        {
            return Err(Error::InvalidConfiguration {
                field: "testkit.time_factor".into(),
                reason: format!("{} outside (0, {}]", self.time_factor, TIME_FACTOR_MAX),
            });
        }

        if self.await_interval_ms_default == 0 {
            return Err(Error::InvalidConfiguration {
                field: "testkit.await_interval_ms_default".into(),
                reason: "must be positive".into(),
            });
        }

        Ok(())
    }

    /// Scale a duration by the time factor
    pub fn dilated(&self, duration: Duration) -> Duration {
        debug_assert!(self.time_factor > 0.0);
        if duration == Duration::MAX {
            return duration;
        }
        Duration::try_from_secs_f64(duration.as_secs_f64() * self.time_factor)
            .unwrap_or(Duration::MAX)
    }

    /// Dilated default timeout of a single expectation
    pub fn single_expect_default(&self) -> Duration {
        self.dilated(Duration::from_millis(self.single_expect_default_ms))
    }

    /// Dilated default timeout of `expect_no_msg`
    pub fn expect_no_msg_default(&self) -> Duration {
        self.dilated(Duration::from_millis(self.expect_no_msg_default_ms))
    }

    /// Dilated event filter leeway
    pub fn filter_leeway(&self) -> Duration {
        self.dilated(Duration::from_millis(self.filter_leeway_ms))
    }

    /// Default poll interval (not dilated)
    pub fn await_interval_default(&self) -> Duration {
        Duration::from_millis(self.await_interval_ms_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProbekitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.system.name, "probekit");
        assert_eq!(
            config.testkit.single_expect_default(),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_invalid_time_factor() {
        let mut config = ProbekitConfig::default();
        config.testkit.time_factor = 0.0;
        assert!(config.validate().is_err());

        config.testkit.time_factor = f64::NAN;
        assert!(config.validate().is_err());

        config.testkit.time_factor = -2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_worker_threads() {
        let mut config = ProbekitConfig::default();
        config.system.worker_threads_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dilation() {
        let config = TestKitConfig {
            time_factor: 2.0,
            ..Default::default()
        };
        assert_eq!(
            config.dilated(Duration::from_millis(500)),
            Duration::from_millis(1000)
        );
        assert_eq!(config.single_expect_default(), Duration::from_secs(6));
        assert_eq!(config.dilated(Duration::MAX), Duration::MAX);
        // Interval is a pacing knob, not a deadline
        assert_eq!(config.await_interval_default(), Duration::from_millis(100));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ProbekitConfig =
            serde_json::from_str(r#"{ "testkit": { "time_factor": 3.5 } }"#).unwrap();
        assert_eq!(config.testkit.time_factor, 3.5);
        assert_eq!(
            config.testkit.single_expect_default_ms,
            EXPECT_TIMEOUT_MS_DEFAULT
        );
        assert_eq!(config.system.name, SYSTEM_NAME_DEFAULT);
        assert!(config.validate().is_ok());
    }
}
