use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::error::WatchError;

/// Default interval between two checks of the pending set.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(50);

/// Default budget of a watch session.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Watcher timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Polling interval of the session wait loop.
    pub heartbeat: Duration,
    /// Timeout used by sessions that do not set one.
    pub default_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl WatcherConfig {
    /// Load configuration from environment variables
    ///
    /// Reads `STETHOSCOPE_HEARTBEAT_MS` and `STETHOSCOPE_TIMEOUT_MS`; unset
    /// variables fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Self::default();
        let config = Self {
            heartbeat: read_millis("STETHOSCOPE_HEARTBEAT_MS")?.unwrap_or(defaults.heartbeat),
            default_timeout: read_millis("STETHOSCOPE_TIMEOUT_MS")?
                .unwrap_or(defaults.default_timeout),
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the polling interval.
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set the default session timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Reject configurations the wait loop cannot run with.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.heartbeat.is_zero() {
            return Err(WatchError::InvalidConfig {
                reason: "heartbeat must be greater than zero",
            });
        }
        Ok(())
    }

    /// Number of heartbeats a session with `timeout` may wait before failing.
    pub fn max_heartbeats(&self, timeout: Duration) -> u64 {
        let count = timeout.as_nanos() / self.heartbeat.as_nanos().max(1);
        u64::try_from(count).unwrap_or(u64::MAX)
    }
}

fn read_millis(key: &str) -> Result<Option<Duration>> {
    match env::var(key) {
        Ok(raw) => {
            let millis: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a whole number of milliseconds"))?;
            Ok(Some(Duration::from_millis(millis)))
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("{key} is not valid unicode")),
    }
}
