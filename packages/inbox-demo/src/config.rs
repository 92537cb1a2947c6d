use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use stethoscope::WatcherConfig;

use crate::client::DEFAULT_POLLING_INTERVAL;

/// Demo configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub polling_interval: Duration,
    pub api_latency: Duration,
    pub run_for: Duration,
    pub watcher: WatcherConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            polling_interval: millis("POLLING_INTERVAL_MS", DEFAULT_POLLING_INTERVAL)?,
            api_latency: millis("API_LATENCY_MS", Duration::from_millis(100))?,
            run_for: millis("RUN_FOR_MS", Duration::from_millis(3500))?,
            watcher: WatcherConfig::from_env().context("Invalid watcher configuration")?,
        })
    }
}

fn millis(key: &str, default: Duration) -> Result<Duration> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Duration::from_millis)
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}
