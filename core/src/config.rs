//! Runtime configuration and the one-time process bootstrap.
//!
//! # Design
//! The only process-wide setting is the poll interval. `initialize` registers
//! it once; later calls keep the first registration and return it, so any
//! number of embedders can call `initialize` at startup without racing each
//! other. Requests created before (or without) initialization use the
//! default of one 60 Hz frame.

use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::XhrError;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 16;

/// Environment variable read by `Config::from_env`.
pub const POLL_INTERVAL_ENV: &str = "POLLXHR_POLL_INTERVAL_MS";

static REGISTERED: OnceLock<Config> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Milliseconds between polls of an in-flight request.
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), XhrError> {
        if self.poll_interval_ms == 0 {
            return Err(XhrError::Config("poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn from_json(raw: &str) -> Result<Config, XhrError> {
        let config: Config = serde_json::from_str(raw).map_err(|e| XhrError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overridden by `POLLXHR_POLL_INTERVAL_MS` when set.
    pub fn from_env() -> Result<Config, XhrError> {
        let mut config = Config::default();
        if let Ok(raw) = std::env::var(POLL_INTERVAL_ENV) {
            config.poll_interval_ms = raw
                .trim()
                .parse()
                .map_err(|_| XhrError::Config(format!("{POLL_INTERVAL_ENV}={raw} is not a number")))?;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Register the process-wide configuration.
///
/// The first successful call wins. Later calls return the registered config
/// unchanged and log a warning if they asked for something different.
pub fn initialize(config: Config) -> Result<&'static Config, XhrError> {
    config.validate()?;
    let mut installed = false;
    let active = REGISTERED.get_or_init(|| {
        installed = true;
        config.clone()
    });
    if installed {
        log::info!("initialized with poll interval {}ms", active.poll_interval_ms);
    } else if *active != config {
        log::warn!(
            "already initialized with poll interval {}ms, ignoring {}ms",
            active.poll_interval_ms,
            config.poll_interval_ms
        );
    }
    Ok(active)
}

pub fn registered() -> Option<&'static Config> {
    REGISTERED.get()
}

/// Registered poll interval, or the default if `initialize` was never called.
pub fn poll_interval() -> Duration {
    registered().map_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS), Config::poll_interval)
}
