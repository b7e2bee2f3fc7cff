//! Event cache configuration.
//!
//! Options are usable unconfigured: the defaults enable the cache with a 60
//! second timeout and leave background cleanup off. Hosting processes can
//! load overrides from environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Event cache options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCacheOptions {
    /// Application name, attached to cache log records.
    pub app_name: Option<String>,

    /// Enable the event cache for idempotency.
    pub enable_event_cache: bool,

    /// How long a handling record stays valid.
    pub event_cache_timeout: Duration,

    /// Enable background removal of expired records.
    pub enable_event_cache_cleanup: bool,

    /// Interval of the sweep removing expired error-free records.
    pub event_cache_cleanup_interval: Duration,

    /// Interval of the sweep removing expired records carrying errors.
    pub event_errors_cache_cleanup_interval: Duration,
}

impl Default for EventCacheOptions {
    fn default() -> Self {
        Self {
            app_name: None,
            enable_event_cache: true,
            event_cache_timeout: Duration::from_secs(60),
            enable_event_cache_cleanup: false,
            event_cache_cleanup_interval: Duration::from_secs(5 * 60),
            event_errors_cache_cleanup_interval: Duration::from_secs(15 * 60),
        }
    }
}

impl EventCacheOptions {
    /// Options with the cache turned off.
    pub fn disabled() -> Self {
        Self {
            enable_event_cache: false,
            ..Self::default()
        }
    }

    /// Set the record timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.event_cache_timeout = timeout;
        self
    }

    /// Enable background cleanup with both sweep intervals.
    pub fn with_cleanup(mut self, interval: Duration, errors_interval: Duration) -> Self {
        self.enable_event_cache_cleanup = true;
        self.event_cache_cleanup_interval = interval;
        self.event_errors_cache_cleanup_interval = errors_interval;
        self
    }

    /// Set the application name.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `EVENT_CACHE_APP_NAME`: Application name
    /// - `EVENT_CACHE_ENABLED`: Enable the cache (default: true)
    /// - `EVENT_CACHE_TIMEOUT_SECS`: Record timeout in seconds (default: 60)
    /// - `EVENT_CACHE_CLEANUP_ENABLED`: Enable background cleanup (default: false)
    /// - `EVENT_CACHE_CLEANUP_INTERVAL_SECS`: Cleanup interval in seconds (default: 300)
    /// - `EVENT_CACHE_ERRORS_CLEANUP_INTERVAL_SECS`: Errors cleanup interval in seconds (default: 900)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let options = Self {
            app_name: lookup("EVENT_CACHE_APP_NAME").or(default.app_name),
            enable_event_cache: lookup("EVENT_CACHE_ENABLED")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(default.enable_event_cache),
            event_cache_timeout: secs(&lookup, "EVENT_CACHE_TIMEOUT_SECS")?
                .unwrap_or(default.event_cache_timeout),
            enable_event_cache_cleanup: lookup("EVENT_CACHE_CLEANUP_ENABLED")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(default.enable_event_cache_cleanup),
            event_cache_cleanup_interval: secs(&lookup, "EVENT_CACHE_CLEANUP_INTERVAL_SECS")?
                .unwrap_or(default.event_cache_cleanup_interval),
            event_errors_cache_cleanup_interval: secs(
                &lookup,
                "EVENT_CACHE_ERRORS_CLEANUP_INTERVAL_SECS",
            )?
            .unwrap_or(default.event_errors_cache_cleanup_interval),
        };

        options.validate()?;
        Ok(options)
    }

    /// Reject zero durations, which would expire records immediately or spin
    /// the sweep timers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("event_cache_timeout", self.event_cache_timeout),
            ("event_cache_cleanup_interval", self.event_cache_cleanup_interval),
            (
                "event_errors_cache_cleanup_interval",
                self.event_errors_cache_cleanup_interval,
            ),
        ];
        for (key, value) in checks {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|s| Some(Duration::from_secs(s)))
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}
