//! Runtime settings and the persistent configuration file.
//!
//! Process-level knobs (logging, reload cadence, retention, timeouts) are read
//! from environment variables at startup. Key material, the listen address, and
//! the public base URL live in the JSON file managed by [`file::ConfigFile`].

pub mod file;

use std::{num::NonZeroUsize, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::keys::Retention;

pub use file::ConfigFile;

/// Default path of the persistent configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "redirector.json";

/// Validated runtime settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint for span export. Logs only when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// How often (seconds) the server re-reads the config file for new keys.
    /// `0` disables reloading.
    #[serde(default = "default_key_reload_interval")]
    pub key_reload_interval_secs: u64,

    /// Keep only this many newest generations when rotating. Unbounded when unset.
    #[serde(default)]
    pub retain_generations: Option<usize>,

    /// Per-request timeout for the HTTP server.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_key_reload_interval() -> u64 {
    30
}
fn default_request_timeout() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otel_exporter_otlp_endpoint: None,
            key_reload_interval_secs: default_key_reload_interval(),
            retain_generations: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Settings {
    /// Load and validate settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build settings from environment")?;

        let s: Settings = cfg
            .try_deserialize()
            .context("failed to deserialise settings")?;

        s.validate()?;
        Ok(s)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            anyhow::bail!("LOG_LEVEL must not be empty");
        }
        if self.retain_generations == Some(0) {
            anyhow::bail!("RETAIN_GENERATIONS must be >= 1 when set");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be > 0");
        }
        Ok(())
    }

    /// Retention policy applied on rotation.
    pub fn retention(&self) -> Retention {
        Retention::from_keep_last(self.retain_generations.and_then(NonZeroUsize::new))
    }

    /// OTLP endpoint, if one is configured and non-blank.
    pub fn otlp_endpoint(&self) -> Option<&str> {
        self.otel_exporter_otlp_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
    }

    /// Interval between key reloads, or `None` when reloading is disabled.
    pub fn key_reload_interval(&self) -> Option<Duration> {
        (self.key_reload_interval_secs > 0)
            .then(|| Duration::from_secs(self.key_reload_interval_secs))
    }

    /// Per-request timeout for the HTTP server.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let s = Settings::default();
        assert_eq!(s.log_level, "info");
        assert_eq!(s.key_reload_interval(), Some(Duration::from_secs(30)));
        assert_eq!(s.request_timeout(), Duration::from_secs(10));
        assert_eq!(s.retention(), Retention::Unbounded);
        assert!(s.otlp_endpoint().is_none());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_retention() {
        let s = Settings {
            retain_generations: Some(0),
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let s = Settings {
            request_timeout_secs: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_reload_interval_disables_reload() {
        let s = Settings {
            key_reload_interval_secs: 0,
            ..Settings::default()
        };
        assert!(s.key_reload_interval().is_none());
    }

    #[test]
    fn retention_from_settings() {
        let s = Settings {
            retain_generations: Some(3),
            ..Settings::default()
        };
        assert_eq!(
            s.retention(),
            Retention::KeepLast(NonZeroUsize::new(3).unwrap())
        );
    }

    #[test]
    fn blank_otlp_endpoint_is_ignored() {
        let s = Settings {
            otel_exporter_otlp_endpoint: Some("  ".into()),
            ..Settings::default()
        };
        assert!(s.otlp_endpoint().is_none());
    }
}
