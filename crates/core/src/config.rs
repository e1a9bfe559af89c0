//! Controller configuration.
//!
//! Values are resolved in order: built-in defaults, an optional TOML file,
//! then `FLUXER_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Finalizer registered on every parent this controller manages.
pub const DEFAULT_FINALIZER: &str = "apps.kloudy.uk/finalizer";

/// Tunables for the reconciler and its loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Finalizer name guarding parent deletion.
    pub finalizer: String,

    /// Delay before retrying a parent whose chart version is not resolved yet.
    #[serde(with = "duration_secs")]
    pub requeue_after: Duration,

    /// Polling interval written into image repositories.
    #[serde(with = "duration_secs")]
    pub image_scan_interval: Duration,

    /// Reconciliation interval written into Helm releases.
    #[serde(with = "duration_secs")]
    pub release_interval: Duration,

    /// Tick interval of the reconciliation loop.
    #[serde(with = "duration_secs")]
    pub loop_interval: Duration,

    /// First retry delay after a failed invocation.
    #[serde(with = "duration_secs")]
    pub error_backoff_base: Duration,

    /// Upper bound for the error retry delay.
    #[serde(with = "duration_secs")]
    pub error_backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            finalizer: DEFAULT_FINALIZER.to_string(),
            requeue_after: Duration::from_secs(30),
            image_scan_interval: Duration::from_secs(60),
            release_interval: Duration::from_secs(60),
            loop_interval: Duration::from_secs(5),
            error_backoff_base: Duration::from_secs(5),
            error_backoff_max: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from an optional file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an environment
    /// override is not a valid number, or the result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        debug!(path = %path.display(), "Loaded controller configuration file");
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid TOML for this schema.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::toml_parse_failed(e.to_string()))
    }

    /// Apply `FLUXER_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a duration override is not a whole number of seconds.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(finalizer) = lookup("FLUXER_FINALIZER") {
            self.finalizer = finalizer;
        }

        let durations: [(&str, &mut Duration); 6] = [
            ("FLUXER_REQUEUE_AFTER_SECS", &mut self.requeue_after),
            ("FLUXER_IMAGE_SCAN_INTERVAL_SECS", &mut self.image_scan_interval),
            ("FLUXER_RELEASE_INTERVAL_SECS", &mut self.release_interval),
            ("FLUXER_LOOP_INTERVAL_SECS", &mut self.loop_interval),
            ("FLUXER_ERROR_BACKOFF_BASE_SECS", &mut self.error_backoff_base),
            ("FLUXER_ERROR_BACKOFF_MAX_SECS", &mut self.error_backoff_max),
        ];
        for (key, slot) in durations {
            if let Some(raw) = lookup(key) {
                let secs = raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| Error::invalid_config(key, e.to_string()))?;
                *slot = Duration::from_secs(secs);
            }
        }

        Ok(self)
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty finalizer, a zero duration, or a backoff
    /// ceiling below its base.
    pub fn validate(&self) -> Result<()> {
        if self.finalizer.trim().is_empty() {
            return Err(Error::invalid_config("finalizer", "must not be empty"));
        }

        let durations = [
            ("requeue_after", self.requeue_after),
            ("image_scan_interval", self.image_scan_interval),
            ("release_interval", self.release_interval),
            ("loop_interval", self.loop_interval),
            ("error_backoff_base", self.error_backoff_base),
            ("error_backoff_max", self.error_backoff_max),
        ];
        if let Some((key, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::invalid_config(*key, "must be greater than zero"));
        }

        if self.error_backoff_max < self.error_backoff_base {
            return Err(Error::invalid_config(
                "error_backoff_max",
                "must not be smaller than error_backoff_base",
            ));
        }

        Ok(())
    }
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
