//! Reconciler configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ENV_DISPATCH_DEADLINE_MS: &str = "FACTSYNC_DISPATCH_DEADLINE_MS";
const ENV_RETRY_INITIAL_MS: &str = "FACTSYNC_RETRY_INITIAL_MS";
const ENV_RETRY_MAX_INTERVAL_MS: &str = "FACTSYNC_RETRY_MAX_INTERVAL_MS";
const ENV_RETRY_MAX_ELAPSED_MS: &str = "FACTSYNC_RETRY_MAX_ELAPSED_MS";

/// Bounded exponential backoff for convergence polling.
///
/// Defaults: 250ms initial interval growing by 1.5x per attempt, capped at
/// 10s per attempt, 30s overall budget. Each delay is spread by up to 50%
/// either side of the nominal interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the second read.
    #[serde(with = "duration_ms", default = "default_initial_interval")]
    pub initial_interval: Duration,

    /// Growth factor applied after each unconverged read.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Spread applied to each delay: a nominal interval `d` becomes a random
    /// value in `[d * (1 - f), d * (1 + f)]`. Zero gives exact delays.
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,

    /// Upper bound for a single delay.
    #[serde(with = "duration_ms", default = "default_max_interval")]
    pub max_interval: Duration,

    /// Overall budget measured from the first read.
    #[serde(with = "duration_ms", default = "default_max_elapsed_time")]
    pub max_elapsed_time: Duration,

    /// Optional cap on the number of reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: default_initial_interval(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
            max_interval: default_max_interval(),
            max_elapsed_time: default_max_elapsed_time(),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Zero-delay policy giving up after `max_attempts` reads.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_interval: Duration::ZERO,
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_interval: Duration::ZERO,
            max_elapsed_time: Duration::MAX,
            max_attempts: Some(max_attempts),
        }
    }

    /// Set the initial interval.
    #[must_use]
    pub const fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the growth factor.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the delay spread. Zero makes the delay sequence deterministic.
    #[must_use]
    pub const fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    /// Set the per-attempt cap.
    #[must_use]
    pub const fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the overall budget.
    #[must_use]
    pub const fn with_max_elapsed_time(mut self, budget: Duration) -> Self {
        self.max_elapsed_time = budget;
        self
    }

    /// Cap the number of reads.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Check the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a multiplier below 1.0, a
    /// randomization factor outside `[0, 1]`, a zero budget, a cap below the
    /// initial interval, or a zero attempt cap.
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::invalid_config(format!(
                "retry multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(Error::invalid_config(format!(
                "retry randomization factor must be within [0, 1], got {}",
                self.randomization_factor
            )));
        }
        if self.max_elapsed_time.is_zero() {
            return Err(Error::invalid_config("retry budget must be non-zero"));
        }
        if self.max_interval < self.initial_interval {
            return Err(Error::invalid_config(format!(
                "max retry interval {}ms is below initial interval {}ms",
                self.max_interval.as_millis(),
                self.initial_interval.as_millis()
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::invalid_config("max attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Configuration for one reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Overall deadline for the mutation phase.
    #[serde(with = "duration_ms", default = "default_dispatch_deadline")]
    pub dispatch_deadline: Duration,

    /// Convergence polling policy.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            dispatch_deadline: default_dispatch_deadline(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Override fields from `FACTSYNC_*` environment variables.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from a key lookup, using the environment variable names.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        if let Some(d) = millis(ENV_DISPATCH_DEADLINE_MS) {
            self.dispatch_deadline = d;
        }
        if let Some(d) = millis(ENV_RETRY_INITIAL_MS) {
            self.retry.initial_interval = d;
        }
        if let Some(d) = millis(ENV_RETRY_MAX_INTERVAL_MS) {
            self.retry.max_interval = d;
        }
        if let Some(d) = millis(ENV_RETRY_MAX_ELAPSED_MS) {
            self.retry.max_elapsed_time = d;
        }
        self
    }

    /// Load configuration from a file. `.json` files are read as JSON,
    /// anything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("Failed to read {}: {e}", path.display()))
        })?;

        if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::invalid_config(format!("Failed to parse config: {e}")))
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::invalid_config(format!("Failed to parse config: {e}")))
        }
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero dispatch deadline or an
    /// invalid retry policy.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch_deadline.is_zero() {
            return Err(Error::invalid_config("dispatch deadline must be non-zero"));
        }
        self.retry.validate()
    }
}

const fn default_dispatch_deadline() -> Duration {
    Duration::from_secs(30)
}

const fn default_initial_interval() -> Duration {
    Duration::from_millis(250)
}

const fn default_multiplier() -> f64 {
    1.5
}

const fn default_randomization_factor() -> f64 {
    0.5
}

const fn default_max_interval() -> Duration {
    Duration::from_secs(10)
}

const fn default_max_elapsed_time() -> Duration {
    Duration::from_secs(30)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.dispatch_deadline, Duration::from_secs(30));
        assert_eq!(config.retry.initial_interval, Duration::from_millis(250));
        assert_eq!(config.retry.max_interval, Duration::from_secs(10));
        assert_eq!(config.retry.max_elapsed_time, Duration::from_secs(30));
        assert!((config.retry.randomization_factor - 0.5).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let parsed: std::result::Result<ReconcilerConfig, _> = toml::from_str(
            r"
            dispatch_deadline = 5000

            [retry]
            initial_interval = 100
            ",
        );

        let config = parsed.ok();
        assert_eq!(
            config.as_ref().map(|c| c.dispatch_deadline),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            config.as_ref().map(|c| c.retry.initial_interval),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            config.map(|c| c.retry.max_elapsed_time),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_from_json_file() {
        let file = tempfile::Builder::new().suffix(".json").tempfile();
        assert!(file.is_ok());
        let Ok(mut file) = file else { return };
        let written = file.write_all(br#"{"retry": {"multiplier": 2.0, "max_attempts": 4}}"#);
        assert!(written.is_ok());

        let config = ReconcilerConfig::from_file(file.path()).ok();

        assert_eq!(config.as_ref().map(|c| c.retry.multiplier), Some(2.0));
        assert_eq!(config.and_then(|c| c.retry.max_attempts), Some(4));
    }

    #[test]
    fn test_missing_file_is_invalid_config() {
        let result = ReconcilerConfig::from_file(Path::new("/nonexistent/factsync.toml"));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_overrides_ignore_garbage() {
        let config = ReconcilerConfig::default().with_overrides(|key| match key {
            ENV_DISPATCH_DEADLINE_MS => Some("1500".to_string()),
            ENV_RETRY_MAX_ELAPSED_MS => Some("soon".to_string()),
            _ => None,
        });

        assert_eq!(config.dispatch_deadline, Duration::from_millis(1500));
        assert_eq!(config.retry.max_elapsed_time, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_policies() {
        assert!(RetryPolicy::default().with_multiplier(0.5).validate().is_err());
        assert!(RetryPolicy::default()
            .with_max_elapsed_time(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RetryPolicy::default()
            .with_max_interval(Duration::from_millis(10))
            .validate()
            .is_err());
        assert!(RetryPolicy::default()
            .with_randomization_factor(1.5)
            .validate()
            .is_err());
        assert!(RetryPolicy::default()
            .with_randomization_factor(f64::NAN)
            .validate()
            .is_err());
        assert!(RetryPolicy::immediate(0).validate().is_err());
        assert!(RetryPolicy::immediate(3).validate().is_ok());
    }
}
