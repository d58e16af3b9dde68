//! Execution Configuration
//!
//! Everything tunable is an injectable struct rather than a module-level
//! constant, so tests can run with tiny windows and production deployments
//! can load a YAML file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::application::RetryPolicy;
use crate::infrastructure::rate_governor::RateLimitConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration for the execution layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// How long a fetched tick size stays usable. Tick size shifts near the
    /// price extremes, so this stays at a few seconds.
    #[serde(default = "default_tick_freshness_secs")]
    pub tick_freshness_secs: u64,

    /// Pause between submission and the post-trade balance snapshot
    #[serde(default = "default_settlement_wait_ms")]
    pub settlement_wait_ms: u64,

    /// Allowed gap between expected and observed balance deltas (fees,
    /// rounding)
    #[serde(default = "default_reconcile_tolerance")]
    pub reconcile_tolerance: f64,

    /// Whether FAK orders share FOK's strict notional precision rule.
    /// The exchange documentation leaves this unspecified; set per
    /// deployment.
    #[serde(default)]
    pub strict_fak_precision: bool,

    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,

    #[serde(default = "default_fill_wait_timeout_secs")]
    pub fill_wait_timeout_secs: u64,
}

fn default_tick_freshness_secs() -> u64 {
    3
}

fn default_settlement_wait_ms() -> u64 {
    500
}

fn default_reconcile_tolerance() -> f64 {
    0.05
}

fn default_fill_poll_interval_ms() -> u64 {
    500
}

fn default_fill_wait_timeout_secs() -> u64 {
    30
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            tick_freshness_secs: default_tick_freshness_secs(),
            settlement_wait_ms: default_settlement_wait_ms(),
            reconcile_tolerance: default_reconcile_tolerance(),
            strict_fak_precision: false,
            fill_poll_interval_ms: default_fill_poll_interval_ms(),
            fill_wait_timeout_secs: default_fill_wait_timeout_secs(),
        }
    }
}

impl ExecutionConfig {
    /// Load from a YAML file and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        info!("Loaded execution config from {}", path.display());
        Ok(config)
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.reconcile_tolerance < 0.0 {
            return Err(ConfigError::ValidationError(
                "reconcile_tolerance must not be negative".to_string(),
            ));
        }
        let margin = self.rate_limits.safety_margin;
        if !(margin > 0.0 && margin <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "rate_limits.safety_margin must be in (0, 1], got {}",
                margin
            )));
        }
        if self.fill_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "fill_poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_freshness(&self) -> Duration {
        Duration::from_secs(self.tick_freshness_secs)
    }

    pub fn settlement_wait(&self) -> Duration {
        Duration::from_millis(self.settlement_wait_ms)
    }

    pub fn fill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fill_poll_interval_ms)
    }

    pub fn fill_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.fill_wait_timeout_secs)
    }
}
