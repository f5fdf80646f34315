//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{Fairness, LimitConfig, TimeUnit};

/// Main configuration for Tollgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterSettings,

    /// Document client configuration
    #[serde(default)]
    pub client: ClientConfig,
}

/// Limiter settings as read from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Maximum permits per window
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Window expressed as one time unit
    #[serde(default = "default_unit")]
    pub unit: TimeUnit,

    /// Explicit window in milliseconds, takes precedence over `unit`
    #[serde(default)]
    pub window_ms: Option<u64>,

    /// Waiter ordering policy
    #[serde(default)]
    pub fairness: Fairness,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            unit: default_unit(),
            window_ms: None,
            fairness: Fairness::default(),
        }
    }
}

fn default_limit() -> usize {
    1
}

fn default_unit() -> TimeUnit {
    TimeUnit::Second
}

impl LimiterSettings {
    /// The effective window duration.
    pub fn window(&self) -> Duration {
        match self.window_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.unit.duration(),
        }
    }

    /// Validate the settings into a limiter configuration.
    pub fn to_limit_config(&self) -> Result<LimitConfig> {
        Ok(LimitConfig::new(self.limit, self.window())?.with_fairness(self.fairness))
    }
}

/// Document client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Endpoint documents are posted to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "https://ismp.crpt.ru/api/v3/lk/documents/create".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TollgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse configuration: {}", e)))
    }
}
