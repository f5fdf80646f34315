//! Window and limit definitions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TollgateError};

/// Time unit for "N permits per unit" limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Per-second rate limiting
    Second,
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// How waiting callers compete for freed permits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fairness {
    /// Admission is decided at wake time; a later caller may overtake an earlier one.
    #[default]
    Unordered,
    /// Waiters are served strictly in arrival order.
    Fifo,
}

/// Validated limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    limit: usize,
    window: Duration,
    fairness: Fairness,
}

impl LimitConfig {
    /// Create a configuration allowing `limit` permits per `window`.
    ///
    /// Fails with [`TollgateError::InvalidConfiguration`] when either value is zero.
    pub fn new(limit: usize, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "limit must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(TollgateError::InvalidConfiguration(
                "window duration must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            limit,
            window,
            fairness: Fairness::default(),
        })
    }

    /// Create a configuration allowing `limit` permits per `unit`.
    pub fn per_unit(unit: TimeUnit, limit: usize) -> Result<Self> {
        Self::new(limit, unit.duration())
    }

    /// Set the waiter ordering policy.
    pub fn with_fairness(mut self, fairness: Fairness) -> Self {
        self.fairness = fairness;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn fairness(&self) -> Fairness {
        self.fairness
    }
}
