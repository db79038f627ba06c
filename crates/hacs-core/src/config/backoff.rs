//! Reconnection backoff configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs_f64;

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs_f64")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs_f64")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

impl BackoffConfig {
    /// Check that the values describe a usable, non-shrinking backoff
    pub fn validate(&self) -> Result<(), String> {
        if self.initial.is_zero() {
            return Err("backoff.initial must be greater than zero".to_string());
        }
        if self.max < self.initial {
            return Err("backoff.max must not be smaller than backoff.initial".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("backoff.multiplier must be a finite number of at least 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("backoff.jitter must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}
