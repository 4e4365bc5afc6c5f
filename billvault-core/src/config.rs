//! Archival and retry configuration.

use crate::{ConfigError, Timestamp};
use std::time::Duration;

/// Default age in days after which a hot record becomes a migration candidate.
pub const DEFAULT_ARCHIVE_THRESHOLD_DAYS: u32 = 90;

/// Controls which records the migrator moves and how the hot copy is retired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalConfig {
    /// Records created strictly before `now - threshold` are candidates.
    pub archive_threshold_days: u32,
    /// Expiry applied to the hot copy after archival. Short, never zero.
    pub retire_ttl: Duration,
    /// Max records processed concurrently within one run.
    pub concurrency: usize,
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            archive_threshold_days: DEFAULT_ARCHIVE_THRESHOLD_DAYS,
            retire_ttl: Duration::from_secs(1),
            concurrency: 8,
        }
    }
}

impl ArchivalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.archive_threshold_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "archive_threshold_days".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.retire_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "retire_ttl".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Records created strictly before this instant are eligible.
    pub fn cutoff(&self, now: Timestamp) -> Timestamp {
        now - chrono::Duration::days(i64::from(self.archive_threshold_days))
    }
}

/// Exponential backoff settings for tier calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based), capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let mut delay = self.initial_backoff;
        for _ in 1..retry {
            let next_ms = (delay.as_millis() as f64 * self.backoff_multiplier).round();
            delay = Duration::from_millis(next_ms as u64);
            if delay >= self.max_backoff {
                return self.max_backoff;
            }
        }
        delay.min(self.max_backoff)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "backoff_multiplier".to_string(),
                value: self.backoff_multiplier.to_string(),
                reason: "must be at least 1.0".to_string(),
            });
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "attempt_timeout".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archival_defaults_validate() {
        let config = ArchivalConfig::default();
        assert_eq!(config.archive_threshold_days, 90);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_archival_rejects_zero_threshold() {
        let config = ArchivalConfig {
            archive_threshold_days: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "archive_threshold_days"
        ));
    }

    #[test]
    fn test_archival_rejects_zero_ttl() {
        let config = ArchivalConfig {
            retire_ttl: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cutoff_subtracts_days() {
        let config = ArchivalConfig::default();
        let now: Timestamp = "2024-04-30T12:00:00Z".parse().unwrap();
        let cutoff = config.cutoff(now);
        assert_eq!(cutoff.to_rfc3339(), "2024-01-31T12:00:00+00:00");
    }

    #[test]
    fn test_backoff_progression() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            ..Default::default()
        };
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(350));
        assert_eq!(config.backoff_for(10), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_rejects_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
