//! Error types for billvault operations

use crate::Tier;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a storage tier.
///
/// "Not found" is never an error: lookups return `Option` instead, so every
/// variant here means the tier could not answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TierError {
    #[error("{tier} tier unavailable during {operation}: {reason}")]
    Transient {
        tier: Tier,
        operation: &'static str,
        reason: String,
    },

    #[error("{tier} tier timed out during {operation} after {after:?}")]
    Timeout {
        tier: Tier,
        operation: &'static str,
        after: Duration,
    },

    #[error("Corrupt data in {tier} tier at {key}: {reason}")]
    Corrupt {
        tier: Tier,
        key: String,
        reason: String,
    },
}

impl TierError {
    pub fn transient(tier: Tier, operation: &'static str, reason: impl ToString) -> Self {
        Self::Transient {
            tier,
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn corrupt(tier: Tier, key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupt {
            tier,
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether another attempt could succeed. Corrupt data stays corrupt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    pub fn tier(&self) -> Tier {
        match self {
            Self::Transient { tier, .. } | Self::Timeout { tier, .. } | Self::Corrupt { tier, .. } => {
                *tier
            }
        }
    }
}

/// Result type alias for tier operations.
pub type TierResult<T> = Result<T, TierError>;

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid record id {value:?}: {reason}")]
    InvalidRecordId { value: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all billvault errors.
#[derive(Debug, Clone, Error)]
pub enum BillvaultError {
    #[error("Tier error: {0}")]
    Tier(#[from] TierError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for billvault operations.
pub type BillvaultResult<T> = Result<T, BillvaultError>;

// =============================================================================
// TESTS
// =============================================================================
