//! billvault Core - Record and Location Types
//!
//! Pure data structures shared by the storage adapters, the archival
//! migrator and the HTTP layer. This crate performs no I/O.

pub mod config;
pub mod error;

pub use config::{ArchivalConfig, RetryConfig};
pub use error::{
    BillvaultError, BillvaultResult, ConfigError, TierError, TierResult, ValidationError,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// JSON document carried by a record. Never interpreted beyond `id`/`createdAt`.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Maximum accepted identifier length in bytes.
pub const MAX_RECORD_ID_LEN: usize = 255;

/// Opaque, globally unique record identifier.
///
/// The identifier becomes the last path segment of the cold-tier key, so
/// anything that could escape or alias that segment is rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Parse and validate a record identifier.
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("must not be empty")
        } else if value.len() > MAX_RECORD_ID_LEN {
            Some("must be at most 255 bytes")
        } else if value == "." || value == ".." {
            Some("must not be a relative path component")
        } else if value.contains('/') || value.contains('\\') {
            Some("must not contain path separators")
        } else if value.chars().any(char::is_control) {
            Some("must not contain control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ValidationError::InvalidRecordId {
                value,
                reason: reason.to_string(),
            }),
            None => Ok(Self(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RecordId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// A billing record, the unit of storage in both tiers.
///
/// Serialises to a flat JSON object: `id`, `createdAt`, then the payload
/// fields in the order the upstream writer produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Assigned at creation, immutable. Together with `id` the sole input
    /// to cold key derivation.
    #[serde(rename = "createdAt")]
    pub created_at: Timestamp,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Record {
    pub fn new(id: RecordId, created_at: Timestamp, payload: Payload) -> Self {
        Self {
            id,
            created_at,
            payload,
        }
    }

    /// Canonical JSON encoding.
    ///
    /// The hot read path and the cold object body both use this encoding, so
    /// a record reads back byte-identical from either tier.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Cold-tier key this record archives to.
    pub fn cold_key(&self) -> ColdKey {
        ColdKey::derive(&self.id, self.created_at)
    }

    /// Whether the record is older than `cutoff`.
    pub fn is_older_than(&self, cutoff: Timestamp) -> bool {
        self.created_at < cutoff
    }
}

// ============================================================================
// LOCATION
// ============================================================================

/// Date-partitioned object key in the cold tier: `{YYYY}/{MM}/{DD}/{id}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColdKey(String);

impl ColdKey {
    /// Derive the key from the record identity alone. Reproducible without
    /// touching storage.
    pub fn derive(id: &RecordId, created_at: Timestamp) -> Self {
        Self(format!("{}/{}.json", created_at.format("%Y/%m/%d"), id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authoritative mapping from a record to its archived object.
///
/// Written once by the migrator, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub id: RecordId,
    #[serde(rename = "coldKey")]
    pub cold_key: ColdKey,
    #[serde(rename = "archivedAt")]
    pub archived_at: Timestamp,
}

impl LocationEntry {
    pub fn new(id: RecordId, cold_key: ColdKey, archived_at: Timestamp) -> Self {
        Self {
            id,
            cold_key,
            archived_at,
        }
    }
}

/// Storage tier discriminator used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Cold,
    Index,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Hot => "hot",
            Tier::Cold => "cold",
            Tier::Index => "index",
        };
        f.write_str(name)
    }
}

// ============================================================================
// TESTS
// ============================================================================
