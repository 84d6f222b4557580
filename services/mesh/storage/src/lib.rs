//! Flood deduplication storage for mesh with pluggable backends.
//!
//! Every node remembers the ids of messages it has already processed so a
//! flooded message is handled at most once. Entries age out after a
//! retention period and the cache is bounded in size.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;

use async_trait::async_trait;
use mesh_wire::MessageId;
use std::time::Duration;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Invalid configuration or operation
    #[error("Invalid operation: {0}")]
    Invalid(String),
    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Deduplication trait for flood idempotency
#[async_trait]
pub trait Dedup: Send + Sync {
    /// Record `id` as seen. Returns true when it had not been seen before.
    async fn check_and_mark(&self, id: &MessageId) -> Result<bool, StorageError>;

    /// Check if `id` has been seen and not yet aged out
    async fn contains(&self, id: &MessageId) -> Result<bool, StorageError>;

    /// Drop entries older than the retention period; returns how many were dropped
    async fn purge_expired(&self) -> Result<usize, StorageError>;

    /// Number of ids currently remembered
    async fn len(&self) -> Result<usize, StorageError>;
}

/// Dedup cache tuning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DedupConfig {
    /// How long an id is remembered
    pub retention: Duration,
    /// Upper bound on remembered ids; the oldest are evicted first
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(300),
            max_entries: 65536,
        }
    }
}

impl DedupConfig {
    /// Reject settings that would make deduplication ineffective
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.retention.is_zero() {
            return Err(StorageError::Invalid(
                "dedup retention must be greater than zero".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(StorageError::Invalid(
                "dedup max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub use backend::mem::MemoryDedup;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DedupConfig::default().validate().is_ok());

        let config = DedupConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StorageError::Invalid(_))));

        let config = DedupConfig {
            retention: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
