//! Key/value storage port interface

use thiserror::Error;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Stored value is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Port for durable per-device key/value storage.
///
/// Values are serialized text. Writes are synchronous, so callers never
/// observe a half-applied write.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
