//! Typed persistent store for the single cached result
//!
//! All reads and writes of the result slot go through [`ResultCache`],
//! so serialization and the quota fallback live in one place.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::cache::{AssetRef, CacheEntry, CacheMarker};

use super::ports::{KeyValueStore, StoreError};

pub const KEY_LAST_JOB_ID: &str = "last_job_id";
pub const KEY_EXPIRES_AT: &str = "expires_at";
pub const KEY_CONTENT: &str = "listing_content";
pub const KEY_ASSETS: &str = "listing_assets";
pub const KEY_CREATED_AT: &str = "created_at";

/// Every key that belongs to the slot
const SLOT_KEYS: &[&str] = &[
    KEY_LAST_JOB_ID,
    KEY_EXPIRES_AT,
    KEY_CONTENT,
    KEY_ASSETS,
    KEY_CREATED_AT,
];

/// How a cache entry ended up in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Content and asset list were stored
    Complete,
    /// The quota was hit; content was stored without the asset list
    AssetsOmitted,
}

/// Single-slot durable cache of the most recent completed job
pub struct ResultCache<S: KeyValueStore> {
    store: Arc<S>,
    max_assets: usize,
}

impl<S: KeyValueStore> Clone for ResultCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_assets: self.max_assets,
        }
    }
}

impl<S: KeyValueStore> ResultCache<S> {
    pub fn new(store: Arc<S>, max_assets: usize) -> Self {
        Self { store, max_assets }
    }

    /// Replace the slot with `entry`.
    ///
    /// A quota failure is retried once without the asset list.
    pub fn save(&self, entry: &CacheEntry) -> Result<SaveOutcome, StoreError> {
        match self.write_slot(entry, true) {
            Ok(()) => Ok(SaveOutcome::Complete),
            Err(e) if e.is_quota_exceeded() => {
                tracing::warn!(
                    job_id = %entry.job_id,
                    error = %e,
                    "Storage quota exceeded, retrying without assets",
                );
                self.write_slot(entry, false)?;
                Ok(SaveOutcome::AssetsOmitted)
            }
            Err(e) => Err(e),
        }
    }

    /// Persisted `(id, expiresAt)` pair, if any
    pub fn load_marker(&self) -> Result<Option<CacheMarker>, StoreError> {
        let Some(job_id) = self.read::<String>(KEY_LAST_JOB_ID)? else {
            return Ok(None);
        };
        let Some(expires_at) = self.read_timestamp(KEY_EXPIRES_AT)? else {
            return Ok(None);
        };
        Ok(Some(CacheMarker { job_id, expires_at }))
    }

    /// Full entry, `None` when the marker or the content is missing
    pub fn load_entry(&self) -> Result<Option<CacheEntry>, StoreError> {
        let Some(marker) = self.load_marker()? else {
            return Ok(None);
        };
        let Some(content) = self.read::<Value>(KEY_CONTENT)? else {
            return Ok(None);
        };
        let asset_refs = self.read::<Vec<AssetRef>>(KEY_ASSETS)?.unwrap_or_default();
        let created_at = self
            .read_timestamp(KEY_CREATED_AT)?
            .unwrap_or(marker.expires_at);

        Ok(Some(CacheEntry {
            job_id: marker.job_id,
            content,
            asset_refs,
            created_at,
            expires_at: marker.expires_at,
        }))
    }

    /// Remove every key of the slot. Each key is attempted even if one fails.
    pub(crate) fn clear(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        for key in SLOT_KEYS {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!(key, error = %e, "Failed to remove cached key");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn write_slot(&self, entry: &CacheEntry, with_assets: bool) -> Result<(), StoreError> {
        // Free the previous slot first so it never counts against the quota
        self.clear()?;

        let result = self.write_fields(entry, with_assets);
        if result.is_err() {
            let _ = self.clear();
        }
        result
    }

    fn write_fields(&self, entry: &CacheEntry, with_assets: bool) -> Result<(), StoreError> {
        self.write(KEY_CONTENT, &entry.light_content())?;
        if with_assets {
            let assets: Vec<&AssetRef> = entry.asset_refs.iter().take(self.max_assets).collect();
            self.write(KEY_ASSETS, &assets)?;
        }
        self.write(KEY_CREATED_AT, &entry.created_at.timestamp_millis())?;
        // Marker last: a slot without a marker is never loaded
        self.write(KEY_EXPIRES_AT, &entry.expires_at.timestamp_millis())?;
        self.write(KEY_LAST_JOB_ID, &entry.job_id)
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.store.set(key, &text)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(text) = self.store.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring corrupt cached value");
                Ok(None)
            }
        }
    }

    fn read_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .read::<i64>(key)?
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }
}
