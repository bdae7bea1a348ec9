//! Cache domain module

mod entry;

pub use entry::{AssetRef, CacheEntry, CacheMarker, DEFAULT_TTL, HEAVY_CONTENT_FIELDS, MAX_ASSET_REFS};
