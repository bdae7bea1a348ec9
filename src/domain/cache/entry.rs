//! Cache entry value objects

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Budget applied when the service does not grant one
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Upper bound on stored asset references
pub const MAX_ASSET_REFS: usize = 30;

/// Content fields too heavy for the local slot; assets are stored separately
pub const HEAVY_CONTENT_FIELDS: &[&str] = &["images"];

/// Reference to a generated asset, usually a server path like `/image/<id>/<file>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL of the asset, resolved against the service base URL the
    /// way a browser resolves an `<img src>`. Root-relative paths land on the
    /// origin; absolute references come back unchanged.
    pub fn resolve(&self, base_url: &str) -> String {
        Url::parse(base_url)
            .and_then(|base| base.join(&self.0))
            .map(String::from)
            .unwrap_or_else(|_| self.0.clone())
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AssetRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Persisted `(id, expiresAt)` pair used to reconcile after a restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMarker {
    pub job_id: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheMarker {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Durable snapshot of one completed job
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub job_id: String,
    pub content: Value,
    pub asset_refs: Vec<AssetRef>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry that expires `ttl` after `now`
    pub fn new(
        job_id: impl Into<String>,
        content: Value,
        asset_refs: Vec<AssetRef>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            job_id: job_id.into(),
            content,
            asset_refs,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Time left before expiry, `None` once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at - now).to_std().ok().filter(|d| !d.is_zero())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now).is_none()
    }

    pub fn marker(&self) -> CacheMarker {
        CacheMarker {
            job_id: self.job_id.clone(),
            expires_at: self.expires_at,
        }
    }

    /// Content with the heavy fields stripped, as written to the local slot
    pub fn light_content(&self) -> Value {
        match &self.content {
            Value::Object(map) => {
                let mut map = map.clone();
                for field in HEAVY_CONTENT_FIELDS {
                    map.remove(*field);
                }
                Value::Object(map)
            }
            other => other.clone(),
        }
    }

    /// Listing title if the content carries one
    pub fn title(&self) -> Option<&str> {
        self.content.get("title").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn expiry_is_now_plus_ttl() {
        let entry = CacheEntry::new("abc", json!({}), vec![], t0(), Duration::from_secs(600));
        assert_eq!(
            entry.expires_at.timestamp_millis() - t0().timestamp_millis(),
            600_000
        );
        assert_eq!(entry.created_at, t0());
    }

    #[test]
    fn remaining_counts_down_and_expires() {
        let entry = CacheEntry::new("abc", json!({}), vec![], t0(), Duration::from_secs(10));
        let later = t0() + chrono::Duration::seconds(4);
        assert_eq!(entry.remaining(later), Some(Duration::from_secs(6)));
        assert!(!entry.is_expired(later));

        let at_expiry = t0() + chrono::Duration::seconds(10);
        assert!(entry.remaining(at_expiry).is_none());
        assert!(entry.is_expired(at_expiry));
    }

    #[test]
    fn zero_ttl_is_expired_immediately() {
        let entry = CacheEntry::new("abc", json!({}), vec![], t0(), Duration::ZERO);
        assert!(entry.is_expired(t0()));
    }

    #[test]
    fn light_content_strips_images() {
        let entry = CacheEntry::new(
            "abc",
            json!({"title": "Lamp", "images": ["/image/abc/1.jpg"], "price": "20"}),
            vec![],
            t0(),
            DEFAULT_TTL,
        );
        let light = entry.light_content();
        assert!(light.get("images").is_none());
        assert_eq!(light["title"], "Lamp");
        assert_eq!(entry.title(), Some("Lamp"));
    }

    #[test]
    fn light_content_leaves_non_objects() {
        let entry = CacheEntry::new("abc", json!("plain text"), vec![], t0(), DEFAULT_TTL);
        assert_eq!(entry.light_content(), json!("plain text"));
    }

    #[test]
    fn asset_resolve() {
        let asset = AssetRef::new("/image/abc/frame_001.jpg");
        assert_eq!(
            asset.resolve("http://localhost:5000/"),
            "http://localhost:5000/image/abc/frame_001.jpg"
        );
        assert_eq!(
            AssetRef::new("image/x.jpg").resolve("http://h"),
            "http://h/image/x.jpg"
        );
        assert_eq!(
            AssetRef::new("https://cdn.example/x.jpg").resolve("http://h"),
            "https://cdn.example/x.jpg"
        );
    }

    #[test]
    fn root_relative_asset_resolves_against_origin() {
        let asset = AssetRef::new("/image/abc/frame_001.jpg");
        assert_eq!(
            asset.resolve("https://lister.example.com/api/"),
            "https://lister.example.com/image/abc/frame_001.jpg"
        );
        assert_eq!(
            asset.resolve("HTTP://Localhost:5000"),
            "http://localhost:5000/image/abc/frame_001.jpg"
        );
        // unusable base leaves the reference as-is
        assert_eq!(asset.resolve("not a url"), "/image/abc/frame_001.jpg");
    }

    #[test]
    fn marker_expiry() {
        let marker = CacheMarker {
            job_id: "r2".to_string(),
            expires_at: t0() - chrono::Duration::seconds(5),
        };
        assert!(marker.is_expired(t0()));
    }
}
