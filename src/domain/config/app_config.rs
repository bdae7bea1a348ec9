//! Application configuration value object

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::domain::cache::{DEFAULT_TTL, MAX_ASSET_REFS};
use crate::domain::error::ConfigError;

/// Default listing service
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Default local storage quota (5 MiB, same as browser local storage)
pub const DEFAULT_STORAGE_QUOTA: usize = 5 * 1024 * 1024;

/// Socket.IO endpoint path on the service origin
const SOCKET_IO_PATH: &str = "/socket.io/";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_LOG_LEVEL: &str = "warn";

/// Application configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server_url: Option<String>,
    pub channel_url: Option<String>,
    pub default_ttl: Option<String>,
    pub request_timeout: Option<String>,
    pub max_assets: Option<usize>,
    pub storage_quota: Option<usize>,
    pub data_dir: Option<String>,
    pub reset_on_start: Option<bool>,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            server_url: Some(DEFAULT_SERVER_URL.to_string()),
            channel_url: None,
            default_ttl: Some("10m".to_string()),
            request_timeout: Some("10s".to_string()),
            max_assets: Some(MAX_ASSET_REFS),
            storage_quota: Some(DEFAULT_STORAGE_QUOTA),
            data_dir: None,
            reset_on_start: Some(false),
            log_level: Some(DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            server_url: other.server_url.or(self.server_url),
            channel_url: other.channel_url.or(self.channel_url),
            default_ttl: other.default_ttl.or(self.default_ttl),
            request_timeout: other.request_timeout.or(self.request_timeout),
            max_assets: other.max_assets.or(self.max_assets),
            storage_quota: other.storage_quota.or(self.storage_quota),
            data_dir: other.data_dir.or(self.data_dir),
            reset_on_start: other.reset_on_start.or(self.reset_on_start),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// Listing service base URL
    pub fn service_url(&self) -> Result<Url, ConfigError> {
        let raw = self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL);
        parse_server_url(raw)
    }

    /// Push channel endpoint. Without an explicit `channel_url` this is the
    /// Socket.IO path on the service origin with the scheme swapped to ws(s).
    pub fn channel_endpoint(&self) -> Result<Url, ConfigError> {
        if let Some(raw) = self.channel_url.as_deref() {
            return parse_channel_url(raw);
        }

        let mut url = self.service_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| ConfigError::ValidationError {
            key: "server_url".to_string(),
            message: "Cannot derive a WebSocket URL from it".to_string(),
        })?;
        url.set_path(SOCKET_IO_PATH);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    /// Reject URLs that would only fail later, once a job is underway
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service_url()?;
        self.channel_endpoint()?;
        Ok(())
    }

    /// Get default TTL, or 10 minutes if not set/invalid
    pub fn default_ttl_or_default(&self) -> Duration {
        self.default_ttl
            .as_deref()
            .and_then(|s| humantime::parse_duration(s).ok())
            .unwrap_or(DEFAULT_TTL)
    }

    /// Get HTTP request timeout, or 10 seconds if not set/invalid
    pub fn request_timeout_or_default(&self) -> Duration {
        self.request_timeout
            .as_deref()
            .and_then(|s| humantime::parse_duration(s).ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn max_assets_or_default(&self) -> usize {
        self.max_assets.unwrap_or(MAX_ASSET_REFS)
    }

    pub fn storage_quota_or_default(&self) -> usize {
        self.storage_quota.unwrap_or(DEFAULT_STORAGE_QUOTA)
    }

    /// Explicit data directory, if one was configured
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_deref().map(PathBuf::from)
    }

    pub fn reset_on_start_or_default(&self) -> bool {
        self.reset_on_start.unwrap_or(false)
    }

    pub fn log_level_or_default(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }
}

/// Parse a listing service URL (http or https)
pub fn parse_server_url(raw: &str) -> Result<Url, ConfigError> {
    parse_url("server_url", raw, &["http", "https"])
}

/// Parse a push channel URL (ws or wss)
pub fn parse_channel_url(raw: &str) -> Result<Url, ConfigError> {
    parse_url("channel_url", raw, &["ws", "wss"])
}

fn parse_url(key: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let invalid = |message: String| ConfigError::ValidationError {
        key: key.to_string(),
        message,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(format!("'{}' is not a URL: {}", raw, e)))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(format!(
            "Unsupported scheme '{}'; expected {}",
            url.scheme(),
            schemes.join(" or ")
        )));
    }
    if url.host_str().is_none() {
        return Err(invalid(format!("'{}' has no host", raw)));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let config = AppConfig::defaults();
        assert_eq!(config.server_url.as_deref(), Some("http://localhost:5000"));
        assert!(config.channel_url.is_none());
        assert_eq!(config.default_ttl_or_default(), Duration::from_secs(600));
        assert_eq!(config.request_timeout_or_default(), Duration::from_secs(10));
        assert_eq!(config.max_assets_or_default(), 30);
        assert_eq!(config.storage_quota_or_default(), 5 * 1024 * 1024);
        assert!(!config.reset_on_start_or_default());
        assert_eq!(config.log_level_or_default(), "warn");
    }

    #[test]
    fn empty_has_all_none() {
        let config = AppConfig::empty();
        assert!(config.server_url.is_none());
        assert!(config.default_ttl.is_none());
        assert!(config.max_assets.is_none());
        assert!(config.reset_on_start.is_none());
    }

    #[test]
    fn merge_other_takes_precedence() {
        let base = AppConfig {
            server_url: Some("http://base:5000".to_string()),
            default_ttl: Some("10m".to_string()),
            ..Default::default()
        };
        let other = AppConfig {
            server_url: Some("https://other".to_string()),
            default_ttl: None,
            max_assets: Some(5),
            ..Default::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.server_url.as_deref(), Some("https://other"));
        assert_eq!(merged.default_ttl.as_deref(), Some("10m"));
        assert_eq!(merged.max_assets, Some(5));
    }

    #[test]
    fn channel_endpoint_derived_from_server_url() {
        let config = AppConfig {
            server_url: Some("https://lister.example.com/".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.channel_endpoint().unwrap().as_str(),
            "wss://lister.example.com/socket.io/"
        );

        let plain = AppConfig::defaults();
        assert_eq!(
            plain.channel_endpoint().unwrap().as_str(),
            "ws://localhost:5000/socket.io/"
        );
    }

    #[test]
    fn channel_endpoint_handles_case_port_and_query() {
        let config = AppConfig {
            server_url: Some("HTTP://Lister.Example.com:8443/api?token=abc#top".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.channel_endpoint().unwrap().as_str(),
            "ws://lister.example.com:8443/socket.io/"
        );
        // the service URL itself keeps its query
        assert_eq!(
            config.service_url().unwrap().as_str(),
            "http://lister.example.com:8443/api?token=abc#top"
        );
    }

    #[test]
    fn explicit_channel_url_wins() {
        let config = AppConfig {
            server_url: Some("http://a".to_string()),
            channel_url: Some("ws://b/events".to_string()),
            ..Default::default()
        };
        assert_eq!(config.channel_endpoint().unwrap().as_str(), "ws://b/events");
    }

    #[test]
    fn unparsable_urls_fail_validation() {
        let config = AppConfig {
            server_url: Some("localhost:5000".to_string()),
            ..AppConfig::defaults()
        };
        match config.validate() {
            Err(ConfigError::ValidationError { key, .. }) => assert_eq!(key, "server_url"),
            other => panic!("unexpected result: {:?}", other),
        }

        let config = AppConfig {
            channel_url: Some("https://b/events".to_string()),
            ..AppConfig::defaults()
        };
        match config.validate() {
            Err(ConfigError::ValidationError { key, .. }) => assert_eq!(key, "channel_url"),
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(AppConfig::defaults().validate().is_ok());
    }

    #[test]
    fn durations_parse_humantime() {
        let config = AppConfig {
            default_ttl: Some("2m 30s".to_string()),
            request_timeout: Some("500ms".to_string()),
            ..Default::default()
        };
        assert_eq!(config.default_ttl_or_default(), Duration::from_secs(150));
        assert_eq!(config.request_timeout_or_default(), Duration::from_millis(500));
    }

    #[test]
    fn invalid_duration_uses_default() {
        let config = AppConfig {
            default_ttl: Some("soon".to_string()),
            ..Default::default()
        };
        assert_eq!(config.default_ttl_or_default(), DEFAULT_TTL);
    }

    #[test]
    fn explicit_data_dir() {
        let config = AppConfig {
            data_dir: Some("/tmp/lister".to_string()),
            ..Default::default()
        };
        assert_eq!(config.data_dir(), Some(PathBuf::from("/tmp/lister")));
        assert_eq!(AppConfig::empty().data_dir(), None);
    }
}
