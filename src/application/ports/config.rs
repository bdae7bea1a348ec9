//! Settings file port

use std::path::Path;

use async_trait::async_trait;

use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;

/// Persisted settings read by every command and edited by `config`
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Stored settings. A store that was never written reads as empty.
    async fn load(&self) -> Result<AppConfig, ConfigError>;

    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;

    /// Write the defaults; refuses to overwrite existing settings
    async fn init(&self) -> Result<(), ConfigError>;

    fn path(&self) -> &Path;
}
