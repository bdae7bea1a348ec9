//! Settings and cache locations under the XDG base directories

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::application::ports::ConfigStore;
use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;

const APP_DIR: &str = "reel-lister";
const CONFIG_FILE: &str = "config.toml";

/// Cache directory used when `data_dir` is not configured:
/// `$XDG_DATA_HOME/reel-lister`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join(APP_DIR)
}

/// TOML settings at `$XDG_CONFIG_HOME/reel-lister/config.toml`
pub struct XdgConfigStore {
    path: PathBuf,
}

impl XdgConfigStore {
    pub fn new() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(APP_DIR);
        Self::with_path(dir.join(CONFIG_FILE))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn render(config: &AppConfig) -> Result<String, ConfigError> {
        toml::to_string_pretty(config).map_err(|e| ConfigError::WriteError(e.to_string()))
    }

    async fn ensure_parent(&self) -> Result<(), ConfigError> {
        match self.path.parent() {
            Some(dir) => fs::create_dir_all(dir)
                .await
                .map_err(|e| ConfigError::WriteError(format!("{}: {}", dir.display(), e))),
            None => Ok(()),
        }
    }

    fn write_error(&self, e: std::io::Error) -> ConfigError {
        ConfigError::WriteError(format!("{}: {}", self.path.display(), e))
    }
}

impl Default for XdgConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for XdgConfigStore {
    async fn load(&self) -> Result<AppConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(AppConfig::empty()),
            Err(e) => {
                return Err(ConfigError::ReadError(format!("{}: {}", self.path.display(), e)))
            }
        };

        toml::from_str(&text)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", self.path.display(), e)))
    }

    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let text = Self::render(config)?;
        self.ensure_parent().await?;
        fs::write(&self.path, text)
            .await
            .map_err(|e| self.write_error(e))
    }

    async fn init(&self) -> Result<(), ConfigError> {
        let text = Self::render(&AppConfig::defaults())?;
        self.ensure_parent().await?;

        // create_new: never clobber existing settings
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ConfigError::AlreadyExists(self.path.display().to_string()))
            }
            Err(e) => return Err(self.write_error(e)),
        };

        file.write_all(text.as_bytes())
            .await
            .map_err(|e| self.write_error(e))?;
        file.flush().await.map_err(|e| self.write_error(e))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
