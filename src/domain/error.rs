//! Domain error types

use thiserror::Error;

/// Error when a submitted URL is not a processable post link
#[derive(Debug, Clone, Error)]
#[error("Invalid post URL: \"{input}\". Expected an Instagram post link such as https://www.instagram.com/p/<shortcode>/")]
pub struct InvalidPostUrl {
    pub input: String,
}

/// Error when configuration fails
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid config value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    #[error("Config file already exists at: {0}")]
    AlreadyExists(String),
}
