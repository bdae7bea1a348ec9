//! Config command handler

use crate::application::ports::ConfigStore;
use crate::domain::config::{parse_channel_url, parse_server_url, AppConfig};
use crate::domain::error::ConfigError;

use super::args::{is_valid_config_key, ConfigAction, VALID_CONFIG_KEYS, VALID_LOG_LEVELS};
use super::presenter::Presenter;

/// Handle config subcommand
pub async fn handle_config_command<S: ConfigStore>(
    action: ConfigAction,
    store: &S,
    presenter: &Presenter,
) -> Result<(), ConfigError> {
    match action {
        ConfigAction::Init => handle_init(store, presenter).await,
        ConfigAction::Set { key, value } => handle_set(store, presenter, &key, &value).await,
        ConfigAction::Get { key } => handle_get(store, presenter, &key).await,
        ConfigAction::List => handle_list(store, presenter).await,
        ConfigAction::Path => handle_path(store, presenter),
    }
}

async fn handle_init<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    store.init().await?;
    presenter.success(&format!(
        "Config file created at: {}",
        store.path().display()
    ));
    Ok(())
}

async fn handle_set<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    ensure_known_key(key)?;

    let mut config = store.load().await?;
    apply_value(&mut config, key, value)?;

    store.save(&config).await?;
    presenter.success(&format!("{} = {}", key, value));

    Ok(())
}

async fn handle_get<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
) -> Result<(), ConfigError> {
    ensure_known_key(key)?;

    let config = store.load().await?;
    match read_value(&config, key) {
        Some(v) => presenter.output(&v),
        None => presenter.output("(not set)"),
    }

    Ok(())
}

async fn handle_list<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    let config = store.load().await?;

    for key in VALID_CONFIG_KEYS {
        let value = read_value(&config, key).unwrap_or_else(|| "(not set)".to_string());
        presenter.key_value(key, &value);
    }

    Ok(())
}

fn handle_path<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    presenter.output(&store.path().to_string_lossy());
    Ok(())
}

fn ensure_known_key(key: &str) -> Result<(), ConfigError> {
    if is_valid_config_key(key) {
        return Ok(());
    }
    Err(ConfigError::ValidationError {
        key: key.to_string(),
        message: format!("Unknown key. Valid keys: {}", VALID_CONFIG_KEYS.join(", ")),
    })
}

/// Validate `value` for `key` and store it in `config`
fn apply_value(config: &mut AppConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::ValidationError {
        key: key.to_string(),
        message,
    };

    match key {
        "server_url" => {
            parse_server_url(value)?;
            config.server_url = Some(value.trim().to_string());
        }
        "channel_url" => {
            parse_channel_url(value)?;
            config.channel_url = Some(value.trim().to_string());
        }
        "default_ttl" | "request_timeout" => {
            let duration = humantime::parse_duration(value).map_err(|e| invalid(e.to_string()))?;
            if duration.is_zero() {
                return Err(invalid("Duration must be greater than zero".to_string()));
            }
            if key == "default_ttl" {
                config.default_ttl = Some(value.to_string());
            } else {
                config.request_timeout = Some(value.to_string());
            }
        }
        "max_assets" => {
            let count: usize = value
                .parse()
                .map_err(|_| invalid("Value must be a whole number".to_string()))?;
            config.max_assets = Some(count);
        }
        "storage_quota" => {
            let bytes: usize = value
                .parse()
                .map_err(|_| invalid("Value must be a size in bytes".to_string()))?;
            if bytes == 0 {
                return Err(invalid("Quota must be greater than zero".to_string()));
            }
            config.storage_quota = Some(bytes);
        }
        "data_dir" => {
            if value.trim().is_empty() {
                return Err(invalid("Directory must not be empty".to_string()));
            }
            config.data_dir = Some(value.to_string());
        }
        "reset_on_start" => {
            let flag = parse_bool(value)
                .map_err(|_| invalid("Value must be 'true' or 'false'".to_string()))?;
            config.reset_on_start = Some(flag);
        }
        "log_level" => {
            let lower = value.to_lowercase();
            if !VALID_LOG_LEVELS.contains(&lower.as_str()) {
                return Err(invalid(format!(
                    "Invalid value '{}'. Valid options: {}",
                    value,
                    VALID_LOG_LEVELS.join(", ")
                )));
            }
            config.log_level = Some(lower);
        }
        _ => return Err(invalid("Unknown key".to_string())),
    }
    Ok(())
}

fn read_value(config: &AppConfig, key: &str) -> Option<String> {
    match key {
        "server_url" => config.server_url.clone(),
        "channel_url" => config.channel_url.clone(),
        "default_ttl" => config.default_ttl.clone(),
        "request_timeout" => config.request_timeout.clone(),
        "max_assets" => config.max_assets.map(|n| n.to_string()),
        "storage_quota" => config.storage_quota.map(|n| n.to_string()),
        "data_dir" => config.data_dir.clone(),
        "reset_on_start" => config.reset_on_start.map(|b| b.to_string()),
        "log_level" => config.log_level.clone(),
        _ => None,
    }
}

/// Parse a boolean value
fn parse_bool(value: &str) -> Result<bool, ()> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(()),
    }
}
