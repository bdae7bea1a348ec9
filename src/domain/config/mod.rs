//! Configuration domain module

mod app_config;

pub use app_config::{
    parse_channel_url, parse_server_url, AppConfig, DEFAULT_SERVER_URL, DEFAULT_STORAGE_QUOTA,
};
