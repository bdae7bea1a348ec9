//! CLI argument definitions using Clap

use clap::{Parser, Subcommand};

/// ReelLister - turn a video post into a ready-to-publish listing
#[derive(Parser, Debug)]
#[command(name = "reel-lister")]
#[command(version)]
#[command(about = "Turn Instagram video posts into product listings")]
#[command(long_about = None)]
pub struct Cli {
    /// Listing service base URL
    #[arg(short = 's', long, value_name = "URL", global = true)]
    pub server_url: Option<String>,

    /// Push channel URL (defaults to the Socket.IO endpoint of --server-url)
    #[arg(long, value_name = "URL", global = true)]
    pub channel_url: Option<String>,

    /// Directory holding the local result cache
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a post URL and wait for its listing
    Submit {
        /// Instagram post URL (https://www.instagram.com/p/<shortcode>/)
        url: String,

        /// Keep running until the cached result expires
        #[arg(long)]
        hold: bool,
    },
    /// Show the cached listing, if it is still live
    Show,
    /// Discard the cached listing and release it on the service
    Clear,
    /// Release every expired result on the service and clear the local cache
    Reset,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config action subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
}

/// Valid config keys
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "server_url",
    "channel_url",
    "default_ttl",
    "request_timeout",
    "max_assets",
    "storage_quota",
    "data_dir",
    "reset_on_start",
    "log_level",
];

/// Valid log levels
pub const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Check if a config key is valid
pub fn is_valid_config_key(key: &str) -> bool {
    VALID_CONFIG_KEYS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_submit() {
        let cli = Cli::parse_from(["reel-lister", "submit", "https://www.instagram.com/p/abc/"]);
        match cli.command {
            Commands::Submit { url, hold } => {
                assert_eq!(url, "https://www.instagram.com/p/abc/");
                assert!(!hold);
            }
            other => panic!("Expected Submit, got {:?}", other),
        }
        assert!(cli.server_url.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn cli_parses_submit_hold() {
        let cli = Cli::parse_from(["reel-lister", "submit", "--hold", "https://instagram.com/p/x/"]);
        assert!(matches!(cli.command, Commands::Submit { hold: true, .. }));
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "reel-lister",
            "show",
            "--server-url",
            "http://10.0.0.2:5000",
            "-vv",
        ]);
        assert!(matches!(cli.command, Commands::Show));
        assert_eq!(cli.server_url.as_deref(), Some("http://10.0.0.2:5000"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn cli_parses_clear_and_reset() {
        assert!(matches!(
            Cli::parse_from(["reel-lister", "clear"]).command,
            Commands::Clear
        ));
        assert!(matches!(
            Cli::parse_from(["reel-lister", "reset"]).command,
            Commands::Reset
        ));
    }

    #[test]
    fn cli_parses_config_set() {
        let cli = Cli::parse_from(["reel-lister", "config", "set", "max_assets", "12"]);
        if let Commands::Config {
            action: ConfigAction::Set { key, value },
        } = cli.command
        {
            assert_eq!(key, "max_assets");
            assert_eq!(value, "12");
        } else {
            panic!("Expected Config Set command");
        }
    }

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["reel-lister"]).is_err());
    }

    #[test]
    fn valid_config_keys() {
        assert!(is_valid_config_key("server_url"));
        assert!(is_valid_config_key("reset_on_start"));
        assert!(!is_valid_config_key("api_key"));
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
