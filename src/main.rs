//! ReelLister CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use reel_lister::cli::{
    app::{load_merged_config, run_clear, run_reset, run_show, run_submit, EXIT_ERROR, EXIT_USAGE_ERROR},
    args::{Cli, Commands},
    config_cmd::handle_config_command,
    presenter::Presenter,
};
use reel_lister::domain::config::AppConfig;
use reel_lister::infrastructure::XdgConfigStore;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let presenter = Presenter::new();

    let overrides = AppConfig {
        server_url: cli.server_url,
        channel_url: cli.channel_url,
        data_dir: cli.data_dir,
        log_level: verbosity(cli.verbose).map(str::to_string),
        ..AppConfig::empty()
    };

    match cli.command {
        // Config management never touches the service
        Commands::Config { action } => {
            init_tracing(overrides.log_level_or_default());
            match handle_config_command(action, &XdgConfigStore::new(), &presenter).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    presenter.error(&e.to_string());
                    ExitCode::from(EXIT_ERROR)
                }
            }
        }
        Commands::Submit { url, hold } => match session_config(overrides, &presenter).await {
            Ok(config) => run_submit(&config, &url, hold).await,
            Err(code) => code,
        },
        Commands::Show => match session_config(overrides, &presenter).await {
            Ok(config) => run_show(&config).await,
            Err(code) => code,
        },
        Commands::Clear => match session_config(overrides, &presenter).await {
            Ok(config) => run_clear(&config).await,
            Err(code) => code,
        },
        Commands::Reset => match session_config(overrides, &presenter).await {
            Ok(config) => run_reset(&config).await,
            Err(code) => code,
        },
    }
}

/// Merge file, env and flags for a command that talks to the service
async fn session_config(overrides: AppConfig, presenter: &Presenter) -> Result<AppConfig, ExitCode> {
    match load_merged_config(overrides).await {
        Ok(config) => {
            init_tracing(config.log_level_or_default());
            Ok(config)
        }
        Err(e) => {
            presenter.error(&e.to_string());
            Err(ExitCode::from(EXIT_USAGE_ERROR))
        }
    }
}

/// `-v` flags override the configured level
fn verbosity(count: u8) -> Option<&'static str> {
    match count {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Logs go to stderr so stdout stays clean for listings; `RUST_LOG` wins
fn init_tracing(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("reel_lister={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
