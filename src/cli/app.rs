//! Command runners

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;

use crate::application::ports::ConfigStore;
use crate::application::{JobController, JobSettings, JobUpdate, RestoreOutcome};
use crate::domain::config::{AppConfig, DEFAULT_SERVER_URL};
use crate::domain::error::ConfigError;
use crate::domain::job::JobInput;
use crate::infrastructure::{
    default_data_dir, FileStore, HttpJobApi, SystemClock, WsProgressChannel, XdgConfigStore,
};

use super::presenter::Presenter;

/// Exit codes
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;

/// Environment overrides
pub const ENV_SERVER_URL: &str = "REEL_LISTER_SERVER_URL";
pub const ENV_CHANNEL_URL: &str = "REEL_LISTER_CHANNEL_URL";

type Controller = JobController<WsProgressChannel, HttpJobApi, FileStore, SystemClock>;

/// Wire the controller to the real adapters
fn build_controller(config: &AppConfig) -> Result<Controller, String> {
    let data_dir = config.data_dir().unwrap_or_else(default_data_dir);
    let store = FileStore::open(&data_dir, config.storage_quota_or_default())
        .map_err(|e| format!("Failed to open cache in {}: {}", data_dir.display(), e))?;
    let service_url = config.service_url().map_err(|e| e.to_string())?;
    let api = HttpJobApi::new(service_url, config.request_timeout_or_default())
        .map_err(|e| e.to_string())?;
    let channel = WsProgressChannel::new(config.channel_endpoint().map_err(|e| e.to_string())?);

    tracing::debug!(
        server_url = %api.base_url(),
        channel_url = %channel.url(),
        store = %store.path().display(),
        "Wiring job controller",
    );

    Ok(JobController::new(
        Arc::new(channel),
        Arc::new(api),
        Arc::new(store),
        Arc::new(SystemClock),
        settings(config),
    ))
}

/// Base for resolving asset paths in printed listings
fn asset_base(config: &AppConfig) -> String {
    config
        .service_url()
        .map(String::from)
        .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string())
}

/// Controller tunables from the merged config
pub fn settings(config: &AppConfig) -> JobSettings {
    JobSettings {
        default_ttl: config.default_ttl_or_default(),
        max_assets: config.max_assets_or_default(),
        reset_on_start: config.reset_on_start_or_default(),
    }
}

/// Run `submit`: reconcile, submit, render progress, print the listing
pub async fn run_submit(config: &AppConfig, url: &str, hold: bool) -> ExitCode {
    let mut presenter = Presenter::new();

    let input: JobInput = match url.parse() {
        Ok(input) => input,
        Err(e) => {
            presenter.error(&format!("{}", e));
            return ExitCode::from(EXIT_USAGE_ERROR);
        }
    };

    let mut controller = match build_controller(config) {
        Ok(controller) => controller,
        Err(e) => {
            presenter.error(&e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match controller.restore().await {
        Ok(outcome) => report_stale(&presenter, &outcome),
        Err(e) => tracing::warn!(error = %e, "Skipping cache reconciliation"),
    }

    presenter.start_progress("Submitting...");
    if let Err(e) = controller.submit(&input).await {
        presenter.progress_fail("Could not reach the listing service");
        presenter.error(&e.to_string());
        controller.shutdown().await;
        return ExitCode::from(EXIT_ERROR);
    }

    let base_url = asset_base(config);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let mut completed = false;
    let code = loop {
        let update = tokio::select! {
            update = controller.next_update() => update,
            _ = &mut interrupt => {
                presenter.stop_progress();
                presenter.warn("Interrupted");
                break if completed { EXIT_SUCCESS } else { EXIT_ERROR };
            }
        };

        let Some(update) = update else {
            if completed {
                break EXIT_SUCCESS;
            }
            presenter.progress_fail("Progress channel closed");
            break EXIT_ERROR;
        };

        match update {
            JobUpdate::Progress { step, percent } => presenter.update_progress(percent, &step),
            JobUpdate::Auxiliary { text } => {
                presenter.note(&format!("Caption: {}", first_line(&text)));
            }
            JobUpdate::Completed(entry) => {
                completed = true;
                presenter.progress_success(entry.title().unwrap_or("Listing ready"));
                presenter.listing(&entry, &base_url);
                presenter.expiry(entry.remaining(Utc::now()));
                if !hold {
                    break EXIT_SUCCESS;
                }
                presenter.info("Holding until the listing expires (Ctrl-C to stop)");
            }
            JobUpdate::Failed { message } => {
                presenter.progress_fail("Processing failed");
                presenter.error(&message);
                break EXIT_ERROR;
            }
            JobUpdate::Expired { job_id } => {
                if completed {
                    presenter.info(&format!("Listing {} expired and was cleaned up", job_id));
                    break EXIT_SUCCESS;
                }
                presenter.progress_fail("Listing expired before it could be shown");
                break EXIT_ERROR;
            }
            JobUpdate::Connectivity { connected: false } => {
                presenter.note("Connection lost, reconnecting...");
            }
            JobUpdate::Connectivity { connected: true } | JobUpdate::Ignored { .. } => {}
        }
    };

    controller.shutdown().await;
    ExitCode::from(code)
}

/// Run `show`: reconcile and print the cached listing
pub async fn run_show(config: &AppConfig) -> ExitCode {
    let presenter = Presenter::new();
    let mut controller = match build_controller(config) {
        Ok(controller) => controller,
        Err(e) => {
            presenter.error(&e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let outcome = match controller.restore().await {
        Ok(outcome) => outcome,
        Err(e) => {
            presenter.error(&e.to_string());
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let code = match outcome {
        RestoreOutcome::Fresh => {
            presenter.info("No cached listing");
            EXIT_SUCCESS
        }
        RestoreOutcome::Rehydrated(entry) => {
            presenter.listing(&entry, &asset_base(config));
            presenter.expiry(entry.remaining(Utc::now()));
            EXIT_SUCCESS
        }
        RestoreOutcome::Unavailable { job_id, reason } => {
            presenter.error(&format!("Could not fetch listing {}: {}", job_id, reason));
            EXIT_ERROR
        }
        stale => {
            report_stale(&presenter, &stale);
            EXIT_SUCCESS
        }
    };

    controller.unmount();
    ExitCode::from(code)
}

/// Run `clear`: reconcile, then release the cached listing
pub async fn run_clear(config: &AppConfig) -> ExitCode {
    let presenter = Presenter::new();
    let mut controller = match build_controller(config) {
        Ok(controller) => controller,
        Err(e) => {
            presenter.error(&e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match controller.restore().await {
        Ok(RestoreOutcome::Fresh) => {
            presenter.info("Nothing to clear");
            return ExitCode::from(EXIT_SUCCESS);
        }
        Ok(outcome) => report_stale(&presenter, &outcome),
        Err(e) => tracing::warn!(error = %e, "Skipping cache reconciliation"),
    }

    controller.clear().await;
    presenter.success("Cached listing cleared");
    ExitCode::from(EXIT_SUCCESS)
}

/// Run `reset`: release everything on the service and drop the local slot
pub async fn run_reset(config: &AppConfig) -> ExitCode {
    let presenter = Presenter::new();
    let mut controller = match build_controller(config) {
        Ok(controller) => controller,
        Err(e) => {
            presenter.error(&e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    controller.reset().await;
    presenter.success("Session reset");
    ExitCode::from(EXIT_SUCCESS)
}

/// Tell the user when reconciliation already disposed of a stale listing
fn report_stale(presenter: &Presenter, outcome: &RestoreOutcome) {
    match outcome {
        RestoreOutcome::Expired { job_id } => {
            presenter.warn(&format!("Cached listing {} expired and was cleaned up", job_id));
        }
        RestoreOutcome::Invalid { job_id } => presenter.warn(&format!(
            "Cached listing {} is no longer available and was cleaned up",
            job_id
        )),
        RestoreOutcome::Unavailable { job_id, reason } => presenter.warn(&format!(
            "Could not check cached listing {}: {}",
            job_id, reason
        )),
        RestoreOutcome::Fresh | RestoreOutcome::Rehydrated(_) => {}
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

/// Load and merge configuration from file, env, and CLI.
/// Fails only when the merged service or channel URL does not parse.
pub async fn load_merged_config(cli_config: AppConfig) -> Result<AppConfig, ConfigError> {
    let store = XdgConfigStore::new();
    let file_config = store.load().await.unwrap_or_else(|e| {
        tracing::warn!(path = %store.path().display(), error = %e, "Ignoring unreadable config file");
        AppConfig::empty()
    });

    let env_config = AppConfig {
        server_url: env::var(ENV_SERVER_URL).ok().filter(|s| !s.is_empty()),
        channel_url: env::var(ENV_CHANNEL_URL).ok().filter(|s| !s.is_empty()),
        ..Default::default()
    };

    // Merge: defaults < file < env < cli
    let config = AppConfig::defaults()
        .merge(file_config)
        .merge(env_config)
        .merge(cli_config);
    config.validate()?;
    Ok(config)
}
