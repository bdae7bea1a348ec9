//! CLI layer - Command-line interface
//!
//! Contains argument parsing, output formatting, config management,
//! and the command runners.

pub mod app;
pub mod args;
pub mod config_cmd;
pub mod presenter;

// Re-export commonly used types
pub use app::{
    load_merged_config, run_clear, run_reset, run_show, run_submit, EXIT_ERROR, EXIT_SUCCESS,
    EXIT_USAGE_ERROR,
};
pub use args::{Cli, Commands, ConfigAction};
pub use presenter::Presenter;
