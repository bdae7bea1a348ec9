//! Application layer - Use cases and port interfaces
//!
//! Contains the job lifecycle operations and trait definitions
//! for external system interactions.

pub mod cleanup;
pub mod job_controller;
pub mod ports;
pub mod result_cache;
pub mod scheduler;

// Re-export use cases
pub use cleanup::CleanupCoordinator;
pub use job_controller::{
    ControllerError, JobController, JobSettings, JobUpdate, RestoreOutcome, CONNECTION_LOST,
};
pub use result_cache::{ResultCache, SaveOutcome};
pub use scheduler::{Arming, ExpirationScheduler, Expiry};
