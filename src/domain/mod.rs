//! Domain layer - Core business logic
//!
//! Contains value objects, entities, and domain errors.
//! This layer has no dependencies on external systems.

pub mod cache;
pub mod config;
pub mod error;
pub mod job;

// Re-export common types
pub use cache::{AssetRef, CacheEntry, CacheMarker};
pub use config::AppConfig;
pub use error::*;
pub use job::{ChannelEvent, InvalidStateTransition, Job, JobInput, JobResult, JobState};
