//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod channel;
pub mod clock;
pub mod config;
pub mod job_api;
pub mod store;

// Re-export common types
pub use channel::{ChannelError, ListenerSet, ProgressChannel, Subscription};
pub use clock::Clock;
pub use config::ConfigStore;
pub use job_api::{JobApi, JobApiError, RemoteResult};
pub use store::{KeyValueStore, StoreError};
