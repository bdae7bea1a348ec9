//! Infrastructure layer - Adapter implementations
//!
//! Contains concrete implementations of the port interfaces,
//! integrating with external systems like the listing service's
//! Socket.IO and HTTP endpoints and local storage.

pub mod channel;
pub mod clock;
pub mod config;
pub mod http;
pub mod storage;

// Re-export adapters
pub use channel::WsProgressChannel;
pub use clock::{ManualClock, SystemClock};
pub use config::{default_data_dir, XdgConfigStore};
pub use http::HttpJobApi;
pub use storage::{FileStore, MemoryStore};
