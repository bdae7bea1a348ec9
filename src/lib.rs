//! ReelLister - client-side job lifecycle for video-to-listing processing
//!
//! Submits a post URL to the listing service, follows progress over a push
//! channel, caches the finished listing locally for a bounded time, and
//! releases it on the service once it expires.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Job state machine, events, cache entries, config, and errors
//! - **Application**: Port traits, the result cache, expiry scheduling, cleanup,
//!   and the job controller
//! - **Infrastructure**: Socket.IO channel, HTTP job API, file/memory stores,
//!   clocks, and the XDG config file
//! - **CLI**: Command-line interface, argument parsing, and output rendering

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
