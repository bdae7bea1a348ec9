//! HTTP adapters

mod job_api;

pub use job_api::HttpJobApi;
