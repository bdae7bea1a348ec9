//! Job service request/response port interface

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::cache::AssetRef;

/// Errors from the request/response endpoints
#[derive(Debug, Clone, Error)]
pub enum JobApiError {
    #[error("Result not found or already cleaned up")]
    NotFound,

    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Completed result fetched back from the service
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResult {
    pub job_id: String,
    pub content: Value,
    pub asset_refs: Vec<AssetRef>,
}

/// Port for the service endpoints used outside the push channel
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Fetch a finished result by id (used when reconciling after a restart)
    async fn fetch_result(&self, job_id: &str) -> Result<RemoteResult, JobApiError>;

    /// Release server-side resources for one job. Idempotent.
    async fn cleanup(&self, job_id: &str) -> Result<(), JobApiError>;

    /// Release every expired server-side resource. Idempotent.
    async fn cleanup_all(&self) -> Result<(), JobApiError>;
}
