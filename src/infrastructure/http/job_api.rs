//! HTTP adapter for the job service endpoints

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::application::ports::{JobApi, JobApiError, RemoteResult};
use crate::domain::cache::AssetRef;

// Response types

#[derive(Debug, Deserialize)]
struct ResultResponse {
    structured_content: Value,
    #[serde(default)]
    images: Vec<String>,
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    message: Option<String>,
}

/// reqwest client for `/results`, `/cleanup` and `/cleanup_all`
pub struct HttpJobApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpJobApi {
    /// Create a client for the service at `base_url`
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, JobApiError> {
        if base_url.cannot_be_a_base() {
            return Err(JobApiError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JobApiError::Request(e.to_string()))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Endpoint URL under the base path. Segments are percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        // cannot_be_a_base was rejected at construction
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post(&self, segments: &[&str]) -> Result<(), JobApiError> {
        let response = self
            .client
            .post(self.url(segments))
            .send()
            .await
            .map_err(|e| JobApiError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        Ok(())
    }

    async fn status_error(response: reqwest::Response) -> JobApiError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .ok()
            .and_then(|body| body.error.or(body.message))
            .unwrap_or(text);
        JobApiError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn fetch_result(&self, job_id: &str) -> Result<RemoteResult, JobApiError> {
        let response = self
            .client
            .get(self.url(&["results", job_id]))
            .send()
            .await
            .map_err(|e| JobApiError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(JobApiError::NotFound);
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let body: ResultResponse = response
            .json()
            .await
            .map_err(|e| JobApiError::Parse(e.to_string()))?;

        Ok(RemoteResult {
            job_id: body.request_id.unwrap_or_else(|| job_id.to_string()),
            content: body.structured_content,
            asset_refs: body.images.into_iter().map(AssetRef::from).collect(),
        })
    }

    async fn cleanup(&self, job_id: &str) -> Result<(), JobApiError> {
        self.post(&["cleanup", job_id]).await
    }

    async fn cleanup_all(&self) -> Result<(), JobApiError> {
        self.post(&["cleanup_all"]).await
    }
}
