//! Cleanup coordinator
//!
//! Remote invalidation is best-effort; the local slot is always cleared.

use std::sync::Arc;

use super::ports::{JobApi, KeyValueStore};
use super::result_cache::ResultCache;

/// Reclaims remote and local resources for a cached result
pub struct CleanupCoordinator<A: JobApi, S: KeyValueStore> {
    api: Arc<A>,
    cache: ResultCache<S>,
}

impl<A: JobApi, S: KeyValueStore> CleanupCoordinator<A, S> {
    pub fn new(api: Arc<A>, cache: ResultCache<S>) -> Self {
        Self { api, cache }
    }

    /// Invalidate `job_id` on the service, then clear the local slot.
    ///
    /// Never fails: a remote error is logged and local clearing still happens.
    pub async fn cleanup(&self, job_id: &str) {
        match self.api.cleanup(job_id).await {
            Ok(()) => tracing::info!(job_id, "Remote resources released"),
            Err(e) => tracing::warn!(job_id, error = %e, "Remote cleanup failed"),
        }
        self.clear_local();
    }

    /// Ask the service to release every expired resource. Local state is untouched.
    pub async fn cleanup_all(&self) {
        match self.api.cleanup_all().await {
            Ok(()) => tracing::info!("Remote session reset"),
            Err(e) => tracing::warn!(error = %e, "Remote cleanup of all results failed"),
        }
    }

    /// `cleanup_all` followed by clearing the local slot
    pub async fn reset(&self) {
        self.cleanup_all().await;
        self.clear_local();
    }

    fn clear_local(&self) {
        if let Err(e) = self.cache.clear() {
            tracing::warn!(error = %e, "Failed to clear cached result");
        }
    }
}
