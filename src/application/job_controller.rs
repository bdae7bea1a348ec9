//! Job controller use case
//!
//! Owns the current [`Job`], drives submission through the progress
//! channel, writes completed results to the local slot and keeps the
//! expiration timer in step with it.
//!
//! All mutations happen on the caller's task: channel events and timer
//! firings are pulled one at a time by [`JobController::next_update`],
//! so they never interleave with each other or with `submit`/`clear`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::cache::{AssetRef, CacheEntry, DEFAULT_TTL, MAX_ASSET_REFS};
use crate::domain::job::{ChannelEvent, InvalidStateTransition, Job, JobInput, JobResult, JobState};

use super::cleanup::CleanupCoordinator;
use super::ports::{
    ChannelError, Clock, JobApi, JobApiError, KeyValueStore, ProgressChannel, Subscription,
};
use super::result_cache::{ResultCache, SaveOutcome};
use super::scheduler::{Arming, ExpirationScheduler, Expiry};

/// Failure recorded when the push channel drops mid-job
pub const CONNECTION_LOST: &str = "Connection to the listing service was lost";

/// Errors from the job controller
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    InvalidState(#[from] InvalidStateTransition),

    #[error("Transport error: {0}")]
    Transport(#[from] ChannelError),
}

/// Tunables for the job controller
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Budget applied when a result carries no expiry
    pub default_ttl: Duration,
    /// Maximum asset references kept in the local slot
    pub max_assets: usize,
    /// Ask the service to drop every expired result when nothing is cached
    pub reset_on_start: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            max_assets: MAX_ASSET_REFS,
            reset_on_start: false,
        }
    }
}

/// Observable change produced by one step of the controller
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Progress { step: String, percent: u8 },
    Auxiliary { text: String },
    Completed(CacheEntry),
    Failed { message: String },
    /// The cached result expired and was cleaned up
    Expired { job_id: String },
    /// Transport state changed; job state is untouched
    Connectivity { connected: bool },
    /// An event arrived in a state that cannot accept it
    Ignored { event: &'static str, state: JobState },
}

/// How the controller reconciled the persisted slot at startup
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// Nothing was cached
    Fresh,
    /// The cached result had expired and was cleaned up
    Expired { job_id: String },
    /// The cached result is live again
    Rehydrated(CacheEntry),
    /// The service no longer knows the result; it was cleaned up
    Invalid { job_id: String },
    /// The service could not be reached. The timer is armed, the job stays idle.
    Unavailable { job_id: String, reason: String },
}

enum Step {
    Expiry(Option<Expiry>),
    Event(Option<ChannelEvent>),
}

/// Central state machine for the single active job
pub struct JobController<C, A, S, K>
where
    C: ProgressChannel,
    A: JobApi,
    S: KeyValueStore,
    K: Clock,
{
    channel: Arc<C>,
    api: Arc<A>,
    cache: ResultCache<S>,
    cleanup: CleanupCoordinator<A, S>,
    scheduler: ExpirationScheduler<K>,
    expiries: mpsc::UnboundedReceiver<Expiry>,
    clock: Arc<K>,
    subscription: Option<Subscription>,
    job: Job,
    cached: Option<CacheEntry>,
    settings: JobSettings,
}

impl<C, A, S, K> JobController<C, A, S, K>
where
    C: ProgressChannel,
    A: JobApi,
    S: KeyValueStore,
    K: Clock,
{
    /// Create a controller in idle state. Call [`mount`](Self::mount) or
    /// [`submit`](Self::submit) to start receiving events.
    pub fn new(
        channel: Arc<C>,
        api: Arc<A>,
        store: Arc<S>,
        clock: Arc<K>,
        settings: JobSettings,
    ) -> Self {
        let cache = ResultCache::new(store, settings.max_assets);
        let cleanup = CleanupCoordinator::new(Arc::clone(&api), cache.clone());
        let (scheduler, expiries) = ExpirationScheduler::new(Arc::clone(&clock));
        Self {
            channel,
            api,
            cache,
            cleanup,
            scheduler,
            expiries,
            clock,
            subscription: None,
            job: Job::new(),
            cached: None,
            settings,
        }
    }

    /// Current job state, for rendering
    pub fn snapshot(&self) -> &Job {
        &self.job
    }

    /// Cached result, present while it is live
    pub fn cached_entry(&self) -> Option<&CacheEntry> {
        self.cached.as_ref()
    }

    /// Attach the single listener to the channel. No-op when already attached.
    pub fn mount(&mut self) {
        if self.subscription.as_ref().is_some_and(Subscription::is_active) {
            return;
        }
        self.subscription = Some(self.channel.listen());
        tracing::debug!("Attached channel listener");
    }

    /// Detach the listener and cancel the timer. The persisted slot is kept
    /// and reconciled by the next [`restore`](Self::restore).
    pub fn unmount(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
            tracing::debug!("Detached channel listener");
        }
        self.scheduler.cancel();
    }

    /// Unmount and close the channel
    pub async fn shutdown(&mut self) {
        self.unmount();
        self.channel.dispose().await;
    }

    /// Start a new job, superseding any previous one
    pub async fn submit(&mut self, input: &JobInput) -> Result<(), ControllerError> {
        self.job.begin_submission()?;
        self.scheduler.cancel();
        self.cached = None;
        self.mount();

        tracing::info!(url = %input, shortcode = %input.shortcode(), "Submitting job");
        if let Err(e) = self.channel.start_job(input).await {
            tracing::warn!(error = %e, "Failed to start job");
            let _ = self.job.fail(e.to_string());
            return Err(e.into());
        }
        Ok(())
    }

    /// Discard the current result and release its resources. Idempotent.
    pub async fn clear(&mut self) {
        self.scheduler.cancel();

        let job_id = match (&self.cached, self.job.id()) {
            (Some(entry), _) => Some(entry.job_id.clone()),
            (None, Some(id)) => Some(id.to_string()),
            (None, None) => self.persisted_id(),
        };
        if let Some(job_id) = job_id {
            self.cleanup.cleanup(&job_id).await;
        }

        self.cached = None;
        self.job.clear();
    }

    /// Release every expired result on the service and drop the local slot
    pub async fn reset(&mut self) {
        self.scheduler.cancel();
        self.cleanup.reset().await;
        self.cached = None;
        self.job.clear();
    }

    /// Reconcile the persisted slot after a restart
    pub async fn restore(&mut self) -> Result<RestoreOutcome, ControllerError> {
        if !matches!(self.job.state(), JobState::Idle | JobState::Cleared) {
            return Err(InvalidStateTransition {
                current_state: self.job.state(),
                action: "restore a cached result".to_string(),
            }
            .into());
        }

        let marker = self.cache.load_marker().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read cache marker");
            None
        });
        let Some(marker) = marker else {
            if self.settings.reset_on_start {
                self.cleanup.cleanup_all().await;
            }
            return Ok(RestoreOutcome::Fresh);
        };

        let job_id = marker.job_id.clone();
        if marker.is_expired(self.clock.now()) {
            tracing::info!(job_id = %job_id, expires_at = %marker.expires_at, "Cached result already expired");
            self.expire(&job_id).await;
            return Ok(RestoreOutcome::Expired { job_id });
        }

        let local = self.cache.load_entry().unwrap_or_else(|e| {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to read cached result");
            None
        });
        let entry = match local {
            Some(entry) => entry,
            None => match self.api.fetch_result(&job_id).await {
                Ok(remote) => {
                    let entry = CacheEntry {
                        job_id: job_id.clone(),
                        content: remote.content,
                        asset_refs: remote.asset_refs,
                        created_at: self.clock.now(),
                        expires_at: marker.expires_at,
                    };
                    self.persist(&entry);
                    entry
                }
                Err(JobApiError::NotFound) => {
                    tracing::info!(job_id = %job_id, "Service no longer has the cached result");
                    self.expire(&job_id).await;
                    return Ok(RestoreOutcome::Invalid { job_id });
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Could not fetch cached result");
                    if self.scheduler.arm(&job_id, marker.expires_at) == Arming::Due {
                        self.expire(&job_id).await;
                        return Ok(RestoreOutcome::Expired { job_id });
                    }
                    return Ok(RestoreOutcome::Unavailable {
                        job_id,
                        reason: e.to_string(),
                    });
                }
            },
        };

        if self.scheduler.arm(&entry.job_id, entry.expires_at) == Arming::Due {
            self.expire(&job_id).await;
            return Ok(RestoreOutcome::Expired { job_id });
        }
        self.job.restore_completed(&entry.job_id)?;
        self.cached = Some(entry.clone());
        tracing::info!(job_id = %job_id, expires_at = %entry.expires_at, "Rehydrated cached result");
        Ok(RestoreOutcome::Rehydrated(entry))
    }

    /// Wait for the next channel event or timer firing and apply it.
    ///
    /// Returns `None` once nothing further can happen: no listener is
    /// attached and no timer is armed.
    pub async fn next_update(&mut self) -> Option<JobUpdate> {
        loop {
            let listening = self.subscription.as_ref().is_some_and(Subscription::is_active);
            if !listening && !self.scheduler.is_armed() {
                return None;
            }

            let step = tokio::select! {
                expiry = self.expiries.recv() => Step::Expiry(expiry),
                event = next_event(self.subscription.as_mut()) => Step::Event(event),
            };

            match step {
                Step::Expiry(Some(expiry)) => {
                    if self.scheduler.take_if_current(&expiry) {
                        tracing::info!(job_id = %expiry.job_id, "Cached result expired");
                        self.expire(&expiry.job_id).await;
                        return Some(JobUpdate::Expired {
                            job_id: expiry.job_id,
                        });
                    }
                }
                // The scheduler owns a sender, so this only happens while it is dropped
                Step::Expiry(None) => return None,
                Step::Event(Some(event)) => return Some(self.apply(event).await),
                Step::Event(None) => {
                    tracing::debug!("Channel listener closed");
                    self.subscription = None;
                }
            }
        }
    }

    async fn apply(&mut self, event: ChannelEvent) -> JobUpdate {
        let kind = event.kind();
        tracing::trace!(event = kind, state = %self.job.state(), "Applying channel event");

        match event {
            ChannelEvent::Connected => {
                tracing::info!("Progress channel connected");
                JobUpdate::Connectivity { connected: true }
            }
            ChannelEvent::Disconnected => {
                // The service delivers to the session that started the job
                if self.job.state().is_in_flight() && self.job.fail(CONNECTION_LOST).is_ok() {
                    tracing::warn!("Progress channel dropped while a job was running");
                    return JobUpdate::Failed {
                        message: CONNECTION_LOST.to_string(),
                    };
                }
                tracing::warn!("Progress channel disconnected, waiting for reconnect");
                JobUpdate::Connectivity { connected: false }
            }
            ChannelEvent::Progress { step, percent } => {
                match self.job.record_progress(step.as_str(), percent) {
                    Ok(()) => JobUpdate::Progress {
                        step,
                        percent: self.job.progress_percent(),
                    },
                    Err(e) => self.ignored(kind, e),
                }
            }
            ChannelEvent::Auxiliary { text } => match self.job.record_auxiliary(text.as_str()) {
                Ok(()) => JobUpdate::Auxiliary { text },
                Err(e) => self.ignored(kind, e),
            },
            ChannelEvent::Result(result) => self.on_result(result).await,
            ChannelEvent::Error { message } => match self.job.fail(message.as_str()) {
                Ok(()) => {
                    tracing::warn!(error = %message, "Service reported failure");
                    JobUpdate::Failed { message }
                }
                Err(e) => self.ignored(kind, e),
            },
        }
    }

    async fn on_result(&mut self, result: JobResult) -> JobUpdate {
        if let Err(e) = self.job.complete(result.request_id.as_str()) {
            return self.ignored("result", e);
        }

        let ttl = result
            .expires_in_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.settings.default_ttl);
        let entry = CacheEntry::new(
            result.request_id,
            result.content,
            result.assets.into_iter().map(AssetRef::from).collect(),
            self.clock.now(),
            ttl,
        );
        tracing::info!(
            job_id = %entry.job_id,
            assets = entry.asset_refs.len(),
            ttl = %humantime::format_duration(ttl),
            "Job completed",
        );

        self.persist(&entry);
        self.cached = Some(entry.clone());

        if self.scheduler.arm(&entry.job_id, entry.expires_at) == Arming::Due {
            self.expire(&entry.job_id).await;
            return JobUpdate::Expired {
                job_id: entry.job_id,
            };
        }
        JobUpdate::Completed(entry)
    }

    /// Clean up `job_id` and drop the in-memory result
    async fn expire(&mut self, job_id: &str) {
        self.scheduler.cancel();
        self.cleanup.cleanup(job_id).await;
        self.cached = None;
        if !self.job.state().is_in_flight() {
            self.job.clear();
        }
    }

    fn persist(&self, entry: &CacheEntry) {
        match self.cache.save(entry) {
            Ok(SaveOutcome::Complete) => {}
            Ok(SaveOutcome::AssetsOmitted) => {
                tracing::info!(job_id = %entry.job_id, "Cached result stored without assets");
            }
            Err(e) => {
                tracing::error!(job_id = %entry.job_id, error = %e, "Failed to cache result");
            }
        }
    }

    fn persisted_id(&self) -> Option<String> {
        match self.cache.load_marker() {
            Ok(marker) => marker.map(|m| m.job_id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cache marker");
                None
            }
        }
    }

    fn ignored(&self, event: &'static str, reason: InvalidStateTransition) -> JobUpdate {
        tracing::debug!(event, reason = %reason, "Ignoring event");
        JobUpdate::Ignored {
            event,
            state: self.job.state(),
        }
    }
}

async fn next_event(subscription: Option<&mut Subscription>) -> Option<ChannelEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
