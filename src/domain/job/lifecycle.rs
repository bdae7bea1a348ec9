//! Job entity and its lifecycle state machine

use std::fmt;
use thiserror::Error;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobState {
    #[default]
    Idle,
    Submitting,
    Running,
    Completed,
    Failed,
    Cleared,
}

impl JobState {
    /// Get the string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cleared => "cleared",
        }
    }

    /// Terminal states accept a new submission
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cleared)
    }

    /// A job is in flight while the service is working on it
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when an invalid state transition is attempted
#[derive(Debug, Clone, Error)]
#[error("Invalid state transition: cannot {action} while in {current_state} state")]
pub struct InvalidStateTransition {
    pub current_state: JobState,
    pub action: String,
}

/// One submitted transformation request and its evolving status.
///
/// State machine:
///   IDLE | COMPLETED | FAILED | CLEARED -> SUBMITTING (begin_submission)
///   SUBMITTING | RUNNING -> RUNNING (record_progress)
///   SUBMITTING | RUNNING -> COMPLETED (complete)
///   IDLE | SUBMITTING | RUNNING -> FAILED (fail)
///   IDLE | CLEARED -> COMPLETED (restore_completed)
///   any -> CLEARED (clear)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Job {
    id: Option<String>,
    state: JobState,
    progress_percent: u8,
    step_label: String,
    auxiliary_text: Option<String>,
    failure: Option<String>,
}

impl Job {
    /// Create a new job in idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Service-assigned id, known once the service has answered
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn step_label(&self) -> &str {
        &self.step_label
    }

    pub fn auxiliary_text(&self) -> Option<&str> {
        self.auxiliary_text.as_deref()
    }

    /// Message reported by the service when the job failed
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Start a new submission, discarding everything about the previous job
    pub fn begin_submission(&mut self) -> Result<(), InvalidStateTransition> {
        if !(self.state == JobState::Idle || self.state.is_terminal()) {
            return Err(self.rejected("submit a job"));
        }
        *self = Self {
            state: JobState::Submitting,
            ..Self::default()
        };
        Ok(())
    }

    /// Apply a progress report. Percent values are taken as reported,
    /// including values lower than the previous one.
    pub fn record_progress(
        &mut self,
        step: impl Into<String>,
        percent: u8,
    ) -> Result<(), InvalidStateTransition> {
        if !self.state.is_in_flight() {
            return Err(self.rejected("record progress"));
        }
        self.state = JobState::Running;
        self.step_label = step.into();
        self.progress_percent = percent.min(100);
        Ok(())
    }

    /// Replace the auxiliary text without changing state
    pub fn record_auxiliary(&mut self, text: impl Into<String>) -> Result<(), InvalidStateTransition> {
        if !self.state.is_in_flight() {
            return Err(self.rejected("update auxiliary text"));
        }
        self.auxiliary_text = Some(text.into());
        Ok(())
    }

    /// Mark the job completed under the id the service assigned
    pub fn complete(&mut self, id: impl Into<String>) -> Result<(), InvalidStateTransition> {
        if !self.state.is_in_flight() {
            return Err(self.rejected("complete the job"));
        }
        self.id = Some(id.into());
        self.state = JobState::Completed;
        self.progress_percent = 100;
        Ok(())
    }

    /// Mark the job failed with the service-provided message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), InvalidStateTransition> {
        if self.state.is_terminal() {
            return Err(self.rejected("fail the job"));
        }
        self.state = JobState::Failed;
        self.failure = Some(message.into());
        Ok(())
    }

    /// Rehydrate a completed job found in the local store after a restart
    pub fn restore_completed(&mut self, id: impl Into<String>) -> Result<(), InvalidStateTransition> {
        if !matches!(self.state, JobState::Idle | JobState::Cleared) {
            return Err(self.rejected("restore a completed job"));
        }
        *self = Self {
            id: Some(id.into()),
            state: JobState::Completed,
            progress_percent: 100,
            ..Self::default()
        };
        Ok(())
    }

    /// Empty every field and move to CLEARED. Valid from any state.
    pub fn clear(&mut self) {
        *self = Self {
            state: JobState::Cleared,
            ..Self::default()
        };
    }

    fn rejected(&self, action: &str) -> InvalidStateTransition {
        InvalidStateTransition {
            current_state: self.state,
            action: action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_job() -> Job {
        let mut job = Job::new();
        job.begin_submission().unwrap();
        job.record_progress("Downloading media and caption...", 20).unwrap();
        job
    }

    #[test]
    fn new_job_is_idle() {
        let job = Job::new();
        assert_eq!(job.state(), JobState::Idle);
        assert!(job.id().is_none());
        assert_eq!(job.progress_percent(), 0);
    }

    #[test]
    fn submit_from_idle() {
        let mut job = Job::new();
        job.begin_submission().unwrap();
        assert_eq!(job.state(), JobState::Submitting);
        assert!(job.id().is_none());
    }

    #[test]
    fn submit_while_running_fails() {
        let mut job = running_job();
        let err = job.begin_submission().unwrap_err();
        assert_eq!(err.current_state, JobState::Running);
        assert!(err.action.contains("submit"));
    }

    #[test]
    fn submit_while_submitting_fails() {
        let mut job = Job::new();
        job.begin_submission().unwrap();
        let err = job.begin_submission().unwrap_err();
        assert_eq!(err.current_state, JobState::Submitting);
    }

    #[test]
    fn resubmit_resets_previous_fields() {
        let mut job = running_job();
        job.record_auxiliary("caption").unwrap();
        job.complete("r1").unwrap();

        job.begin_submission().unwrap();
        assert_eq!(job.state(), JobState::Submitting);
        assert_eq!(job.progress_percent(), 0);
        assert_eq!(job.step_label(), "");
        assert!(job.auxiliary_text().is_none());
        assert!(job.id().is_none());
    }

    #[test]
    fn resubmit_after_failure_and_clear() {
        let mut job = running_job();
        job.fail("boom").unwrap();
        assert!(job.begin_submission().is_ok());

        job.clear();
        assert!(job.begin_submission().is_ok());
    }

    #[test]
    fn progress_moves_to_running() {
        let job = running_job();
        assert_eq!(job.state(), JobState::Running);
        assert_eq!(job.progress_percent(), 20);
        assert_eq!(job.step_label(), "Downloading media and caption...");
    }

    #[test]
    fn decreasing_progress_is_accepted() {
        let mut job = running_job();
        job.record_progress("Separating frames from video...", 60).unwrap();
        job.record_progress("Retrying download...", 40).unwrap();
        assert_eq!(job.progress_percent(), 40);
    }

    #[test]
    fn progress_from_idle_fails() {
        let mut job = Job::new();
        let err = job.record_progress("step", 10).unwrap_err();
        assert_eq!(err.current_state, JobState::Idle);
    }

    #[test]
    fn auxiliary_does_not_change_state() {
        let mut job = running_job();
        job.record_auxiliary("Vintage lamp, barely used").unwrap();
        assert_eq!(job.state(), JobState::Running);
        assert_eq!(job.auxiliary_text(), Some("Vintage lamp, barely used"));
    }

    #[test]
    fn complete_sets_id_and_full_progress() {
        let mut job = running_job();
        job.complete("abc").unwrap();
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.id(), Some("abc"));
        assert_eq!(job.progress_percent(), 100);
    }

    #[test]
    fn complete_straight_from_submitting() {
        let mut job = Job::new();
        job.begin_submission().unwrap();
        job.complete("cached").unwrap();
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn complete_after_clear_fails() {
        let mut job = running_job();
        job.clear();
        let err = job.complete("late").unwrap_err();
        assert_eq!(err.current_state, JobState::Cleared);
    }

    #[test]
    fn fail_from_running() {
        let mut job = running_job();
        job.fail("x").unwrap();
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.failure(), Some("x"));
    }

    #[test]
    fn fail_from_completed_is_rejected() {
        let mut job = running_job();
        job.complete("r1").unwrap();
        assert!(job.fail("late error").is_err());
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn restore_completed_from_idle() {
        let mut job = Job::new();
        job.restore_completed("r2").unwrap();
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.id(), Some("r2"));
        assert_eq!(job.progress_percent(), 100);
    }

    #[test]
    fn restore_while_running_fails() {
        let mut job = running_job();
        assert!(job.restore_completed("r2").is_err());
    }

    #[test]
    fn clear_is_idempotent() {
        let mut job = running_job();
        job.complete("r1").unwrap();
        job.clear();
        let first = job.clone();
        job.clear();
        assert_eq!(job, first);
        assert_eq!(job.state(), JobState::Cleared);
        assert!(job.id().is_none());
    }

    #[test]
    fn state_display() {
        assert_eq!(JobState::Idle.to_string(), "idle");
        assert_eq!(JobState::Running.to_string(), "running");
        assert_eq!(JobState::Cleared.to_string(), "cleared");
    }

    #[test]
    fn error_display() {
        let err = InvalidStateTransition {
            current_state: JobState::Running,
            action: "submit a job".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("submit a job"));
        assert!(msg.contains("running"));
    }
}
