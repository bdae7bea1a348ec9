//! Lifecycle events delivered by the push channel

use serde_json::Value;

/// Payload of a completed job as reported by the service
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    /// Service-assigned id of the finished request
    pub request_id: String,
    /// Structured listing content
    pub content: Value,
    /// Generated asset references, in display order
    pub assets: Vec<String>,
    /// Time budget granted for the result, if the service sent one
    pub expires_in_seconds: Option<u64>,
}

/// Events a job controller consumes from the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Transport is (re)connected
    Connected,
    /// Transport dropped; the channel is reconnecting on its own
    Disconnected,
    /// Processing moved to a new step
    Progress { step: String, percent: u8 },
    /// Incremental text extracted before completion (the post caption)
    Auxiliary { text: String },
    /// The job finished
    Result(JobResult),
    /// The service reported a failure
    Error { message: String },
}

impl ChannelEvent {
    /// Short name used in logs
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Progress { .. } => "progress",
            Self::Auxiliary { .. } => "auxiliary",
            Self::Result(_) => "result",
            Self::Error { .. } => "error",
        }
    }

    /// Connectivity events never drive job state
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }
}
