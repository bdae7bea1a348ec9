//! Job domain module

mod event;
mod input;
mod lifecycle;

pub use event::{ChannelEvent, JobResult};
pub use input::JobInput;
pub use lifecycle::{InvalidStateTransition, Job, JobState};
