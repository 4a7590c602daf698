//! Scheduler type definitions.
//!
//! This module contains error types, state enums, and command types for the scheduler.

use thiserror::Error;
use tokio::sync::oneshot;

use super::job::{JobSnapshot, JobSpec};
use crate::core::schedule::ScheduleError;
use crate::core::types::JobId;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The recurring trigger could not be resolved.
    #[error("invalid schedule for job {job_id}: {source}")]
    InvalidSchedule {
        job_id: String,
        #[source]
        source: ScheduleError,
    },

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// State of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler is stopped.
    Stopped,
    /// Scheduler is running.
    Running,
    /// Scheduler is paused.
    Paused,
}

/// Commands that can be sent to the scheduler.
pub(crate) enum SchedulerCommand {
    /// Register a job, replacing any job with the same id.
    Register {
        spec: JobSpec,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Remove a job.
    Cancel {
        job_id: JobId,
        response: oneshot::Sender<Result<bool, SchedulerError>>,
    },
    /// Copy of the live job table.
    Snapshot {
        response: oneshot::Sender<Result<Vec<JobSnapshot>, SchedulerError>>,
    },
    /// Pause the scheduler.
    Pause { response: oneshot::Sender<()> },
    /// Resume the scheduler.
    Resume { response: oneshot::Sender<()> },
    /// Shutdown the scheduler.
    Shutdown { response: oneshot::Sender<()> },
}
