//! Scheduler service for timed prompts.
//!
//! This module provides the scheduling loop that fires one-shot and daily jobs
//! at their due instants and hands them to a dispatcher.

mod engine;
mod handle;
mod job;
mod types;

pub use engine::Scheduler;
pub use handle::{JobScheduler, SchedulerHandle};
pub use job::{
    DispatchError, FiredJob, JobDispatcher, JobPayload, JobSnapshot, JobSpec, TriggerSpec,
};
pub use types::{SchedulerError, SchedulerState};
