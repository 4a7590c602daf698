//! Scheduler handle for controlling the scheduler.
//!
//! This module provides the `SchedulerHandle` type that allows external control
//! of the scheduler through commands like register, cancel, pause, resume and
//! shutdown, and the `JobScheduler` trait components register jobs through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};

use super::job::{JobPayload, JobSnapshot, JobSpec, TriggerSpec};
use super::types::{SchedulerCommand, SchedulerError, SchedulerState};
use crate::core::local_time::LocalTime;
use crate::core::types::JobId;

/// Buffer size for the command channel between SchedulerHandle and Scheduler.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Registration surface of the scheduler service.
///
/// Every operation is keyed by a deterministic [`JobId`]; registering an id
/// that already exists replaces the previous job.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Register a one-shot job. Replace-if-exists.
    async fn schedule_once(
        &self,
        job_id: JobId,
        fire_at: DateTime<Utc>,
        payload: JobPayload,
    ) -> Result<(), SchedulerError>;

    /// Register a daily job evaluated in `timezone`, re-resolved at each occurrence.
    async fn schedule_recurring(
        &self,
        job_id: JobId,
        time: LocalTime,
        timezone: Tz,
        payload: JobPayload,
    ) -> Result<(), SchedulerError>;

    /// Remove a job. Returns whether it existed.
    async fn cancel(&self, job_id: &JobId) -> Result<bool, SchedulerError>;

    /// Register a prepared spec.
    async fn register(&self, spec: JobSpec) -> Result<(), SchedulerError> {
        let JobSpec {
            id,
            trigger,
            payload,
        } = spec;
        match trigger {
            TriggerSpec::At(at) => self.schedule_once(id, at, payload).await,
            TriggerSpec::Daily { time, timezone } => {
                self.schedule_recurring(id, time, timezone, payload).await
            }
        }
    }
}

/// Handle for controlling the scheduler.
///
/// Handles can be cloned freely. Commands are served once the scheduler has
/// been started.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) command_tx: mpsc::Sender<SchedulerCommand>,
    pub(crate) state: Arc<RwLock<SchedulerState>>,
}

impl SchedulerHandle {
    /// Helper to send a command that returns a result and wait for response.
    async fn send_result_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<Result<T, SchedulerError>>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                SchedulerError::ChannelError(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::ChannelError(format!("failed to receive {} response", operation))
        })?
    }

    /// Helper to send a command that returns unit and wait for response.
    async fn send_unit_command(
        &self,
        build_command: impl FnOnce(oneshot::Sender<()>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<(), SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                SchedulerError::ChannelError(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::ChannelError(format!("failed to receive {} response", operation))
        })?;

        Ok(())
    }

    /// Copy of the live job table, ordered by job id.
    pub async fn jobs(&self) -> Result<Vec<JobSnapshot>, SchedulerError> {
        self.send_result_command(|response| SchedulerCommand::Snapshot { response }, "snapshot")
            .await
    }

    /// Look up a single live job.
    pub async fn job(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, SchedulerError> {
        Ok(self
            .jobs()
            .await?
            .into_iter()
            .find(|job| &job.spec.id == job_id))
    }

    /// Pause the scheduler.
    ///
    /// While paused, jobs can still be registered and cancelled but nothing fires.
    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.send_unit_command(|response| SchedulerCommand::Pause { response }, "pause")
            .await
    }

    /// Resume the scheduler after being paused.
    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.send_unit_command(|response| SchedulerCommand::Resume { response }, "resume")
            .await
    }

    /// Shutdown the scheduler.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.send_unit_command(
            |response| SchedulerCommand::Shutdown { response },
            "shutdown",
        )
        .await
    }

    /// Get the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Check if the scheduler is running.
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == SchedulerState::Running
    }

    /// Check if the scheduler is paused.
    pub async fn is_paused(&self) -> bool {
        *self.state.read().await == SchedulerState::Paused
    }
}

#[async_trait]
impl JobScheduler for SchedulerHandle {
    async fn schedule_once(
        &self,
        job_id: JobId,
        fire_at: DateTime<Utc>,
        payload: JobPayload,
    ) -> Result<(), SchedulerError> {
        let spec = JobSpec::once(job_id, fire_at, payload);
        self.send_result_command(
            |response| SchedulerCommand::Register { spec, response },
            "register",
        )
        .await
    }

    async fn schedule_recurring(
        &self,
        job_id: JobId,
        time: LocalTime,
        timezone: Tz,
        payload: JobPayload,
    ) -> Result<(), SchedulerError> {
        let spec = JobSpec::daily(job_id, time, timezone, payload);
        self.send_result_command(
            |response| SchedulerCommand::Register { spec, response },
            "register",
        )
        .await
    }

    async fn cancel(&self, job_id: &JobId) -> Result<bool, SchedulerError> {
        let job_id = job_id.clone();
        self.send_result_command(
            |response| SchedulerCommand::Cancel { job_id, response },
            "cancel",
        )
        .await
    }
}
