//! Job definitions: what fires, when, and where it goes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::SchedulerError;
use crate::core::local_time::LocalTime;
use crate::core::models::CheckinKind;
use crate::core::schedule::Schedule;
use crate::core::types::{FireId, JobId, SessionId, UserId};

/// What a job does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPayload {
    /// Daily morning prompt for a user.
    MorningPrompt { user_id: UserId },
    /// A +3h/+6h progress check-in.
    Checkin {
        user_id: UserId,
        session_id: SessionId,
        kind: CheckinKind,
    },
    /// One step of the evening escalation chain.
    EveningReminder {
        user_id: UserId,
        session_id: SessionId,
        /// 1..=3, higher is more urgent.
        attempt: u8,
    },
}

impl JobPayload {
    /// The user the job belongs to.
    pub fn user_id(&self) -> UserId {
        match self {
            JobPayload::MorningPrompt { user_id }
            | JobPayload::Checkin { user_id, .. }
            | JobPayload::EveningReminder { user_id, .. } => *user_id,
        }
    }
}

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSpec {
    /// Once, at a fixed instant.
    At(DateTime<Utc>),
    /// Every day at a wall-clock time in the owning user's zone.
    Daily { time: LocalTime, timezone: Tz },
}

/// A job as requested by callers: id, trigger and payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub trigger: TriggerSpec,
    pub payload: JobPayload,
}

impl JobSpec {
    /// A one-shot job.
    pub fn once(id: JobId, fire_at: DateTime<Utc>, payload: JobPayload) -> Self {
        Self {
            id,
            trigger: TriggerSpec::At(fire_at),
            payload,
        }
    }

    /// A daily recurring job.
    pub fn daily(id: JobId, time: LocalTime, timezone: Tz, payload: JobPayload) -> Self {
        Self {
            id,
            trigger: TriggerSpec::Daily { time, timezone },
            payload,
        }
    }

    /// Fire instant of a one-shot job.
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        match self.trigger {
            TriggerSpec::At(at) => Some(at),
            TriggerSpec::Daily { .. } => None,
        }
    }
}

/// A job in the live table, with its next fire resolved.
#[derive(Debug, Clone)]
pub(crate) struct ScheduledJob {
    pub(crate) spec: JobSpec,
    schedule: Option<Schedule>,
    pub(crate) next_fire: DateTime<Utc>,
}

impl ScheduledJob {
    /// Resolve a spec against `now`.
    pub(crate) fn resolve(spec: JobSpec, now: DateTime<Utc>) -> Result<Self, SchedulerError> {
        match spec.trigger {
            TriggerSpec::At(at) => Ok(Self {
                spec,
                schedule: None,
                next_fire: at,
            }),
            TriggerSpec::Daily { time, timezone } => {
                let invalid = |source| SchedulerError::InvalidSchedule {
                    job_id: spec.id.to_string(),
                    source,
                };
                let schedule = Schedule::daily(time, timezone).map_err(invalid)?;
                let next_fire = schedule.next_after(now).map_err(invalid)?;
                Ok(Self {
                    spec,
                    schedule: Some(schedule),
                    next_fire,
                })
            }
        }
    }

    pub(crate) fn is_recurring(&self) -> bool {
        self.schedule.is_some()
    }

    /// Move a recurring job to its next occurrence after `now`.
    ///
    /// Missed occurrences collapse into one; the job never bursts.
    pub(crate) fn advance(&mut self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        if let Some(schedule) = &self.schedule {
            self.next_fire = schedule
                .next_after(now)
                .map_err(|source| SchedulerError::InvalidSchedule {
                    job_id: self.spec.id.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            spec: self.spec.clone(),
            next_fire: self.next_fire,
        }
    }
}

/// Read-only view of a live job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub spec: JobSpec,
    pub next_fire: DateTime<Utc>,
}

/// A job occurrence handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct FiredJob {
    pub fire_id: FireId,
    pub job_id: JobId,
    pub payload: JobPayload,
    pub scheduled_for: DateTime<Utc>,
}

/// Errors a dispatcher can report for a fire.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The message could not be delivered.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The fire could not be handled.
    #[error("dispatch failed: {0}")]
    Failed(String),
}

/// Receives fired jobs.
///
/// Delivery is at-least-once. A failed dispatch is logged and dropped; the
/// scheduler never retries it.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, fire: FiredJob) -> Result<(), DispatchError>;
}
