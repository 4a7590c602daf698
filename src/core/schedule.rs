//! Recurring wall-clock schedules and next occurrence calculation.
//!
//! A schedule is a cron expression evaluated in an IANA timezone. Each
//! occurrence is resolved against the zone's rules at that date, so daylight
//! saving transitions shift the UTC instant instead of the local time.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use thiserror::Error;

use super::local_time::LocalTime;

/// Errors that can occur when parsing or using schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// No more occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

/// A recurring schedule evaluated in a specific timezone.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// The original expression string.
    expression: String,
    /// Zone the expression is evaluated in.
    timezone: Tz,
    cron: Box<CronSchedule>,
}

impl Schedule {
    /// Every day at `time` in `timezone`.
    pub fn daily(time: LocalTime, timezone: Tz) -> Result<Self, ScheduleError> {
        Self::with_timezone(time.to_cron(), timezone)
    }

    /// Create a schedule from a cron expression in a specific timezone.
    ///
    /// Supports standard 5-field cron (`minute hour day month weekday`) and
    /// extended 6-field cron with a leading seconds field.
    pub fn with_timezone(expression: impl Into<String>, timezone: Tz) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let cron = Self::parse_cron(expression.trim())?;

        Ok(Self {
            expression,
            timezone,
            cron: Box::new(cron),
        })
    }

    /// Parse a cron expression.
    fn parse_cron(expression: &str) -> Result<CronSchedule, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();

        let cron_expr = match fields.len() {
            5 => format!("0 {}", expression),
            6 => expression.to_string(),
            _ => {
                return Err(ScheduleError::InvalidCron(format!(
                    "expected 5 or 6 fields, got {}",
                    fields.len()
                )));
            }
        };

        CronSchedule::from_str(&cron_expr).map_err(|e| ScheduleError::InvalidCron(e.to_string()))
    }

    /// Get the next occurrence strictly after the given instant.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let local_time = after.with_timezone(&self.timezone);
        self.cron
            .after(&local_time)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(ScheduleError::NoMoreOccurrences)
    }

    /// Get the next N occurrences after the given instant.
    pub fn next_n_after(&self, after: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
        let local_time = after.with_timezone(&self.timezone);
        self.cron
            .after(&local_time)
            .take(n)
            .map(|dt| dt.with_timezone(&Utc))
            .collect()
    }

    /// Get the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}
