//! Wall-clock time of day in a user's own timezone.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing a time of day.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalTimeError {
    /// The text is not in `HH:MM` form.
    #[error("expected HH:MM, got '{0}'")]
    Malformed(String),

    /// Hour or minute is out of range.
    #[error("time out of range: {0:02}:{1:02}")]
    OutOfRange(u32, u32),
}

/// A time of day (`HH:MM`) without date or zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalTime {
    hour: u32,
    minute: u32,
}

impl LocalTime {
    pub const MIDNIGHT: LocalTime = LocalTime { hour: 0, minute: 0 };

    /// Create a time of day, validating the ranges.
    pub fn new(hour: u32, minute: u32) -> Result<Self, LocalTimeError> {
        if hour > 23 || minute > 59 {
            return Err(LocalTimeError::OutOfRange(hour, minute));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Convert to a chrono `NaiveTime`.
    pub fn to_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Daily cron expression firing at this time.
    pub fn to_cron(&self) -> String {
        format!("{} {} * * *", self.minute, self.hour)
    }
}

impl FromStr for LocalTime {
    type Err = LocalTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (hour, minute) = trimmed
            .split_once(':')
            .ok_or_else(|| LocalTimeError::Malformed(s.to_string()))?;

        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(LocalTimeError::Malformed(s.to_string()));
        }

        let hour: u32 = hour
            .parse()
            .map_err(|_| LocalTimeError::Malformed(s.to_string()))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| LocalTimeError::Malformed(s.to_string()))?;

        Self::new(hour, minute)
    }
}

impl TryFrom<String> for LocalTime {
    type Error = LocalTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocalTime> for String {
    fn from(value: LocalTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}
