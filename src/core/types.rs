//! Core identifier types for the coaching loop.
//!
//! Row identifiers are storage-assigned integers. Job identifiers are
//! deterministic strings derived from the entity they belong to, so the live
//! job table and persisted rows share one key space.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::models::CheckinKind;

/// Identifier of a user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(i64);

/// Identifier of a daily session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(i64);

/// Identifier of a todo item row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TodoId(i64);

/// Deterministic identifier of a scheduled job.
///
/// Registering a job under an existing id replaces it, which is what makes
/// scheduling and rebuild idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

/// Identifier of a single job fire, for correlating dispatch logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FireId(Uuid);

macro_rules! row_id {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw row identifier.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the raw row identifier.
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<i64>().map(Self)
            }
        }
    };
}

row_id!(UserId);
row_id!(SessionId);
row_id!(TodoId);

impl JobId {
    /// Create a JobId from an arbitrary string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of a check-in job: `checkin:{session}:t3` or `checkin:{session}:t6`.
    pub fn checkin(session_id: SessionId, kind: CheckinKind) -> Self {
        Self(format!("checkin:{}:{}", session_id, kind.as_str()))
    }

    /// Id of one evening reminder: `evening:{session}:{attempt}`.
    pub fn evening(session_id: SessionId, attempt: u8) -> Self {
        Self(format!("evening:{}:{}", session_id, attempt))
    }

    /// Id of a user's recurring morning prompt: `morning:{user}`.
    pub fn morning(user_id: UserId) -> Self {
        Self(format!("morning:{}", user_id))
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FireId {
    /// Generate a new random FireId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FireId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
