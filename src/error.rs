//! Error taxonomy of the orchestrator.

use std::fmt;
use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::core::types::{SessionId, TodoId, UserId};
use crate::scheduler::SchedulerError;
use crate::session::Notice;
use crate::storage::StorageError;

/// Which referenced row was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    User(UserId),
    Session(SessionId),
    Todo(TodoId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::User(id) => write!(f, "user {}", id),
            Missing::Session(id) => write!(f, "session {}", id),
            Missing::Todo(id) => write!(f, "todo {}", id),
        }
    }
}

/// Failures while running effects for a transition.
#[derive(Debug, Error)]
pub enum CoachError {
    /// Input was rejected; the notice tells the user why.
    #[error("validation failed: {0}")]
    Validation(Notice),

    /// A stale callback or a race referenced a row that no longer exists.
    #[error("not found: {0}")]
    NotFound(Missing),

    /// Analysis, transcription or delivery failed.
    #[error(transparent)]
    ExternalService(#[from] CollaboratorError),

    /// A job could not be registered or cancelled.
    #[error(transparent)]
    Scheduling(#[from] SchedulerError),

    /// Storage failed for a reason other than a missing row.
    #[error(transparent)]
    Storage(StorageError),
}

impl CoachError {
    /// Convert a storage error, naming the row a `NotFound` refers to.
    pub(crate) fn storage(err: StorageError, missing: Missing) -> Self {
        match err {
            StorageError::NotFound(_) => CoachError::NotFound(missing),
            other => CoachError::Storage(other),
        }
    }

    /// Notice shown to the user when this error ends a transition.
    pub fn notice(&self) -> Notice {
        match self {
            CoachError::Validation(notice) => notice.clone(),
            CoachError::NotFound(_) => Notice::NotFound,
            CoachError::ExternalService(CollaboratorError::Transcription(_)) => {
                Notice::TranscriptionFailed
            }
            CoachError::ExternalService(_) | CoachError::Scheduling(_) => {
                Notice::ServiceUnavailable
            }
            CoachError::Storage(_) => Notice::SomethingWentWrong,
        }
    }
}

impl From<StorageError> for CoachError {
    fn from(err: StorageError) -> Self {
        CoachError::Storage(err)
    }
}

/// Failures of the rebuild procedure as a whole.
///
/// Per-user problems are counted in the report instead.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Users could not be listed.
    #[error("failed to list users: {0}")]
    ListUsers(#[source] StorageError),
}
