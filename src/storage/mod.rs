//! Storage abstraction for users, sessions, check-ins, reports and todos.
//!
//! This module provides a trait-based storage abstraction with
//! pluggable backends (in-memory, SQLite). Operations that must not race
//! (capturing a dump, accepting a session, carry-over) are single trait
//! methods so each backend can run them as one read-modify-commit.

mod memory;
#[cfg(any(feature = "sqlite", test))]
mod sqlite;

pub use memory::InMemoryStorage;
#[cfg(any(feature = "sqlite", test))]
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::core::models::{
    Checkin, CheckinKind, CheckinStatus, DailySession, DumpCapture, DumpOutcome, EveningReport,
    EveningStatus, NewTodo, NewUser, TodoItem, TodoStatus, User,
};
use crate::core::types::{SessionId, TodoId, UserId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duplicate key was detected.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The row is not in a state that allows the operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

/// Storage backend trait.
#[async_trait]
pub trait Storage: Send + Sync {
    // User operations

    /// Create a user on first contact.
    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, StorageError>;

    /// Get a user by id.
    async fn get_user(&self, id: UserId) -> Result<User, StorageError>;

    /// Find a user by messaging-channel identifier.
    async fn find_user_by_external(&self, external_id: i64) -> Result<Option<User>, StorageError>;

    /// Persist settings and onboarding changes.
    async fn update_user(&self, user: User) -> Result<(), StorageError>;

    /// List all users ordered by id.
    async fn list_users(&self) -> Result<Vec<User>, StorageError>;

    // Session operations

    /// Store captured input for (user, date).
    ///
    /// Creates the row if missing, overwrites it if present but not yet
    /// accepted, and leaves an accepted row untouched.
    async fn save_dump(
        &self,
        user_id: UserId,
        date: NaiveDate,
        capture: DumpCapture,
        now: DateTime<Utc>,
    ) -> Result<DumpOutcome, StorageError>;

    /// Get a session by id.
    async fn get_session(&self, id: SessionId) -> Result<DailySession, StorageError>;

    /// Find the session for (user, date).
    async fn find_session(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<DailySession>, StorageError>;

    /// Update focus fields of a session. An existing `accepted_at` is never overwritten.
    async fn update_session(&self, session: DailySession) -> Result<(), StorageError>;

    /// Record energy and set the acceptance anchor if not already set.
    async fn accept_session(
        &self,
        id: SessionId,
        energy: u8,
        at: DateTime<Utc>,
    ) -> Result<DailySession, StorageError>;

    /// Delete a session with its check-ins and report. Attached todos are detached.
    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError>;

    /// Sessions of a user accepted within `[start, end)`, ordered by acceptance.
    async fn list_sessions_accepted_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailySession>, StorageError>;

    // Check-in and report operations

    /// Insert or update the check-in for (session, kind).
    async fn upsert_checkin(
        &self,
        session_id: SessionId,
        kind: CheckinKind,
        status: CheckinStatus,
        now: DateTime<Utc>,
    ) -> Result<Checkin, StorageError>;

    async fn find_checkin(
        &self,
        session_id: SessionId,
        kind: CheckinKind,
    ) -> Result<Option<Checkin>, StorageError>;

    /// Insert or update the evening report of a session.
    async fn upsert_evening_report(
        &self,
        session_id: SessionId,
        status: EveningStatus,
        text: String,
        now: DateTime<Utc>,
    ) -> Result<EveningReport, StorageError>;

    async fn find_evening_report(
        &self,
        session_id: SessionId,
    ) -> Result<Option<EveningReport>, StorageError>;

    // Todo operations

    /// Insert new todo items, returning them with assigned ids.
    async fn create_todos(
        &self,
        items: Vec<NewTodo>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TodoItem>, StorageError>;

    /// Get a todo item by id.
    async fn get_todo(&self, id: TodoId) -> Result<TodoItem, StorageError>;

    /// List todo items attached to a session, optionally filtered by status.
    async fn list_session_todos(
        &self,
        session_id: SessionId,
        status: Option<TodoStatus>,
    ) -> Result<Vec<TodoItem>, StorageError>;

    /// Mark a pending item done. Completing a done item is a no-op.
    async fn complete_todo(&self, id: TodoId) -> Result<TodoItem, StorageError>;

    /// Attach the user's pending, unattached items dated on or before `today`
    /// to `session_id` and move them to `today`.
    async fn attach_carry_overs(
        &self,
        user_id: UserId,
        session_id: SessionId,
        today: NaiveDate,
    ) -> Result<Vec<TodoItem>, StorageError>;

    /// Mark a pending item carried over and create its successor dated `date`.
    async fn carry_todo(
        &self,
        id: TodoId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<TodoItem, StorageError>;
}
