//! Todo carry-over resolution and todo entry parsing.
//!
//! Items a user did not finish stay pending with no session attached. When the
//! user accepts the next day's focus they are pulled into that session and
//! re-dated. "Carry to tomorrow" retires an item and links a fresh pending copy
//! to it, one hop per action.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::core::models::{DailySession, NewTodo, TodoItem, TodoStatus, User};
use crate::core::types::TodoId;
use crate::storage::{Storage, StorageError};

/// Characters stripped from the start of an entered line.
const BULLETS: [char; 3] = ['•', '-', '–'];

/// Split free-form todo entry into item texts.
///
/// Lines are separated by commas or newlines; leading bullets and blank lines
/// are dropped and at most `max` items are kept.
pub fn parse_todo_lines(text: &str, max: usize) -> Vec<String> {
    text.split([',', '\n'])
        .map(|line| line.trim().trim_start_matches(BULLETS).trim())
        .filter(|line| !line.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

/// Carried items first, then freshly entered ones, without repeats.
pub fn merge_for_display(carried: Vec<TodoItem>, fresh: Vec<TodoItem>) -> Vec<TodoItem> {
    let mut seen = HashSet::new();
    carried
        .into_iter()
        .chain(fresh)
        .filter(|item| seen.insert(item.id))
        .collect()
}

/// Applies carry-over rules against storage.
pub struct TodoResolver<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> TodoResolver<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Attach the user's unattached pending items to an accepted session.
    ///
    /// Items are moved to the session's date. Running this again for the same
    /// session finds nothing left to attach.
    pub async fn attach_to_session(
        &self,
        session: &DailySession,
    ) -> Result<Vec<TodoItem>, StorageError> {
        let attached = self
            .storage
            .attach_carry_overs(session.user_id, session.id, session.date_local)
            .await?;
        if !attached.is_empty() {
            tracing::debug!(
                user_id = %session.user_id,
                session_id = %session.id,
                count = attached.len(),
                "Attached carried-over todos"
            );
        }
        Ok(attached)
    }

    /// Store entered items on a session and return all of its pending items.
    pub async fn save_entered(
        &self,
        session: &DailySession,
        lines: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TodoItem>, StorageError> {
        let items = lines
            .into_iter()
            .map(|text| NewTodo {
                user_id: session.user_id,
                session_id: Some(session.id),
                date_local: session.date_local,
                text,
                carried_from: None,
            })
            .collect();
        self.storage.create_todos(items, now).await?;
        self.pending(session).await
    }

    /// Pending items of a session, in creation order.
    pub async fn pending(&self, session: &DailySession) -> Result<Vec<TodoItem>, StorageError> {
        self.storage
            .list_session_todos(session.id, Some(TodoStatus::Pending))
            .await
    }

    /// Mark one of the user's items done.
    pub async fn complete(&self, user: &User, id: TodoId) -> Result<TodoItem, StorageError> {
        self.owned(user, id).await?;
        self.storage.complete_todo(id).await
    }

    /// Carry one of the user's pending items to their local tomorrow.
    ///
    /// Returns the new item. The source must still be pending, so carrying the
    /// same item twice fails instead of creating a second successor.
    pub async fn carry_to_tomorrow(
        &self,
        user: &User,
        id: TodoId,
        now: DateTime<Utc>,
    ) -> Result<TodoItem, StorageError> {
        let tomorrow = user
            .local_today(now)
            .succ_opt()
            .ok_or_else(|| StorageError::Other("date out of range".into()))?;
        self.carry_to(user, id, tomorrow, now).await
    }

    /// Carry one of the user's pending items to `date`.
    pub async fn carry_to(
        &self,
        user: &User,
        id: TodoId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<TodoItem, StorageError> {
        self.owned(user, id).await?;
        let successor = self.storage.carry_todo(id, date, now).await?;
        tracing::debug!(user_id = %user.id, from = %id, to = %successor.id, "Todo carried");
        Ok(successor)
    }

    /// Get one of the user's items.
    pub async fn get(&self, user: &User, id: TodoId) -> Result<TodoItem, StorageError> {
        self.owned(user, id).await
    }

    async fn owned(&self, user: &User, id: TodoId) -> Result<TodoItem, StorageError> {
        let item = self.storage.get_todo(id).await?;
        if item.user_id != user.id {
            return Err(StorageError::NotFound(format!("todo: {}", id)));
        }
        Ok(item)
    }
}
