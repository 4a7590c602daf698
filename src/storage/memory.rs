//! In-memory storage implementation.
//!
//! Provides a thread-safe in-memory backend for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{Storage, StorageError};
use crate::core::models::{
    Checkin, CheckinKind, CheckinStatus, DailySession, DumpCapture, DumpOutcome, EveningReport,
    EveningStatus, NewTodo, NewUser, TodoItem, TodoStatus, Tone, User,
};
use crate::core::types::{SessionId, TodoId, UserId};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    sessions: BTreeMap<SessionId, DailySession>,
    checkins: BTreeMap<(SessionId, CheckinKind), Checkin>,
    reports: BTreeMap<SessionId, EveningReport>,
    todos: BTreeMap<TodoId, TodoItem>,
    next_user: i64,
    next_session: i64,
    next_todo: i64,
}

impl Tables {
    fn session(&self, id: SessionId) -> Result<&DailySession, StorageError> {
        self.sessions
            .get(&id)
            .ok_or_else(|| StorageError::NotFound(format!("session: {}", id)))
    }

    fn insert_todo(&mut self, item: NewTodo, now: DateTime<Utc>) -> TodoItem {
        self.next_todo += 1;
        let todo = TodoItem {
            id: TodoId::new(self.next_todo),
            user_id: item.user_id,
            session_id: item.session_id,
            date_local: item.date_local,
            text: item.text,
            status: TodoStatus::Pending,
            carried_from: item.carried_from,
            created_at: now,
        };
        self.todos.insert(todo.id, todo.clone());
        todo
    }
}

/// In-memory storage backend.
///
/// All tables sit behind one RwLock so multi-row operations are atomic.
/// Data is not persisted across restarts.
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, StorageError> {
        let mut tables = self.write()?;
        if tables
            .users
            .values()
            .any(|u| u.external_id == user.external_id)
        {
            return Err(StorageError::DuplicateKey(format!(
                "user external id: {}",
                user.external_id
            )));
        }

        tables.next_user += 1;
        let created = User {
            id: UserId::new(tables.next_user),
            external_id: user.external_id,
            timezone: user.timezone,
            tone: Tone::default(),
            spheres: Vec::new(),
            morning_time: None,
            evening_time: None,
            weekly_focus: None,
            monthly_focus: None,
            onboarded: false,
            created_at: now,
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> Result<User, StorageError> {
        let tables = self.read()?;
        tables
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("user: {}", id)))
    }

    async fn find_user_by_external(&self, external_id: i64) -> Result<Option<User>, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn update_user(&self, user: User) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let slot = tables
            .users
            .get_mut(&user.id)
            .ok_or_else(|| StorageError::NotFound(format!("user: {}", user.id)))?;
        *slot = user;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let tables = self.read()?;
        Ok(tables.users.values().cloned().collect())
    }

    async fn save_dump(
        &self,
        user_id: UserId,
        date: NaiveDate,
        capture: DumpCapture,
        now: DateTime<Utc>,
    ) -> Result<DumpOutcome, StorageError> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&user_id) {
            return Err(StorageError::NotFound(format!("user: {}", user_id)));
        }

        let existing = tables
            .sessions
            .values_mut()
            .find(|s| s.user_id == user_id && s.date_local == date);

        if let Some(session) = existing {
            if session.is_accepted() {
                return Ok(DumpOutcome::AlreadyAccepted(session.clone()));
            }
            session.overwrite_capture(&capture, now);
            return Ok(DumpOutcome::Reused(session.clone()));
        }

        tables.next_session += 1;
        let session = DailySession {
            id: SessionId::new(tables.next_session),
            user_id,
            date_local: date,
            dump_text: capture.text,
            via_voice: capture.via_voice,
            analysis: Some(capture.analysis),
            focus_choice: None,
            focus_text: None,
            step_text: None,
            plan_b_text: None,
            energy: None,
            accepted_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(DumpOutcome::Created(session))
    }

    async fn get_session(&self, id: SessionId) -> Result<DailySession, StorageError> {
        let tables = self.read()?;
        tables.session(id).cloned()
    }

    async fn find_session(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<DailySession>, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.user_id == user_id && s.date_local == date)
            .cloned())
    }

    async fn update_session(&self, session: DailySession) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        let slot = tables
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| StorageError::NotFound(format!("session: {}", session.id)))?;

        let accepted_at = slot.accepted_at.or(session.accepted_at);
        *slot = session;
        slot.accepted_at = accepted_at;
        Ok(())
    }

    async fn accept_session(
        &self,
        id: SessionId,
        energy: u8,
        at: DateTime<Utc>,
    ) -> Result<DailySession, StorageError> {
        let mut tables = self.write()?;
        let session = tables
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("session: {}", id)))?;
        session.accept(energy, at);
        Ok(session.clone())
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        tables
            .sessions
            .remove(&id)
            .ok_or_else(|| StorageError::NotFound(format!("session: {}", id)))?;
        tables.checkins.retain(|(session_id, _), _| *session_id != id);
        tables.reports.remove(&id);
        for todo in tables.todos.values_mut() {
            if todo.session_id == Some(id) {
                todo.session_id = None;
            }
        }
        Ok(())
    }

    async fn list_sessions_accepted_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailySession>, StorageError> {
        let tables = self.read()?;
        let mut result: Vec<_> = tables
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| matches!(s.accepted_at, Some(at) if at >= start && at < end))
            .cloned()
            .collect();
        result.sort_by_key(|s| s.accepted_at);
        Ok(result)
    }

    async fn upsert_checkin(
        &self,
        session_id: SessionId,
        kind: CheckinKind,
        status: CheckinStatus,
        now: DateTime<Utc>,
    ) -> Result<Checkin, StorageError> {
        let mut tables = self.write()?;
        tables.session(session_id)?;
        let checkin = Checkin {
            session_id,
            kind,
            status,
            updated_at: now,
        };
        tables.checkins.insert((session_id, kind), checkin.clone());
        Ok(checkin)
    }

    async fn find_checkin(
        &self,
        session_id: SessionId,
        kind: CheckinKind,
    ) -> Result<Option<Checkin>, StorageError> {
        let tables = self.read()?;
        Ok(tables.checkins.get(&(session_id, kind)).cloned())
    }

    async fn upsert_evening_report(
        &self,
        session_id: SessionId,
        status: EveningStatus,
        text: String,
        now: DateTime<Utc>,
    ) -> Result<EveningReport, StorageError> {
        let mut tables = self.write()?;
        tables.session(session_id)?;
        let created_at = tables
            .reports
            .get(&session_id)
            .map(|r| r.created_at)
            .unwrap_or(now);
        let report = EveningReport {
            session_id,
            status,
            text,
            created_at,
            updated_at: now,
        };
        tables.reports.insert(session_id, report.clone());
        Ok(report)
    }

    async fn find_evening_report(
        &self,
        session_id: SessionId,
    ) -> Result<Option<EveningReport>, StorageError> {
        let tables = self.read()?;
        Ok(tables.reports.get(&session_id).cloned())
    }

    async fn create_todos(
        &self,
        items: Vec<NewTodo>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TodoItem>, StorageError> {
        let mut tables = self.write()?;
        for item in &items {
            if let Some(session_id) = item.session_id {
                tables.session(session_id)?;
            }
        }
        Ok(items
            .into_iter()
            .map(|item| tables.insert_todo(item, now))
            .collect())
    }

    async fn get_todo(&self, id: TodoId) -> Result<TodoItem, StorageError> {
        let tables = self.read()?;
        tables
            .todos
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("todo: {}", id)))
    }

    async fn list_session_todos(
        &self,
        session_id: SessionId,
        status: Option<TodoStatus>,
    ) -> Result<Vec<TodoItem>, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .todos
            .values()
            .filter(|t| t.session_id == Some(session_id))
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect())
    }

    async fn complete_todo(&self, id: TodoId) -> Result<TodoItem, StorageError> {
        let mut tables = self.write()?;
        let todo = tables
            .todos
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("todo: {}", id)))?;
        match todo.status {
            TodoStatus::Pending => todo.status = TodoStatus::Done,
            TodoStatus::Done => {}
            TodoStatus::CarriedOver => {
                return Err(StorageError::Conflict(format!("todo {} was carried over", id)));
            }
        }
        Ok(todo.clone())
    }

    async fn attach_carry_overs(
        &self,
        user_id: UserId,
        session_id: SessionId,
        today: NaiveDate,
    ) -> Result<Vec<TodoItem>, StorageError> {
        let mut tables = self.write()?;
        tables.session(session_id)?;

        let mut attached = Vec::new();
        for todo in tables.todos.values_mut() {
            if todo.user_id == user_id
                && todo.status == TodoStatus::Pending
                && todo.session_id.is_none()
                && todo.date_local <= today
            {
                todo.session_id = Some(session_id);
                todo.date_local = today;
                attached.push(todo.clone());
            }
        }
        Ok(attached)
    }

    async fn carry_todo(
        &self,
        id: TodoId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<TodoItem, StorageError> {
        let mut tables = self.write()?;
        let source = tables
            .todos
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("todo: {}", id)))?;
        if source.status != TodoStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "todo {} is {}",
                id,
                source.status.as_str()
            )));
        }
        source.status = TodoStatus::CarriedOver;

        let successor = NewTodo {
            user_id: source.user_id,
            session_id: None,
            date_local: date,
            text: source.text.clone(),
            carried_from: Some(id),
        };
        Ok(tables.insert_todo(successor, now))
    }
}
