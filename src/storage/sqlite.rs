//! SQLite storage implementation.
//!
//! Provides persistent storage using SQLite database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use super::{Storage, StorageError};
use crate::core::models::{
    Checkin, CheckinKind, CheckinStatus, DailySession, DumpCapture, DumpOutcome, EveningReport,
    EveningStatus, NewTodo, NewUser, Sphere, TodoItem, TodoStatus, Tone, UnknownVariant, User,
};
use crate::core::types::{SessionId, TodoId, UserId};

/// SQLite storage backend.
///
/// Provides persistent storage with automatic schema migration.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given database path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(other)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(other)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (useful for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(other)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(other)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;

        let has_spheres: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('users') WHERE name = 'spheres'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(other)?;
        if has_spheres == 0 {
            let spheres = include_str!("../../migrations/002_user_spheres.sql");
            sqlx::raw_sql(spheres)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        }
        Ok(())
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn other(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(e.to_string())
}

fn bad_value(e: UnknownVariant) -> StorageError {
    StorageError::SerializationError(e.to_string())
}

fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn date_to_string(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn string_to_date(s: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| StorageError::SerializationError(format!("date '{}': {}", s, e)))
}

fn parse_optional<T: FromStr>(value: Option<String>) -> Result<Option<T>, StorageError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| StorageError::SerializationError(e.to_string()))
        })
        .transpose()
}

const USER_COLUMNS: &str = "id, external_id, timezone, tone, morning_time, evening_time, \
     weekly_focus, monthly_focus, onboarded, created_at, spheres";

type UserRow = (
    i64,
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    i64,
    String,
);

fn user_from_row(row: UserRow) -> Result<User, StorageError> {
    let timezone = row
        .2
        .parse::<Tz>()
        .map_err(|_| StorageError::SerializationError(format!("timezone '{}'", row.2)))?;

    Ok(User {
        id: UserId::new(row.0),
        external_id: row.1,
        timezone,
        tone: row.3.parse::<Tone>().map_err(bad_value)?,
        spheres: Sphere::split(&row.10).map_err(bad_value)?,
        morning_time: parse_optional(row.4)?,
        evening_time: parse_optional(row.5)?,
        weekly_focus: row.6,
        monthly_focus: row.7,
        onboarded: row.8,
        created_at: from_millis(row.9),
    })
}

const SESSION_COLUMNS: &str = "id, user_id, date_local, dump_text, via_voice, analysis, \
     focus_choice, focus_text, step_text, plan_b_text, energy, accepted_at, created_at, updated_at";

type SessionRow = (
    i64,
    i64,
    String,
    String,
    bool,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<i64>,
    i64,
    i64,
);

fn session_from_row(row: SessionRow) -> Result<DailySession, StorageError> {
    let analysis = row
        .5
        .map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| StorageError::SerializationError(e.to_string()))
        })
        .transpose()?;

    Ok(DailySession {
        id: SessionId::new(row.0),
        user_id: UserId::new(row.1),
        date_local: string_to_date(&row.2)?,
        dump_text: row.3,
        via_voice: row.4,
        analysis,
        focus_choice: parse_optional(row.6)?,
        focus_text: row.7,
        step_text: row.8,
        plan_b_text: row.9,
        energy: row.10.map(|e| e.clamp(0, u8::MAX as i64) as u8),
        accepted_at: row.11.map(from_millis),
        created_at: from_millis(row.12),
        updated_at: from_millis(row.13),
    })
}

const TODO_COLUMNS: &str =
    "id, user_id, session_id, date_local, text, status, carried_from, created_at";

type TodoRow = (i64, i64, Option<i64>, String, String, String, Option<i64>, i64);

fn todo_from_row(row: TodoRow) -> Result<TodoItem, StorageError> {
    Ok(TodoItem {
        id: TodoId::new(row.0),
        user_id: UserId::new(row.1),
        session_id: row.2.map(SessionId::new),
        date_local: string_to_date(&row.3)?,
        text: row.4,
        status: row.5.parse::<TodoStatus>().map_err(bad_value)?,
        carried_from: row.6.map(TodoId::new),
        created_at: from_millis(row.7),
    })
}

async fn fetch_session(
    conn: &mut SqliteConnection,
    id: SessionId,
) -> Result<Option<DailySession>, StorageError> {
    let sql = format!("SELECT {} FROM daily_sessions WHERE id = ?", SESSION_COLUMNS);
    let row: Option<SessionRow> = sqlx::query_as(&sql)
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(other)?;
    row.map(session_from_row).transpose()
}

async fn require_session(
    conn: &mut SqliteConnection,
    id: SessionId,
) -> Result<DailySession, StorageError> {
    fetch_session(conn, id)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("session: {}", id)))
}

async fn fetch_todo(conn: &mut SqliteConnection, id: TodoId) -> Result<TodoItem, StorageError> {
    let sql = format!("SELECT {} FROM todo_items WHERE id = ?", TODO_COLUMNS);
    let row: TodoRow = sqlx::query_as(&sql)
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(other)?
        .ok_or_else(|| StorageError::NotFound(format!("todo: {}", id)))?;
    todo_from_row(row)
}

async fn insert_todo(
    conn: &mut SqliteConnection,
    item: NewTodo,
    now: DateTime<Utc>,
) -> Result<TodoItem, StorageError> {
    let result = sqlx::query(
        r#"
        INSERT INTO todo_items (user_id, session_id, date_local, text, status, carried_from, created_at)
        VALUES (?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(item.user_id.get())
    .bind(item.session_id.map(|s| s.get()))
    .bind(date_to_string(item.date_local))
    .bind(&item.text)
    .bind(item.carried_from.map(|t| t.get()))
    .bind(to_millis(now))
    .execute(&mut *conn)
    .await
    .map_err(other)?;

    Ok(TodoItem {
        id: TodoId::new(result.last_insert_rowid()),
        user_id: item.user_id,
        session_id: item.session_id,
        date_local: item.date_local,
        text: item.text,
        status: TodoStatus::Pending,
        carried_from: item.carried_from,
        created_at: now,
    })
}

/// Write every mutable column of a session. `accepted_at` is only filled when empty.
async fn write_session(
    conn: &mut SqliteConnection,
    session: &DailySession,
) -> Result<u64, StorageError> {
    let analysis = session
        .analysis
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;

    let result = sqlx::query(
        r#"
        UPDATE daily_sessions
        SET dump_text = ?, via_voice = ?, analysis = ?, focus_choice = ?, focus_text = ?,
            step_text = ?, plan_b_text = ?, energy = ?,
            accepted_at = COALESCE(accepted_at, ?), updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&session.dump_text)
    .bind(session.via_voice)
    .bind(analysis)
    .bind(session.focus_choice.map(|c| c.as_str()))
    .bind(&session.focus_text)
    .bind(&session.step_text)
    .bind(&session.plan_b_text)
    .bind(session.energy.map(i64::from))
    .bind(session.accepted_at.map(to_millis))
    .bind(to_millis(session.updated_at))
    .bind(session.id.get())
    .execute(&mut *conn)
    .await
    .map_err(other)?;

    Ok(result.rows_affected())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, StorageError> {
        let result = sqlx::query(
            "INSERT INTO users (external_id, timezone, tone, onboarded, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(user.external_id)
        .bind(user.timezone.name())
        .bind(Tone::default().as_str())
        .bind(to_millis(now))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(User {
                id: UserId::new(done.last_insert_rowid()),
                external_id: user.external_id,
                timezone: user.timezone,
                tone: Tone::default(),
                spheres: Vec::new(),
                morning_time: None,
                evening_time: None,
                weekly_focus: None,
                monthly_focus: None,
                onboarded: false,
                created_at: from_millis(to_millis(now)),
            }),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                StorageError::DuplicateKey(format!("user external id: {}", user.external_id)),
            ),
            Err(e) => Err(other(e)),
        }
    }

    async fn get_user(&self, id: UserId) -> Result<User, StorageError> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row: UserRow = sqlx::query_as(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(other)?
            .ok_or_else(|| StorageError::NotFound(format!("user: {}", id)))?;
        user_from_row(row)
    }

    async fn find_user_by_external(&self, external_id: i64) -> Result<Option<User>, StorageError> {
        let sql = format!("SELECT {} FROM users WHERE external_id = ?", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(other)?;
        row.map(user_from_row).transpose()
    }

    async fn update_user(&self, user: User) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET timezone = ?, tone = ?, morning_time = ?, evening_time = ?,
                weekly_focus = ?, monthly_focus = ?, onboarded = ?, spheres = ?
            WHERE id = ?
            "#,
        )
        .bind(user.timezone.name())
        .bind(user.tone.as_str())
        .bind(user.morning_time.map(|t| t.to_string()))
        .bind(user.evening_time.map(|t| t.to_string()))
        .bind(&user.weekly_focus)
        .bind(&user.monthly_focus)
        .bind(user.onboarded)
        .bind(Sphere::join(&user.spheres))
        .bind(user.id.get())
        .execute(&self.pool)
        .await
        .map_err(other)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("user: {}", user.id)));
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(other)?;
        rows.into_iter().map(user_from_row).collect()
    }

    async fn save_dump(
        &self,
        user_id: UserId,
        date: NaiveDate,
        capture: DumpCapture,
        now: DateTime<Utc>,
    ) -> Result<DumpOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(other)?;

        let user: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(user_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(other)?;
        if user.is_none() {
            return Err(StorageError::NotFound(format!("user: {}", user_id)));
        }

        let sql = format!(
            "SELECT {} FROM daily_sessions WHERE user_id = ? AND date_local = ?",
            SESSION_COLUMNS
        );
        let existing: Option<SessionRow> = sqlx::query_as(&sql)
            .bind(user_id.get())
            .bind(date_to_string(date))
            .fetch_optional(&mut *tx)
            .await
            .map_err(other)?;

        let outcome = match existing {
            Some(row) => {
                let mut session = session_from_row(row)?;
                if session.is_accepted() {
                    DumpOutcome::AlreadyAccepted(session)
                } else {
                    session.overwrite_capture(&capture, now);
                    write_session(&mut tx, &session).await?;
                    DumpOutcome::Reused(session)
                }
            }
            None => {
                let analysis = serde_json::to_string(&capture.analysis)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))?;
                let result = sqlx::query(
                    r#"
                    INSERT INTO daily_sessions
                        (user_id, date_local, dump_text, via_voice, analysis, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(user_id.get())
                .bind(date_to_string(date))
                .bind(&capture.text)
                .bind(capture.via_voice)
                .bind(analysis)
                .bind(to_millis(now))
                .bind(to_millis(now))
                .execute(&mut *tx)
                .await;

                let id = match result {
                    Ok(done) => SessionId::new(done.last_insert_rowid()),
                    Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                        return Err(StorageError::DuplicateKey(format!(
                            "session: user {} on {}",
                            user_id, date
                        )));
                    }
                    Err(e) => return Err(other(e)),
                };
                DumpOutcome::Created(require_session(&mut tx, id).await?)
            }
        };

        tx.commit().await.map_err(other)?;
        Ok(outcome)
    }

    async fn get_session(&self, id: SessionId) -> Result<DailySession, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(other)?;
        require_session(&mut conn, id).await
    }

    async fn find_session(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<DailySession>, StorageError> {
        let sql = format!(
            "SELECT {} FROM daily_sessions WHERE user_id = ? AND date_local = ?",
            SESSION_COLUMNS
        );
        let row: Option<SessionRow> = sqlx::query_as(&sql)
            .bind(user_id.get())
            .bind(date_to_string(date))
            .fetch_optional(&self.pool)
            .await
            .map_err(other)?;
        row.map(session_from_row).transpose()
    }

    async fn update_session(&self, session: DailySession) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(other)?;
        if write_session(&mut conn, &session).await? == 0 {
            return Err(StorageError::NotFound(format!("session: {}", session.id)));
        }
        Ok(())
    }

    async fn accept_session(
        &self,
        id: SessionId,
        energy: u8,
        at: DateTime<Utc>,
    ) -> Result<DailySession, StorageError> {
        let mut tx = self.pool.begin().await.map_err(other)?;
        let result = sqlx::query(
            r#"
            UPDATE daily_sessions
            SET energy = ?, accepted_at = COALESCE(accepted_at, ?), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(i64::from(energy))
        .bind(to_millis(at))
        .bind(to_millis(at))
        .bind(id.get())
        .execute(&mut *tx)
        .await
        .map_err(other)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("session: {}", id)));
        }

        let session = require_session(&mut tx, id).await?;
        tx.commit().await.map_err(other)?;
        Ok(session)
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(other)?;

        sqlx::query("DELETE FROM checkins WHERE session_id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(other)?;
        sqlx::query("DELETE FROM evening_reports WHERE session_id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(other)?;
        sqlx::query("UPDATE todo_items SET session_id = NULL WHERE session_id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(other)?;
        let result = sqlx::query("DELETE FROM daily_sessions WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(other)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("session: {}", id)));
        }
        tx.commit().await.map_err(other)?;
        Ok(())
    }

    async fn list_sessions_accepted_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DailySession>, StorageError> {
        let sql = format!(
            "SELECT {} FROM daily_sessions \
             WHERE user_id = ? AND accepted_at >= ? AND accepted_at < ? \
             ORDER BY accepted_at",
            SESSION_COLUMNS
        );
        let rows: Vec<SessionRow> = sqlx::query_as(&sql)
            .bind(user_id.get())
            .bind(to_millis(start))
            .bind(to_millis(end))
            .fetch_all(&self.pool)
            .await
            .map_err(other)?;
        rows.into_iter().map(session_from_row).collect()
    }

    async fn upsert_checkin(
        &self,
        session_id: SessionId,
        kind: CheckinKind,
        status: CheckinStatus,
        now: DateTime<Utc>,
    ) -> Result<Checkin, StorageError> {
        let mut tx = self.pool.begin().await.map_err(other)?;
        require_session(&mut tx, session_id).await?;

        sqlx::query(
            r#"
            INSERT INTO checkins (session_id, kind, status, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (session_id, kind) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id.get())
        .bind(kind.as_str())
        .bind(status.as_str())
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await
        .map_err(other)?;

        tx.commit().await.map_err(other)?;
        Ok(Checkin {
            session_id,
            kind,
            status,
            updated_at: from_millis(to_millis(now)),
        })
    }

    async fn find_checkin(
        &self,
        session_id: SessionId,
        kind: CheckinKind,
    ) -> Result<Option<Checkin>, StorageError> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT status, updated_at FROM checkins WHERE session_id = ? AND kind = ?",
        )
        .bind(session_id.get())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(other)?;

        row.map(|(status, updated_at)| {
            Ok(Checkin {
                session_id,
                kind,
                status: status.parse::<CheckinStatus>().map_err(bad_value)?,
                updated_at: from_millis(updated_at),
            })
        })
        .transpose()
    }

    async fn upsert_evening_report(
        &self,
        session_id: SessionId,
        status: EveningStatus,
        text: String,
        now: DateTime<Utc>,
    ) -> Result<EveningReport, StorageError> {
        let mut tx = self.pool.begin().await.map_err(other)?;
        require_session(&mut tx, session_id).await?;

        sqlx::query(
            r#"
            INSERT INTO evening_reports (session_id, status, text, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (session_id) DO UPDATE SET
                status = excluded.status,
                text = excluded.text,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id.get())
        .bind(status.as_str())
        .bind(&text)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await
        .map_err(other)?;

        tx.commit().await.map_err(other)?;
        self.find_evening_report(session_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("evening report: {}", session_id)))
    }

    async fn find_evening_report(
        &self,
        session_id: SessionId,
    ) -> Result<Option<EveningReport>, StorageError> {
        let row: Option<(String, String, i64, i64)> = sqlx::query_as(
            "SELECT status, text, created_at, updated_at FROM evening_reports WHERE session_id = ?",
        )
        .bind(session_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(other)?;

        row.map(|(status, text, created_at, updated_at)| {
            Ok(EveningReport {
                session_id,
                status: status.parse::<EveningStatus>().map_err(bad_value)?,
                text,
                created_at: from_millis(created_at),
                updated_at: from_millis(updated_at),
            })
        })
        .transpose()
    }

    async fn create_todos(
        &self,
        items: Vec<NewTodo>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TodoItem>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(other)?;
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            if let Some(session_id) = item.session_id {
                require_session(&mut tx, session_id).await?;
            }
            created.push(insert_todo(&mut tx, item, now).await?);
        }
        tx.commit().await.map_err(other)?;
        Ok(created)
    }

    async fn get_todo(&self, id: TodoId) -> Result<TodoItem, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(other)?;
        fetch_todo(&mut conn, id).await
    }

    async fn list_session_todos(
        &self,
        session_id: SessionId,
        status: Option<TodoStatus>,
    ) -> Result<Vec<TodoItem>, StorageError> {
        let sql = format!(
            "SELECT {} FROM todo_items WHERE session_id = ? AND (? IS NULL OR status = ?) ORDER BY id",
            TODO_COLUMNS
        );
        let status = status.map(|s| s.as_str());
        let rows: Vec<TodoRow> = sqlx::query_as(&sql)
            .bind(session_id.get())
            .bind(status)
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(other)?;
        rows.into_iter().map(todo_from_row).collect()
    }

    async fn complete_todo(&self, id: TodoId) -> Result<TodoItem, StorageError> {
        let mut tx = self.pool.begin().await.map_err(other)?;
        let mut todo = fetch_todo(&mut tx, id).await?;

        match todo.status {
            TodoStatus::Pending => {
                sqlx::query("UPDATE todo_items SET status = 'done' WHERE id = ?")
                    .bind(id.get())
                    .execute(&mut *tx)
                    .await
                    .map_err(other)?;
                todo.status = TodoStatus::Done;
            }
            TodoStatus::Done => {}
            TodoStatus::CarriedOver => {
                return Err(StorageError::Conflict(format!("todo {} was carried over", id)));
            }
        }

        tx.commit().await.map_err(other)?;
        Ok(todo)
    }

    async fn attach_carry_overs(
        &self,
        user_id: UserId,
        session_id: SessionId,
        today: NaiveDate,
    ) -> Result<Vec<TodoItem>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(other)?;
        require_session(&mut tx, session_id).await?;

        let sql = format!(
            "SELECT {} FROM todo_items \
             WHERE user_id = ? AND status = 'pending' AND session_id IS NULL AND date_local <= ? \
             ORDER BY id",
            TODO_COLUMNS
        );
        let rows: Vec<TodoRow> = sqlx::query_as(&sql)
            .bind(user_id.get())
            .bind(date_to_string(today))
            .fetch_all(&mut *tx)
            .await
            .map_err(other)?;

        let mut attached = Vec::with_capacity(rows.len());
        for row in rows {
            let mut todo = todo_from_row(row)?;
            sqlx::query("UPDATE todo_items SET session_id = ?, date_local = ? WHERE id = ?")
                .bind(session_id.get())
                .bind(date_to_string(today))
                .bind(todo.id.get())
                .execute(&mut *tx)
                .await
                .map_err(other)?;
            todo.session_id = Some(session_id);
            todo.date_local = today;
            attached.push(todo);
        }

        tx.commit().await.map_err(other)?;
        Ok(attached)
    }

    async fn carry_todo(
        &self,
        id: TodoId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<TodoItem, StorageError> {
        let mut tx = self.pool.begin().await.map_err(other)?;
        let source = fetch_todo(&mut tx, id).await?;
        if source.status != TodoStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "todo {} is {}",
                id,
                source.status.as_str()
            )));
        }

        sqlx::query("UPDATE todo_items SET status = 'carried_over' WHERE id = ?")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(other)?;

        let successor = insert_todo(
            &mut tx,
            NewTodo {
                user_id: source.user_id,
                session_id: None,
                date_local: date,
                text: source.text,
                carried_from: Some(id),
            },
            now,
        )
        .await?;

        tx.commit().await.map_err(other)?;
        Ok(successor)
    }
}
