//! Effect executor.
//!
//! Each effect runs against storage, a collaborator or the scheduler and may
//! produce a follow-up input for the machine.

use crate::collaborators::{AnalysisContext, DeliveryOutcome};
use crate::core::models::{DailySession, DumpCapture, User};
use crate::core::types::{JobId, SessionId, TodoId};
use crate::error::{CoachError, Missing};
use crate::session::{Effect, Input, Notice};
use crate::storage::{Storage, StorageError};
use crate::timing::{EVENING_ATTEMPTS, checkin_jobs, evening_jobs, morning_job};

use super::Coach;

impl<S: Storage + 'static> Coach<S> {
    /// Run one effect. `Ok(Some(_))` carries the follow-up input.
    pub(super) async fn execute(
        &self,
        user: &mut User,
        effect: Effect,
    ) -> Result<Option<Input>, CoachError> {
        let now = self.now();
        match effect {
            Effect::Send(message) => {
                match self.channel.send(user.external_id, message).await? {
                    DeliveryOutcome::Delivered => {}
                    DeliveryOutcome::Unreachable => {
                        tracing::debug!(user_id = %user.id, "User unreachable, message dropped");
                    }
                }
                Ok(None)
            }

            Effect::Emit(event) => {
                self.event_bus.emit(event).await;
                Ok(None)
            }

            Effect::Analyze { text } => {
                let context = AnalysisContext::for_user(user);
                match self.analysis.analyze(&text, &context).await {
                    Ok(analysis) => Ok(Some(Input::AnalysisReady(Box::new(analysis.normalized())))),
                    Err(e) => {
                        tracing::warn!(user_id = %user.id, error = %e, "Analysis failed");
                        Ok(Some(Input::AnalysisFailed))
                    }
                }
            }

            Effect::StoreDump {
                text,
                via_voice,
                analysis,
            } => {
                let capture = DumpCapture {
                    text,
                    via_voice,
                    analysis: analysis.to_value(),
                };
                let outcome = self
                    .storage
                    .save_dump(user.id, user.local_today(now), capture, now)
                    .await?;
                Ok(Some(Input::DumpStored { outcome, analysis }))
            }

            Effect::SelectFocus {
                session_id,
                choice,
                option,
            } => {
                let mut session = self.owned_session(user, session_id).await?;
                session.select_focus(choice, &option, now);
                self.storage
                    .update_session(session)
                    .await
                    .map_err(|e| CoachError::storage(e, Missing::Session(session_id)))?;
                Ok(None)
            }

            Effect::AcceptFocus { session_id, energy } => {
                self.owned_session(user, session_id).await?;
                let session = self
                    .storage
                    .accept_session(session_id, energy, now)
                    .await
                    .map_err(|e| CoachError::storage(e, Missing::Session(session_id)))?;
                tracing::info!(user_id = %user.id, session_id = %session_id, energy, "Focus accepted");
                Ok(Some(Input::FocusAccepted(session)))
            }

            Effect::ScheduleCheckins {
                session_id,
                accepted_at,
            } => {
                for spec in checkin_jobs(user.id, session_id, accepted_at) {
                    self.scheduler.register(spec).await?;
                }
                Ok(None)
            }

            Effect::ScheduleEvening { session_id } => {
                let session = self.owned_session(user, session_id).await?;
                let plan = evening_jobs(user, &session, now);
                if plan.is_empty() {
                    for (attempt, _) in EVENING_ATTEMPTS {
                        self.scheduler.cancel(&JobId::evening(session_id, attempt)).await?;
                    }
                    tracing::debug!(user_id = %user.id, session_id = %session_id, "No evening chain");
                }
                for spec in plan {
                    self.scheduler.register(spec).await?;
                }
                Ok(None)
            }

            Effect::AttachCarryOvers { session_id } => {
                let session = self.owned_session(user, session_id).await?;
                let attached = self
                    .todos
                    .attach_to_session(&session)
                    .await
                    .map_err(|e| CoachError::storage(e, Missing::Session(session_id)))?;
                Ok(Some(Input::CarryOversAttached(attached)))
            }

            Effect::SaveTodos { session_id, lines } => {
                let session = self.owned_session(user, session_id).await?;
                let pending = self
                    .todos
                    .save_entered(&session, lines, now)
                    .await
                    .map_err(|e| CoachError::storage(e, Missing::Session(session_id)))?;
                Ok(Some(Input::TodosSaved(pending)))
            }

            Effect::RecordCheckin {
                session_id,
                kind,
                status,
            } => {
                let session = self.owned_session(user, session_id).await?;
                self.storage
                    .upsert_checkin(session_id, kind, status, now)
                    .await
                    .map_err(|e| CoachError::storage(e, Missing::Session(session_id)))?;
                let pending = self
                    .todos
                    .pending(&session)
                    .await
                    .map_err(|e| CoachError::storage(e, Missing::Session(session_id)))?;
                Ok(Some(Input::CheckinRecorded {
                    session_id,
                    kind,
                    status,
                    pending,
                }))
            }

            Effect::SaveEveningReport {
                session_id,
                status,
                text,
            } => {
                self.owned_session(user, session_id).await?;
                self.storage
                    .upsert_evening_report(session_id, status, text, now)
                    .await
                    .map_err(|e| CoachError::storage(e, Missing::Session(session_id)))?;
                Ok(None)
            }

            Effect::RequestDeeper { session_id } => {
                let session = self.owned_session(user, session_id).await?;
                let emotion_mirror = session
                    .analysis
                    .as_ref()
                    .and_then(|value| value.get("emotion_mirror"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                let context = AnalysisContext::for_user(user);
                match self
                    .analysis
                    .go_deeper(&session.dump_text, emotion_mirror, &context)
                    .await
                {
                    Ok(text) => Ok(Some(Input::DeeperReady(text))),
                    Err(e) => {
                        tracing::warn!(user_id = %user.id, error = %e, "Go deeper failed");
                        Ok(Some(Input::DeeperFailed))
                    }
                }
            }

            Effect::CompleteTodo { todo_id } => {
                let item = self
                    .todos
                    .complete(user, todo_id)
                    .await
                    .map_err(|e| todo_error(e, todo_id))?;
                Ok(Some(Input::TodoCompleted(item)))
            }

            Effect::CarryTodo { todo_id, date } => {
                let to = self
                    .todos
                    .carry_to(user, todo_id, date, now)
                    .await
                    .map_err(|e| todo_error(e, todo_id))?;
                let from = self
                    .todos
                    .get(user, todo_id)
                    .await
                    .map_err(|e| todo_error(e, todo_id))?;
                Ok(Some(Input::TodoCarried { from, to }))
            }

            Effect::UpdateUser(patch) => {
                patch.apply(user);
                self.storage
                    .update_user(user.clone())
                    .await
                    .map_err(|e| CoachError::storage(e, Missing::User(user.id)))?;
                Ok(None)
            }

            Effect::RegisterMorning => {
                match morning_job(user) {
                    Some(spec) => self.scheduler.register(spec).await?,
                    None => {
                        self.scheduler.cancel(&JobId::morning(user.id)).await?;
                    }
                }
                Ok(None)
            }
        }
    }

    /// Load a session that belongs to `user`. Other users' sessions are missing.
    pub(super) async fn owned_session(
        &self,
        user: &User,
        session_id: SessionId,
    ) -> Result<DailySession, CoachError> {
        let session = self
            .storage
            .get_session(session_id)
            .await
            .map_err(|e| CoachError::storage(e, Missing::Session(session_id)))?;
        if session.user_id != user.id {
            return Err(CoachError::NotFound(Missing::Session(session_id)));
        }
        Ok(session)
    }
}

/// A resolved item cannot be resolved again.
fn todo_error(err: StorageError, todo_id: TodoId) -> CoachError {
    match err {
        StorageError::Conflict(_) => CoachError::Validation(Notice::TodoAlreadyResolved),
        other => CoachError::storage(other, Missing::Todo(todo_id)),
    }
}
