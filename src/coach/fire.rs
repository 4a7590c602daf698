//! Scheduler fires.
//!
//! A fire may arrive long after its job was registered: the session could be
//! gone, the report already written, or the user no longer onboarded. Each
//! fire re-checks storage and does nothing when its target is stale.

use async_trait::async_trait;

use crate::core::models::User;
use crate::error::CoachError;
use crate::scheduler::{DispatchError, FiredJob, JobDispatcher, JobPayload};
use crate::session::Input;
use crate::storage::{Storage, StorageError};

use super::Coach;

impl<S: Storage + 'static> Coach<S> {
    /// The user a fire belongs to, or `None` if they no longer exist.
    async fn fire_user(&self, fire: &FiredJob) -> Result<Option<User>, DispatchError> {
        let user_id = fire.payload.user_id();
        match self.storage.get_user(user_id).await {
            Ok(user) => Ok(Some(user)),
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(job_id = %fire.job_id, user_id = %user_id, "Fire for unknown user, skipping");
                Ok(None)
            }
            Err(e) => Err(DispatchError::Failed(e.to_string())),
        }
    }

    /// The input a fire produces, or `None` if the fire is stale.
    async fn fire_input(
        &self,
        user: &User,
        payload: &JobPayload,
    ) -> Result<Option<Input>, CoachError> {
        match *payload {
            JobPayload::MorningPrompt { .. } => {
                if !user.wants_morning_prompt() {
                    return Ok(None);
                }
                let today = self
                    .storage
                    .find_session(user.id, user.local_today(self.now()))
                    .await?;
                if today.is_some_and(|s| s.is_accepted()) {
                    return Ok(None);
                }
                Ok(Some(Input::MorningDue))
            }
            JobPayload::Checkin {
                session_id, kind, ..
            } => {
                let session = match self.owned_session(user, session_id).await {
                    Ok(session) => session,
                    Err(CoachError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e),
                };
                if !session.is_accepted() {
                    return Ok(None);
                }
                Ok(Some(Input::CheckinDue {
                    session_id,
                    kind,
                    focus: session.focus_text,
                }))
            }
            JobPayload::EveningReminder {
                session_id,
                attempt,
                ..
            } => {
                let session = match self.owned_session(user, session_id).await {
                    Ok(session) => session,
                    Err(CoachError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e),
                };
                if !session.is_accepted()
                    || self.storage.find_evening_report(session_id).await?.is_some()
                {
                    return Ok(None);
                }
                Ok(Some(Input::EveningDue {
                    session_id,
                    attempt,
                }))
            }
        }
    }
}

#[async_trait]
impl<S: Storage + 'static> JobDispatcher for Coach<S> {
    async fn dispatch(&self, fire: FiredJob) -> Result<(), DispatchError> {
        let Some(user) = self.fire_user(&fire).await? else {
            return Ok(());
        };
        let lane = self.lanes.lane(user.external_id);
        let _guard = lane.lock().await;

        // Another event may have changed the user while we waited.
        let Some(mut user) = self.fire_user(&fire).await? else {
            return Ok(());
        };

        let input = self
            .fire_input(&user, &fire.payload)
            .await
            .map_err(|e| DispatchError::Failed(e.to_string()))?;
        let Some(input) = input else {
            tracing::warn!(job_id = %fire.job_id, fire_id = %fire.fire_id, "Stale fire, skipping");
            return Ok(());
        };

        tracing::debug!(
            job_id = %fire.job_id,
            fire_id = %fire.fire_id,
            user_id = %user.id,
            "Dispatching fire"
        );
        self.drive(&mut user, input).await;
        Ok(())
    }
}
