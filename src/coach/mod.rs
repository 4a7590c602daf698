//! The orchestrator.
//!
//! [`Coach`] owns the per-user lanes and conversation states. Every inbound
//! event and every scheduler fire for a user runs inside that user's lane:
//! the pure transition is computed, its effects run in order, and any
//! follow-up inputs the effects produce are fed back before the lane is
//! released.

mod effects;
mod fire;
mod lanes;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::collaborators::{
    AnalysisEngine, LoggingChannel, MessagingChannel, OfflineAnalysis, OutboundMessage,
    Transcriber, UnavailableTranscriber,
};
use crate::config::DialogueLimits;
use crate::core::clock::Clock;
use crate::core::models::{NewUser, User};
use crate::core::types::UserId;
use crate::error::{CoachError, Missing};
use crate::events::EventBus;
use crate::scheduler::JobScheduler;
use crate::session::{
    ConversationState, InboundEvent, Input, Notice, Transition, TransitionContext, transition,
};
use crate::storage::{Storage, StorageError};
use crate::todos::TodoResolver;

use lanes::{ConversationStore, UserLanes};

/// Drives conversations for all users.
pub struct Coach<S: Storage> {
    storage: Arc<S>,
    scheduler: Arc<dyn JobScheduler>,
    clock: Arc<dyn Clock>,
    analysis: Arc<dyn AnalysisEngine>,
    transcriber: Arc<dyn Transcriber>,
    channel: Arc<dyn MessagingChannel>,
    event_bus: Arc<EventBus>,
    limits: DialogueLimits,
    default_timezone: Tz,
    todos: TodoResolver<S>,
    lanes: UserLanes,
    conversations: ConversationStore,
}

impl<S: Storage + 'static> Coach<S> {
    /// Create a coach with the offline collaborators.
    pub fn new(storage: Arc<S>, scheduler: Arc<dyn JobScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self {
            todos: TodoResolver::new(Arc::clone(&storage)),
            storage,
            scheduler,
            clock,
            analysis: Arc::new(OfflineAnalysis),
            transcriber: Arc::new(UnavailableTranscriber),
            channel: Arc::new(LoggingChannel),
            event_bus: Arc::new(EventBus::new()),
            limits: DialogueLimits::default(),
            default_timezone: chrono_tz::Europe::Moscow,
            lanes: UserLanes::default(),
            conversations: ConversationStore::default(),
        }
    }

    pub fn with_analysis(mut self, analysis: Arc<dyn AnalysisEngine>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn MessagingChannel>) -> Self {
        self.channel = channel;
        self
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_limits(mut self, limits: DialogueLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Timezone given to users created on first contact.
    pub fn with_default_timezone(mut self, timezone: Tz) -> Self {
        self.default_timezone = timezone;
        self
    }

    /// Current conversation state of a user.
    pub fn conversation_state(&self, user_id: UserId) -> ConversationState {
        self.conversations.get(user_id)
    }

    /// Drop a user's conversation state. Registered jobs are left alone.
    pub fn reset_conversation(&self, user_id: UserId) {
        self.conversations.set(user_id, ConversationState::Idle);
    }

    /// Handle an event from a user of the messaging channel.
    ///
    /// The user is created on first contact. Failures inside the conversation
    /// are reported to the user and never returned; only failing to load or
    /// create the user is an error.
    pub async fn on_user_event(
        &self,
        external_id: i64,
        event: InboundEvent,
    ) -> Result<(), CoachError> {
        let lane = self.lanes.lane(external_id);
        let _guard = lane.lock().await;

        let mut user = self.find_or_create_user(external_id).await?;

        let input = match event {
            InboundEvent::Start => Input::Start,
            InboundEvent::Text(body) => Input::Text {
                body,
                via_voice: false,
            },
            InboundEvent::Command(command) => Input::Command(command),
            InboundEvent::Menu(action) => Input::Menu(action),
            InboundEvent::Voice(audio) => match self.transcriber.transcribe(&audio).await {
                Ok(text) if !text.trim().is_empty() => Input::Text {
                    body: text,
                    via_voice: true,
                },
                Ok(_) => {
                    tracing::debug!(user_id = %user.id, file_id = %audio.file_id, "Empty transcription");
                    self.notify(&user, OutboundMessage::new(Notice::TranscriptionFailed))
                        .await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Transcription failed");
                    self.notify(&user, OutboundMessage::new(Notice::TranscriptionFailed))
                        .await;
                    return Ok(());
                }
            },
        };

        self.drive(&mut user, input).await;
        Ok(())
    }

    async fn find_or_create_user(&self, external_id: i64) -> Result<User, CoachError> {
        if let Some(user) = self.storage.find_user_by_external(external_id).await? {
            return Ok(user);
        }
        let new_user = NewUser {
            external_id,
            timezone: self.default_timezone,
        };
        match self.storage.create_user(new_user, self.clock.now()).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, external_id, "User created");
                Ok(user)
            }
            // Lost a first-contact race; the other event created the row.
            Err(StorageError::DuplicateKey(_)) => self
                .storage
                .find_user_by_external(external_id)
                .await?
                .ok_or_else(|| {
                    CoachError::Storage(StorageError::Other(format!(
                        "user {} vanished after duplicate insert",
                        external_id
                    )))
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// Run `input` and all follow-ups it produces. The caller holds the lane.
    async fn drive(&self, user: &mut User, input: Input) {
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            let now = self.clock.now();
            let today = match self
                .storage
                .find_session(user.id, user.local_today(now))
                .await
            {
                Ok(today) => today,
                Err(e) => {
                    tracing::error!(user_id = %user.id, error = %e, "Failed to load today's session");
                    self.notify(user, OutboundMessage::new(Notice::SomethingWentWrong))
                        .await;
                    return;
                }
            };

            let previous = self.conversations.get(user.id);
            let input_name = input.name();
            let Transition { next, effects } = {
                let ctx = TransitionContext {
                    user,
                    today: today.as_ref(),
                    now,
                    limits: &self.limits,
                };
                transition(previous.clone(), input, &ctx)
            };
            tracing::debug!(
                user_id = %user.id,
                input = input_name,
                from = previous.name(),
                to = next.name(),
                effects = effects.len(),
                "Transition"
            );
            self.conversations.set(user.id, next);

            for effect in effects {
                match self.execute(user, effect).await {
                    Ok(Some(follow_up)) => queue.push_back(follow_up),
                    Ok(None) => {}
                    Err(err) => {
                        if self.recover(user, &previous, err).await {
                            queue.clear();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Apply the error policy. Returns whether the transition was aborted.
    async fn recover(&self, user: &User, previous: &ConversationState, err: CoachError) -> bool {
        match &err {
            CoachError::Scheduling(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Scheduling failed, continuing");
                false
            }
            CoachError::ExternalService(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Collaborator failed, continuing");
                false
            }
            CoachError::Validation(_) => {
                self.conversations.set(user.id, previous.clone());
                self.notify(user, OutboundMessage::new(err.notice())).await;
                true
            }
            CoachError::NotFound(missing) => {
                tracing::warn!(user_id = %user.id, missing = %missing, "Referenced row is gone");
                let rollback = match (missing, previous.session_id()) {
                    (Missing::Session(gone), Some(current)) if *gone == current => {
                        ConversationState::Idle
                    }
                    _ => previous.clone(),
                };
                self.conversations.set(user.id, rollback);
                self.notify(user, OutboundMessage::new(err.notice())).await;
                true
            }
            CoachError::Storage(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Storage failed");
                self.conversations.set(user.id, previous.clone());
                self.notify(user, OutboundMessage::new(err.notice())).await;
                true
            }
        }
    }

    /// Send a message outside the effect list. Delivery failures are logged.
    async fn notify(&self, user: &User, message: OutboundMessage) {
        if let Err(e) = self.channel.send(user.external_id, message).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to deliver notice");
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
