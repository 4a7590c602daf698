//! Analytics and lifecycle events.
//!
//! The orchestrator and the scheduler emit events describing what happened in
//! a user's day and to scheduled jobs. Handlers registered on the bus can log
//! them, count them or persist them elsewhere.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::models::{CheckinKind, CheckinStatus, EveningStatus, FocusChoice};
use crate::core::types::{FireId, JobId, SessionId, TodoId, UserId};

/// Events emitted by the coaching loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A user started a conversation.
    Start { user_id: UserId, at: DateTime<Utc> },

    /// A user finished onboarding.
    OnboardingComplete { user_id: UserId, at: DateTime<Utc> },

    /// Captured input was analyzed and stored.
    DumpCreated {
        user_id: UserId,
        session_id: SessionId,
        via_voice: bool,
        at: DateTime<Utc>,
    },

    /// A focus option was picked.
    FocusSelected {
        user_id: UserId,
        session_id: SessionId,
        choice: FocusChoice,
        at: DateTime<Utc>,
    },

    /// The day's focus was accepted with an energy level.
    FocusAccepted {
        user_id: UserId,
        session_id: SessionId,
        energy: u8,
        at: DateTime<Utc>,
    },

    /// A check-in answer was recorded.
    CheckinRecorded {
        user_id: UserId,
        session_id: SessionId,
        kind: CheckinKind,
        status: CheckinStatus,
        at: DateTime<Utc>,
    },

    /// The evening report was saved.
    EveningReportDone {
        user_id: UserId,
        session_id: SessionId,
        status: EveningStatus,
        at: DateTime<Utc>,
    },

    /// A go-deeper reflection was requested.
    GoDeeperStarted {
        user_id: UserId,
        session_id: SessionId,
        at: DateTime<Utc>,
    },

    /// A go-deeper conversation ended.
    GoDeeperCompleted { user_id: UserId, at: DateTime<Utc> },

    /// A todo item was marked done.
    TodoCompleted {
        user_id: UserId,
        todo_id: TodoId,
        at: DateTime<Utc>,
    },

    /// A todo item was carried to the next day.
    TodoCarried {
        user_id: UserId,
        from: TodoId,
        to: TodoId,
        at: DateTime<Utc>,
    },

    /// A scheduled job fired and was handed to the dispatcher.
    JobFired {
        job_id: JobId,
        fire_id: FireId,
        scheduled_for: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// Dispatching a fired job failed. The fire is dropped.
    JobDispatchFailed {
        job_id: JobId,
        fire_id: FireId,
        error: String,
        at: DateTime<Utc>,
    },

    /// The rebuild procedure finished.
    RebuildCompleted {
        registered: usize,
        skipped: usize,
        failures: usize,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Get the time this event was recorded.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Start { at, .. }
            | Event::OnboardingComplete { at, .. }
            | Event::DumpCreated { at, .. }
            | Event::FocusSelected { at, .. }
            | Event::FocusAccepted { at, .. }
            | Event::CheckinRecorded { at, .. }
            | Event::EveningReportDone { at, .. }
            | Event::GoDeeperStarted { at, .. }
            | Event::GoDeeperCompleted { at, .. }
            | Event::TodoCompleted { at, .. }
            | Event::TodoCarried { at, .. }
            | Event::JobFired { at, .. }
            | Event::JobDispatchFailed { at, .. }
            | Event::RebuildCompleted { at, .. } => *at,
        }
    }

    /// Short name of the event type, as used in analytics logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::OnboardingComplete { .. } => "onboarding_complete",
            Event::DumpCreated { .. } => "dump_created",
            Event::FocusSelected { .. } => "focus_selected",
            Event::FocusAccepted { .. } => "focus_accepted",
            Event::CheckinRecorded { .. } => "checkin_done",
            Event::EveningReportDone { .. } => "evening_report_done",
            Event::GoDeeperStarted { .. } => "go_deeper_started",
            Event::GoDeeperCompleted { .. } => "go_deeper_completed",
            Event::TodoCompleted { .. } => "todo_completed",
            Event::TodoCarried { .. } => "todo_carried",
            Event::JobFired { .. } => "job_fired",
            Event::JobDispatchFailed { .. } => "job_dispatch_failed",
            Event::RebuildCompleted { .. } => "rebuild_completed",
        }
    }

    /// The user this event concerns, if any.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Event::Start { user_id, .. }
            | Event::OnboardingComplete { user_id, .. }
            | Event::DumpCreated { user_id, .. }
            | Event::FocusSelected { user_id, .. }
            | Event::FocusAccepted { user_id, .. }
            | Event::CheckinRecorded { user_id, .. }
            | Event::EveningReportDone { user_id, .. }
            | Event::GoDeeperStarted { user_id, .. }
            | Event::GoDeeperCompleted { user_id, .. }
            | Event::TodoCompleted { user_id, .. }
            | Event::TodoCarried { user_id, .. } => Some(*user_id),
            Event::JobFired { .. }
            | Event::JobDispatchFailed { .. }
            | Event::RebuildCompleted { .. } => None,
        }
    }
}

/// Handler for receiving events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    struct RecordingHandler {
        events: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &Event) {
            self.events.lock().await.push(event.clone());
        }
    }

    struct CountingHandler {
        count: AtomicU32,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_emit_reaches_every_handler() {
        let recorder = Arc::new(RecordingHandler {
            events: Mutex::new(Vec::new()),
        });
        let counter = Arc::new(CountingHandler {
            count: AtomicU32::new(0),
        });
        let bus = EventBus::new();
        bus.register(recorder.clone()).await;
        bus.register(counter.clone()).await;
        assert_eq!(bus.handler_count().await, 2);

        bus.emit(Event::Start {
            user_id: UserId::new(1),
            at: at(),
        })
        .await;
        bus.emit(Event::GoDeeperCompleted {
            user_id: UserId::new(1),
            at: at(),
        })
        .await;

        assert_eq!(counter.count.load(Ordering::SeqCst), 2);
        let events = recorder.events.lock().await.clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "start");
        assert_eq!(events[1].name(), "go_deeper_completed");
    }

    #[tokio::test]
    async fn test_emit_without_handlers_is_noop() {
        let bus = EventBus::default();
        bus.emit(Event::RebuildCompleted {
            registered: 0,
            skipped: 0,
            failures: 0,
            at: at(),
        })
        .await;
        assert_eq!(bus.handler_count().await, 0);
    }

    #[test]
    fn test_event_accessors() {
        let event = Event::CheckinRecorded {
            user_id: UserId::new(9),
            session_id: SessionId::new(3),
            kind: CheckinKind::SixHours,
            status: CheckinStatus::Help,
            at: at(),
        };
        assert_eq!(event.user_id(), Some(UserId::new(9)));
        assert_eq!(event.timestamp(), at());
        assert_eq!(event.name(), "checkin_done");

        let fired = Event::JobFired {
            job_id: JobId::new("morning:1"),
            fire_id: FireId::new(),
            scheduled_for: at(),
            at: at(),
        };
        assert_eq!(fired.user_id(), None);
    }
}
