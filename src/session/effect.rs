//! Side effects requested by a transition.
//!
//! Effects are data. The orchestrator runs them in order after the transition
//! has been computed; some of them produce a follow-up [`Input`](super::Input).

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::collaborators::{DumpAnalysis, OutboundMessage};
use crate::core::local_time::LocalTime;
use crate::core::models::{
    CheckinKind, CheckinStatus, EveningStatus, FocusChoice, FocusOption, Sphere, Tone, User,
};
use crate::core::types::{SessionId, TodoId};
use crate::events::Event;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver a message to the user.
    Send(OutboundMessage),
    /// Record an analytics event.
    Emit(Event),

    /// Run the analysis engine. Follow-up: `AnalysisReady` or `AnalysisFailed`.
    Analyze { text: String },
    /// Store the dump for today. Follow-up: `DumpStored`.
    StoreDump {
        text: String,
        via_voice: bool,
        analysis: Box<DumpAnalysis>,
    },
    SelectFocus {
        session_id: SessionId,
        choice: FocusChoice,
        option: FocusOption,
    },
    /// Follow-up: `FocusAccepted`.
    AcceptFocus { session_id: SessionId, energy: u8 },
    ScheduleCheckins {
        session_id: SessionId,
        accepted_at: DateTime<Utc>,
    },
    /// Register, or clear, the evening chain of a session.
    ScheduleEvening { session_id: SessionId },
    /// Follow-up: `CarryOversAttached`.
    AttachCarryOvers { session_id: SessionId },
    /// Follow-up: `TodosSaved`.
    SaveTodos {
        session_id: SessionId,
        lines: Vec<String>,
    },
    /// Follow-up: `CheckinRecorded`.
    RecordCheckin {
        session_id: SessionId,
        kind: CheckinKind,
        status: CheckinStatus,
    },
    SaveEveningReport {
        session_id: SessionId,
        status: EveningStatus,
        text: String,
    },
    /// Follow-up: `DeeperReady` or `DeeperFailed`.
    RequestDeeper { session_id: SessionId },
    /// Follow-up: `TodoCompleted`.
    CompleteTodo { todo_id: TodoId },
    /// Follow-up: `TodoCarried`.
    CarryTodo { todo_id: TodoId, date: NaiveDate },
    UpdateUser(UserPatch),
    /// Re-register or cancel the recurring morning prompt from the stored user.
    RegisterMorning,
}

/// A single change to a user's profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserPatch {
    Spheres(Vec<Sphere>),
    WeeklyFocus(String),
    MonthlyFocus(String),
    Tone(Tone),
    MorningTime(Option<LocalTime>),
    EveningTime(Option<LocalTime>),
    Timezone(Tz),
    CompleteOnboarding,
}

impl UserPatch {
    pub fn apply(&self, user: &mut User) {
        match self {
            UserPatch::Spheres(spheres) => user.spheres = spheres.clone(),
            UserPatch::WeeklyFocus(text) => user.weekly_focus = Some(text.clone()),
            UserPatch::MonthlyFocus(text) => user.monthly_focus = Some(text.clone()),
            UserPatch::Tone(tone) => user.tone = *tone,
            UserPatch::MorningTime(time) => user.morning_time = *time,
            UserPatch::EveningTime(time) => user.evening_time = *time,
            UserPatch::Timezone(tz) => user.timezone = *tz,
            UserPatch::CompleteOnboarding => user.onboarded = true,
        }
    }
}
