//! Inputs to the state machine.

use crate::collaborators::{AudioRef, DumpAnalysis};
use crate::core::models::{CheckinKind, CheckinStatus, DailySession, DumpOutcome, TodoItem};
use crate::core::types::SessionId;

use super::command::{CallbackCommand, CommandParseError};

/// Entries of the persistent main menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
    StartDump,
    ShowFocus,
    Settings,
}

/// An event received from a user through the messaging channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Start,
    Text(String),
    Voice(AudioRef),
    Command(CallbackCommand),
    Menu(MenuAction),
}

impl InboundEvent {
    /// Decode a raw callback token.
    pub fn callback(token: &str) -> Result<Self, CommandParseError> {
        token.parse().map(InboundEvent::Command)
    }

    pub fn text(body: impl Into<String>) -> Self {
        InboundEvent::Text(body.into())
    }
}

/// Everything the state machine reacts to.
///
/// User inputs arrive through [`InboundEvent`]; scheduler fires and effect
/// results are fed back in by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Start,
    Text { body: String, via_voice: bool },
    Command(CallbackCommand),
    Menu(MenuAction),

    // Scheduler fires
    MorningDue,
    CheckinDue {
        session_id: SessionId,
        kind: CheckinKind,
        focus: Option<String>,
    },
    EveningDue {
        session_id: SessionId,
        attempt: u8,
    },

    // Effect results
    AnalysisReady(Box<DumpAnalysis>),
    AnalysisFailed,
    DumpStored {
        outcome: DumpOutcome,
        analysis: Box<DumpAnalysis>,
    },
    FocusAccepted(DailySession),
    CarryOversAttached(Vec<TodoItem>),
    TodosSaved(Vec<TodoItem>),
    CheckinRecorded {
        session_id: SessionId,
        kind: CheckinKind,
        status: CheckinStatus,
        pending: Vec<TodoItem>,
    },
    DeeperReady(String),
    DeeperFailed,
    TodoCompleted(TodoItem),
    TodoCarried { from: TodoItem, to: TodoItem },
}

impl Input {
    /// Whether this input is produced by the orchestrator rather than the user.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            Input::Start | Input::Text { .. } | Input::Command(_) | Input::Menu(_)
        )
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Input::Start => "start",
            Input::Text { .. } => "text",
            Input::Command(_) => "command",
            Input::Menu(_) => "menu",
            Input::MorningDue => "morning_due",
            Input::CheckinDue { .. } => "checkin_due",
            Input::EveningDue { .. } => "evening_due",
            Input::AnalysisReady(_) => "analysis_ready",
            Input::AnalysisFailed => "analysis_failed",
            Input::DumpStored { .. } => "dump_stored",
            Input::FocusAccepted(_) => "focus_accepted",
            Input::CarryOversAttached(_) => "carry_overs_attached",
            Input::TodosSaved(_) => "todos_saved",
            Input::CheckinRecorded { .. } => "checkin_recorded",
            Input::DeeperReady(_) => "deeper_ready",
            Input::DeeperFailed => "deeper_failed",
            Input::TodoCompleted(_) => "todo_completed",
            Input::TodoCarried { .. } => "todo_carried",
        }
    }
}
