//! Conversation states and their per-state context.

use std::collections::BTreeSet;

use crate::collaborators::DumpAnalysis;
use crate::core::models::{CheckinKind, EveningStatus, Sphere};
use crate::core::types::SessionId;

use super::command::SettingKey;

/// Where a user is in the conversation.
///
/// Each state carries only the data its transitions need.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConversationState {
    #[default]
    Idle,

    // Onboarding
    ChoosingSpheres(SphereSelection),
    EnteringWeeklyFocus,
    EnteringMonthlyFocus,
    ChoosingTone,
    ChoosingMorningTime,
    ChoosingEveningTime,

    // Morning capture
    AwaitingDump,
    AnalyzingDump(DumpDraft),
    ChoosingFocusOption(FocusProposal),
    ConfirmingEnergy(EnergyConfirmation),
    EnteringTodos(TodoEntry),

    // Reached from scheduler fires or buttons
    AwaitingCheckinResponse(CheckinContext),
    AwaitingEveningReport(EveningDraft),
    InDeeperSession(DeeperContext),

    EditingSetting(SettingKey),
}

/// Spheres toggled so far during onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SphereSelection {
    pub selected: BTreeSet<Sphere>,
}

impl SphereSelection {
    /// Select `sphere`, or deselect it if it was already selected.
    pub fn toggle(&mut self, sphere: Sphere) {
        if !self.selected.remove(&sphere) {
            self.selected.insert(sphere);
        }
    }

    pub fn to_vec(&self) -> Vec<Sphere> {
        self.selected.iter().copied().collect()
    }
}

/// Captured text waiting for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpDraft {
    pub text: String,
    pub via_voice: bool,
}

/// Analysis shown to the user while they pick an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusProposal {
    pub session_id: SessionId,
    pub analysis: DumpAnalysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyConfirmation {
    pub session_id: SessionId,
    pub suggested: u8,
    /// Offer a go-deeper session once the focus is accepted.
    pub offer_deeper: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoEntry {
    pub session_id: SessionId,
    /// Transcribed items waiting for confirmation.
    pub pending_voice: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckinContext {
    pub session_id: SessionId,
    pub kind: CheckinKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EveningDraft {
    pub session_id: SessionId,
    pub status: EveningStatus,
    /// Transcribed reflection waiting for confirmation.
    pub pending_voice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeeperContext {
    pub session_id: SessionId,
}

impl ConversationState {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::ChoosingSpheres(_) => "choosing_spheres",
            ConversationState::EnteringWeeklyFocus => "entering_weekly_focus",
            ConversationState::EnteringMonthlyFocus => "entering_monthly_focus",
            ConversationState::ChoosingTone => "choosing_tone",
            ConversationState::ChoosingMorningTime => "choosing_morning_time",
            ConversationState::ChoosingEveningTime => "choosing_evening_time",
            ConversationState::AwaitingDump => "awaiting_dump",
            ConversationState::AnalyzingDump(_) => "analyzing_dump",
            ConversationState::ChoosingFocusOption(_) => "choosing_focus_option",
            ConversationState::ConfirmingEnergy(_) => "confirming_energy",
            ConversationState::EnteringTodos(_) => "entering_todos",
            ConversationState::AwaitingCheckinResponse(_) => "awaiting_checkin_response",
            ConversationState::AwaitingEveningReport(_) => "awaiting_evening_report",
            ConversationState::InDeeperSession(_) => "in_deeper_session",
            ConversationState::EditingSetting(_) => "editing_setting",
        }
    }

    /// The session this state's context refers to, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ConversationState::ChoosingFocusOption(c) => Some(c.session_id),
            ConversationState::ConfirmingEnergy(c) => Some(c.session_id),
            ConversationState::EnteringTodos(c) => Some(c.session_id),
            ConversationState::AwaitingCheckinResponse(c) => Some(c.session_id),
            ConversationState::AwaitingEveningReport(c) => Some(c.session_id),
            ConversationState::InDeeperSession(c) => Some(c.session_id),
            _ => None,
        }
    }

    pub fn is_onboarding(&self) -> bool {
        matches!(
            self,
            ConversationState::ChoosingSpheres(_)
                | ConversationState::EnteringWeeklyFocus
                | ConversationState::EnteringMonthlyFocus
                | ConversationState::ChoosingTone
                | ConversationState::ChoosingMorningTime
                | ConversationState::ChoosingEveningTime
        )
    }
}
