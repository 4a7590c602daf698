//! Analysis engine interface and its result types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::CollaboratorError;
use crate::core::models::{FocusChoice, FocusOption, Sphere, Tone, User};

/// What the analysis engine knows about the user besides the dump itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisContext {
    pub tone: Tone,
    /// Life areas the user picked during onboarding.
    pub spheres: Vec<Sphere>,
    pub weekly_focus: Option<String>,
    pub monthly_focus: Option<String>,
}

impl AnalysisContext {
    pub fn for_user(user: &User) -> Self {
        Self {
            tone: user.tone,
            spheres: user.spheres.clone(),
            weekly_focus: user.weekly_focus.clone(),
            monthly_focus: user.monthly_focus.clone(),
        }
    }
}

/// Structured result of analyzing a dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpAnalysis {
    pub emotion_mirror: String,
    pub need_meaning: String,
    pub tasks: Vec<String>,
    pub focus_mapping: String,
    pub option_a: FocusOption,
    pub option_b: FocusOption,
    pub suggested_energy: u8,
    /// The engine thinks a go-deeper conversation would help.
    pub go_deeper: bool,
}

impl DumpAnalysis {
    pub const MAX_TASKS: usize = 7;
    pub const DEFAULT_ENERGY: u8 = 3;

    /// Clamp engine output to the ranges the conversation relies on.
    ///
    /// Energy outside 1..=5 falls back to the default and tasks beyond the
    /// limit are dropped.
    pub fn normalized(mut self) -> Self {
        if !(1..=5).contains(&self.suggested_energy) {
            self.suggested_energy = Self::DEFAULT_ENERGY;
        }
        self.tasks.truncate(Self::MAX_TASKS);
        self
    }

    pub fn option(&self, choice: FocusChoice) -> &FocusOption {
        match choice {
            FocusChoice::A => &self.option_a,
            FocusChoice::B => &self.option_b,
        }
    }

    /// JSON form stored with the session.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Turns free-form input into focus proposals.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn analyze(
        &self,
        text: &str,
        context: &AnalysisContext,
    ) -> Result<DumpAnalysis, CollaboratorError>;

    /// A deeper reflection on a stored dump.
    async fn go_deeper(
        &self,
        dump_text: &str,
        emotion_mirror: &str,
        context: &AnalysisContext,
    ) -> Result<String, CollaboratorError>;
}
