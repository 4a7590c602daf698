//! Collaborators that need no external service.
//!
//! The binary runs with these when no transport or model is wired in: messages
//! go to the log, analysis is a plain heuristic and voice is refused.

use async_trait::async_trait;

use super::{
    AnalysisContext, AnalysisEngine, AudioRef, CollaboratorError, DeliveryOutcome, DumpAnalysis,
    MessagingChannel, OutboundMessage, Transcriber,
};
use crate::core::models::FocusOption;
use crate::todos::parse_todo_lines;

/// Writes every outbound message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingChannel;

#[async_trait]
impl MessagingChannel for LoggingChannel {
    async fn send(
        &self,
        external_id: i64,
        message: OutboundMessage,
    ) -> Result<DeliveryOutcome, CollaboratorError> {
        tracing::info!(
            external_id,
            interactivity = ?message.interactivity,
            "Message: {}",
            message.notice
        );
        Ok(DeliveryOutcome::Delivered)
    }
}

/// Proposes the first items of the dump as the day's focus options.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAnalysis;

impl OfflineAnalysis {
    fn option(task: &str) -> FocusOption {
        FocusOption {
            focus: task.to_string(),
            step: format!("Spend 30-45 minutes on: {}", task),
            plan_b: format!("Spend 10 minutes on: {}", task),
        }
    }
}

#[async_trait]
impl AnalysisEngine for OfflineAnalysis {
    async fn analyze(
        &self,
        text: &str,
        context: &AnalysisContext,
    ) -> Result<DumpAnalysis, CollaboratorError> {
        let tasks = parse_todo_lines(&text.replace(['.', ';'], "\n"), DumpAnalysis::MAX_TASKS);
        let Some(first) = tasks.first() else {
            return Err(CollaboratorError::Analysis("nothing to analyze".into()));
        };
        let second = tasks.get(1).unwrap_or(first);

        let focus_mapping = match &context.weekly_focus {
            Some(weekly) => format!("Weekly focus: {}", weekly),
            None => String::new(),
        };

        Ok(DumpAnalysis {
            emotion_mirror: String::new(),
            need_meaning: String::new(),
            option_a: Self::option(first),
            option_b: Self::option(second),
            tasks: tasks.clone(),
            focus_mapping,
            suggested_energy: DumpAnalysis::DEFAULT_ENERGY,
            go_deeper: false,
        })
    }

    async fn go_deeper(
        &self,
        dump_text: &str,
        _emotion_mirror: &str,
        _context: &AnalysisContext,
    ) -> Result<String, CollaboratorError> {
        Ok(format!(
            "Looking at what you wrote: \"{}\". What matters most about it to you today?",
            dump_text.trim()
        ))
    }
}

/// Refuses voice input.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableTranscriber;

#[async_trait]
impl Transcriber for UnavailableTranscriber {
    async fn transcribe(&self, _audio: &AudioRef) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Transcription(
            "no transcription service configured".into(),
        ))
    }
}
