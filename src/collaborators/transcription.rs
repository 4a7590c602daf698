//! Transcription interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::CollaboratorError;

/// Reference to a voice message held by the messaging channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    pub file_id: String,
    pub duration_secs: Option<u32>,
}

impl AudioRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            duration_secs: None,
        }
    }
}

/// Converts audio to text. No retry is attempted by callers.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioRef) -> Result<String, CollaboratorError>;
}
