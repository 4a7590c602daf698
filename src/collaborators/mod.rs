//! Services the coaching loop consumes but does not implement.
//!
//! The analysis engine, the transcriber and the messaging channel are traits
//! so the orchestrator can run against real services, the offline
//! implementations used by the binary, or the scripted ones in
//! [`crate::testing`].

mod analysis;
mod messaging;
mod offline;
mod transcription;

use thiserror::Error;

pub use analysis::{AnalysisContext, AnalysisEngine, DumpAnalysis};
pub use messaging::{DeliveryOutcome, Interactivity, MessagingChannel, OutboundMessage};
pub use offline::{LoggingChannel, OfflineAnalysis, UnavailableTranscriber};
pub use transcription::{AudioRef, Transcriber};

/// Errors reported by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The analysis engine failed or returned something unusable.
    #[error("analysis failed: {0}")]
    Analysis(String),

    /// Audio could not be transcribed.
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// The messaging channel could not deliver a message.
    #[error("delivery failed: {0}")]
    Delivery(String),
}
