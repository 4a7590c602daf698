//! Testing utilities for users of the coachloop library.
//!
//! This module provides deterministic stand-ins for the clock and the external
//! collaborators:
//!
//! - [`ManualClock`]: A clock that only moves when told to
//! - [`ScriptedAnalysis`]: An analysis engine that replays queued results
//! - [`ScriptedTranscriber`]: A transcriber with canned transcripts per file
//! - [`RecordingChannel`]: A messaging channel that keeps everything it sends
//! - [`RecordingHandler`]: An event handler that keeps every event

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collaborators::{
    AnalysisContext, AnalysisEngine, AudioRef, CollaboratorError, DeliveryOutcome, DumpAnalysis,
    MessagingChannel, OutboundMessage, Transcriber,
};
use crate::core::clock::Clock;
use crate::core::models::FocusOption;
use crate::events::{Event, EventHandler};
use crate::session::Notice;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A clock for tests.
///
/// # Example
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use coachloop::core::clock::Clock;
/// use coachloop::testing::ManualClock;
///
/// let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap());
/// clock.advance(Duration::hours(3));
/// assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// An analysis engine that replays queued results.
///
/// When the queue is empty, [`ScriptedAnalysis::sample`] is returned.
#[derive(Debug, Default)]
pub struct ScriptedAnalysis {
    results: Mutex<VecDeque<Result<DumpAnalysis, CollaboratorError>>>,
    reflections: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    analyzed: Mutex<Vec<(String, AnalysisContext)>>,
    latency: Mutex<Option<std::time::Duration>>,
}

impl ScriptedAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plausible analysis with two distinct options.
    pub fn sample() -> DumpAnalysis {
        DumpAnalysis {
            emotion_mirror: "You have a lot on your plate.".into(),
            need_meaning: "You want to feel in control.".into(),
            tasks: vec!["finish the report".into(), "go to the gym".into()],
            focus_mapping: "Moves the weekly goal forward.".into(),
            option_a: FocusOption {
                focus: "Finish the report".into(),
                step: "Write the outline".into(),
                plan_b: "Write one paragraph".into(),
            },
            option_b: FocusOption {
                focus: "Go to the gym".into(),
                step: "Pack the bag".into(),
                plan_b: "Take a walk".into(),
            },
            suggested_energy: 3,
            go_deeper: false,
        }
    }

    pub fn push_analysis(&self, analysis: DumpAnalysis) {
        lock(&self.results).push_back(Ok(analysis));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.results).push_back(Err(CollaboratorError::Analysis(message.into())));
    }

    pub fn push_reflection(&self, text: impl Into<String>) {
        lock(&self.reflections).push_back(Ok(text.into()));
    }

    pub fn push_reflection_failure(&self, message: impl Into<String>) {
        lock(&self.reflections).push_back(Err(CollaboratorError::Analysis(message.into())));
    }

    /// Make every analysis take `latency` before it answers.
    pub fn set_latency(&self, latency: std::time::Duration) {
        *lock(&self.latency) = Some(latency);
    }

    /// Texts analyzed so far, with the context they were analyzed in.
    pub fn analyzed(&self) -> Vec<(String, AnalysisContext)> {
        lock(&self.analyzed).clone()
    }
}

#[async_trait]
impl AnalysisEngine for ScriptedAnalysis {
    async fn analyze(
        &self,
        text: &str,
        context: &AnalysisContext,
    ) -> Result<DumpAnalysis, CollaboratorError> {
        lock(&self.analyzed).push((text.to_string(), context.clone()));
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| Ok(Self::sample()))
    }

    async fn go_deeper(
        &self,
        _dump_text: &str,
        _emotion_mirror: &str,
        _context: &AnalysisContext,
    ) -> Result<String, CollaboratorError> {
        lock(&self.reflections)
            .pop_front()
            .unwrap_or_else(|| Ok("What would make today feel like a win?".into()))
    }
}

/// A transcriber with one canned transcript per audio file id.
#[derive(Debug, Default)]
pub struct ScriptedTranscriber {
    transcripts: Mutex<HashMap<String, String>>,
}

impl ScriptedTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcript(self, file_id: impl Into<String>, text: impl Into<String>) -> Self {
        lock(&self.transcripts).insert(file_id.into(), text.into());
        self
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, audio: &AudioRef) -> Result<String, CollaboratorError> {
        lock(&self.transcripts)
            .get(&audio.file_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::Transcription(format!("no transcript for {}", audio.file_id)))
    }
}

/// A messaging channel that records every message.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(i64, OutboundMessage)>>,
    unreachable: AtomicBool,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every later message as undeliverable to a blocked user.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Fail every later send with a delivery error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All messages, in send order.
    pub fn messages(&self) -> Vec<(i64, OutboundMessage)> {
        lock(&self.sent).clone()
    }

    /// Notices of all messages, in send order.
    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.sent).iter().map(|(_, m)| m.notice.clone()).collect()
    }

    pub fn last(&self) -> Option<OutboundMessage> {
        lock(&self.sent).last().map(|(_, m)| m.clone())
    }

    pub fn clear(&self) {
        lock(&self.sent).clear();
    }
}

#[async_trait]
impl MessagingChannel for RecordingChannel {
    async fn send(
        &self,
        external_id: i64,
        message: OutboundMessage,
    ) -> Result<DeliveryOutcome, CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Delivery("channel down".into()));
        }
        lock(&self.sent).push((external_id, message));
        if self.unreachable.load(Ordering::SeqCst) {
            return Ok(DeliveryOutcome::Unreachable);
        }
        Ok(DeliveryOutcome::Delivered)
    }
}

/// An event handler that records every event.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Names of the recorded events, in order.
    pub async fn names(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(Event::name).collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
