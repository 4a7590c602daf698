//! Entity model for users, daily sessions, check-ins, evening reports and todos.
//!
//! Rows are owned by storage. These types are plain data plus the few
//! invariant-preserving mutations (acceptance, focus selection) shared by every
//! storage backend.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::local_time::LocalTime;
use super::types::{SessionId, TodoId, UserId};

/// Error returned when a stored or encoded enum value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Conversational tone requested by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Soft,
    Strict,
}

impl Tone {
    pub const ALL: [Tone; 3] = [Tone::Neutral, Tone::Soft, Tone::Strict];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Neutral => "neutral",
            Tone::Soft => "soft",
            Tone::Strict => "strict",
        }
    }
}

impl FromStr for Tone {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neutral" => Ok(Tone::Neutral),
            "soft" => Ok(Tone::Soft),
            "strict" => Ok(Tone::Strict),
            other => Err(UnknownVariant::new("tone", other)),
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A life area the user cares about. Picked during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sphere {
    Work,
    Health,
    Relationships,
    Learning,
    Finance,
    Creativity,
    Home,
    Spirituality,
}

impl Sphere {
    pub const ALL: [Sphere; 8] = [
        Sphere::Work,
        Sphere::Health,
        Sphere::Relationships,
        Sphere::Learning,
        Sphere::Finance,
        Sphere::Creativity,
        Sphere::Home,
        Sphere::Spirituality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sphere::Work => "work",
            Sphere::Health => "health",
            Sphere::Relationships => "relationships",
            Sphere::Learning => "learning",
            Sphere::Finance => "finance",
            Sphere::Creativity => "creativity",
            Sphere::Home => "home",
            Sphere::Spirituality => "spirituality",
        }
    }

    /// Comma-separated storage form.
    pub fn join(spheres: &[Sphere]) -> String {
        spheres
            .iter()
            .map(Sphere::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the storage form written by [`Sphere::join`].
    pub fn split(value: &str) -> Result<Vec<Sphere>, UnknownVariant> {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for Sphere {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sphere::ALL
            .into_iter()
            .find(|sphere| sphere.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("sphere", s))
    }
}

impl fmt::Display for Sphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An end user of the coaching loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Identifier used by the messaging channel.
    pub external_id: i64,
    pub timezone: Tz,
    pub tone: Tone,
    /// Life areas picked during onboarding, in [`Sphere::ALL`] order.
    pub spheres: Vec<Sphere>,
    pub morning_time: Option<LocalTime>,
    pub evening_time: Option<LocalTime>,
    pub weekly_focus: Option<String>,
    pub monthly_focus: Option<String>,
    pub onboarded: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The user's local calendar date at `now`.
    pub fn local_today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Whether the recurring morning prompt applies to this user.
    pub fn wants_morning_prompt(&self) -> bool {
        self.onboarded && self.morning_time.is_some()
    }
}

/// Data for a user created on first contact.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub external_id: i64,
    pub timezone: Tz,
}

/// Which of the two analysis options the user picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FocusChoice {
    A,
    B,
}

impl FocusChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusChoice::A => "A",
            FocusChoice::B => "B",
        }
    }
}

impl FromStr for FocusChoice {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(FocusChoice::A),
            "B" | "b" => Ok(FocusChoice::B),
            other => Err(UnknownVariant::new("focus choice", other)),
        }
    }
}

/// One focus proposal: the focus itself, a first step and a fallback plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusOption {
    pub focus: String,
    pub step: String,
    pub plan_b: String,
}

/// One row per (user, local calendar date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySession {
    pub id: SessionId,
    pub user_id: UserId,
    pub date_local: NaiveDate,
    pub dump_text: String,
    pub via_voice: bool,
    /// Opaque analysis result, kept for auditing and go-deeper.
    pub analysis: Option<serde_json::Value>,
    pub focus_choice: Option<FocusChoice>,
    pub focus_text: Option<String>,
    pub step_text: Option<String>,
    pub plan_b_text: Option<String>,
    pub energy: Option<u8>,
    /// Anchor for check-in timing. Set at most once.
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailySession {
    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }

    /// Record the chosen focus option.
    pub fn select_focus(&mut self, choice: FocusChoice, option: &FocusOption, now: DateTime<Utc>) {
        self.focus_choice = Some(choice);
        self.focus_text = Some(option.focus.clone());
        self.step_text = Some(option.step.clone());
        self.plan_b_text = Some(option.plan_b.clone());
        self.updated_at = now;
    }

    /// Mark the session accepted with the given energy.
    ///
    /// Returns `false` when the session was already accepted; the original
    /// anchor is kept and only the energy is updated.
    pub fn accept(&mut self, energy: u8, at: DateTime<Utc>) -> bool {
        self.energy = Some(energy);
        self.updated_at = at;
        if self.accepted_at.is_some() {
            return false;
        }
        self.accepted_at = Some(at);
        true
    }

    /// Overwrite captured input on a session that was started but never accepted.
    pub(crate) fn overwrite_capture(&mut self, capture: &DumpCapture, now: DateTime<Utc>) {
        self.dump_text = capture.text.clone();
        self.via_voice = capture.via_voice;
        self.analysis = Some(capture.analysis.clone());
        self.focus_choice = None;
        self.focus_text = None;
        self.step_text = None;
        self.plan_b_text = None;
        self.energy = None;
        self.updated_at = now;
    }
}

/// Captured free-form input together with its analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpCapture {
    pub text: String,
    pub via_voice: bool,
    pub analysis: serde_json::Value,
}

/// Result of storing a dump for (user, date).
#[derive(Debug, Clone, PartialEq)]
pub enum DumpOutcome {
    /// No session existed; a new row was created.
    Created(DailySession),
    /// An unaccepted session existed and was overwritten.
    Reused(DailySession),
    /// The session for that day is already accepted; nothing was written.
    AlreadyAccepted(DailySession),
}

impl DumpOutcome {
    pub fn session(&self) -> &DailySession {
        match self {
            DumpOutcome::Created(s) | DumpOutcome::Reused(s) | DumpOutcome::AlreadyAccepted(s) => s,
        }
    }
}

/// Which of the two daily check-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CheckinKind {
    /// Three hours after acceptance.
    ThreeHours,
    /// Six hours after acceptance.
    SixHours,
}

impl CheckinKind {
    pub const ALL: [CheckinKind; 2] = [CheckinKind::ThreeHours, CheckinKind::SixHours];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckinKind::ThreeHours => "t3",
            CheckinKind::SixHours => "t6",
        }
    }

    /// Elapsed time between acceptance and this check-in.
    pub fn offset(&self) -> chrono::Duration {
        match self {
            CheckinKind::ThreeHours => chrono::Duration::hours(3),
            CheckinKind::SixHours => chrono::Duration::hours(6),
        }
    }
}

impl FromStr for CheckinKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "t3" => Ok(CheckinKind::ThreeHours),
            "t6" => Ok(CheckinKind::SixHours),
            other => Err(UnknownVariant::new("checkin kind", other)),
        }
    }
}

/// User's answer to a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckinStatus {
    Done,
    Progress,
    Moved,
    Help,
}

impl CheckinStatus {
    pub const ALL: [CheckinStatus; 4] = [
        CheckinStatus::Done,
        CheckinStatus::Progress,
        CheckinStatus::Moved,
        CheckinStatus::Help,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckinStatus::Done => "done",
            CheckinStatus::Progress => "progress",
            CheckinStatus::Moved => "moved",
            CheckinStatus::Help => "help",
        }
    }
}

impl FromStr for CheckinStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(CheckinStatus::Done),
            "progress" => Ok(CheckinStatus::Progress),
            "moved" => Ok(CheckinStatus::Moved),
            "help" => Ok(CheckinStatus::Help),
            other => Err(UnknownVariant::new("checkin status", other)),
        }
    }
}

/// A recorded check-in answer. Unique per (session, kind).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkin {
    pub session_id: SessionId,
    pub kind: CheckinKind,
    pub status: CheckinStatus,
    pub updated_at: DateTime<Utc>,
}

/// How the day went, as reported in the evening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EveningStatus {
    Done,
    Partial,
    Fail,
}

impl EveningStatus {
    pub const ALL: [EveningStatus; 3] =
        [EveningStatus::Done, EveningStatus::Partial, EveningStatus::Fail];

    pub fn as_str(&self) -> &'static str {
        match self {
            EveningStatus::Done => "done",
            EveningStatus::Partial => "partial",
            EveningStatus::Fail => "fail",
        }
    }
}

impl FromStr for EveningStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(EveningStatus::Done),
            "partial" => Ok(EveningStatus::Partial),
            "fail" => Ok(EveningStatus::Fail),
            other => Err(UnknownVariant::new("evening status", other)),
        }
    }
}

/// Closing report for a session. Unique per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EveningReport {
    pub session_id: SessionId,
    pub status: EveningStatus,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    Done,
    CarriedOver,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::Done => "done",
            TodoStatus::CarriedOver => "carried_over",
        }
    }
}

impl FromStr for TodoStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TodoStatus::Pending),
            "done" => Ok(TodoStatus::Done),
            "carried_over" => Ok(TodoStatus::CarriedOver),
            other => Err(UnknownVariant::new("todo status", other)),
        }
    }
}

/// A small task owned by a user, dated to a local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: TodoId,
    pub user_id: UserId,
    pub session_id: Option<SessionId>,
    pub date_local: NaiveDate,
    pub text: String,
    pub status: TodoStatus,
    /// The item this one was carried over from, if any.
    pub carried_from: Option<TodoId>,
    pub created_at: DateTime<Utc>,
}

/// Data for a todo item about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTodo {
    pub user_id: UserId,
    pub session_id: Option<SessionId>,
    pub date_local: NaiveDate,
    pub text: String,
    pub carried_from: Option<TodoId>,
}
