//! Structured callback commands.
//!
//! Buttons carry short `kind:id:action` tokens. They are decoded once at the
//! inbound boundary into [`CallbackCommand`] and matched exhaustively from
//! there on.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

use crate::core::local_time::LocalTime;
use crate::core::models::{
    CheckinKind, CheckinStatus, EveningStatus, FocusChoice, Sphere, Tone,
};
use crate::core::types::{SessionId, TodoId};

/// Energy levels a user can confirm.
pub const ENERGY_LEVELS: RangeInclusive<u8> = 1..=5;

/// Errors that can occur when decoding a callback token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("empty callback token")]
    Empty,

    #[error("unknown callback kind '{0}'")]
    UnknownKind(String),

    #[error("malformed callback '{token}': {reason}")]
    Malformed { token: String, reason: String },
}

/// Action on a single todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TodoAction {
    Done,
    CarryToTomorrow,
}

/// Flow a voice confirmation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceTarget {
    Todos,
    Evening,
}

impl VoiceTarget {
    fn as_str(&self) -> &'static str {
        match self {
            VoiceTarget::Todos => "todos",
            VoiceTarget::Evening => "evening",
        }
    }
}

/// Answer to the morning prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MorningAnswer {
    DumpNow,
    Later,
}

/// A user setting that can be edited after onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    WeeklyFocus,
    MonthlyFocus,
    Tone,
    MorningTime,
    EveningTime,
    Timezone,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::WeeklyFocus,
        SettingKey::MonthlyFocus,
        SettingKey::Tone,
        SettingKey::MorningTime,
        SettingKey::EveningTime,
        SettingKey::Timezone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::WeeklyFocus => "weekly_focus",
            SettingKey::MonthlyFocus => "monthly_focus",
            SettingKey::Tone => "tone",
            SettingKey::MorningTime => "morning_time",
            SettingKey::EveningTime => "evening_time",
            SettingKey::Timezone => "timezone",
        }
    }
}

impl FromStr for SettingKey {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| CommandParseError::Malformed {
                token: s.to_string(),
                reason: "unknown setting".into(),
            })
    }
}

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackCommand {
    /// `sphere:health`
    ToggleSphere(Sphere),
    /// `spheres:done`
    SpheresDone,
    /// `focus:A`
    Focus(FocusChoice),
    /// `energy:4`
    Energy(u8),
    /// `checkin:12:t3:done`
    Checkin {
        session_id: SessionId,
        kind: CheckinKind,
        status: CheckinStatus,
    },
    /// `evening:12:partial`
    Evening {
        session_id: SessionId,
        status: EveningStatus,
    },
    /// `deeper:12`
    Deeper { session_id: SessionId },
    /// `todo:5:done`, `todo:5:carry`
    Todo { todo_id: TodoId, action: TodoAction },
    /// `todos:skip`
    SkipTodos,
    /// `vc_ok:todos`
    ConfirmVoice(VoiceTarget),
    /// `vc_edit:evening`
    EditVoice(VoiceTarget),
    /// `morning:dump`, `morning:later`
    Morning(MorningAnswer),
    /// `tone:soft`
    Tone(Tone),
    /// `morning_time:09:00`, `morning_time:off`
    MorningTime(Option<LocalTime>),
    /// `evening_time:21:00`, `evening_time:off`
    EveningTime(Option<LocalTime>),
    /// `set:timezone`
    Setting(SettingKey),
}

impl CallbackCommand {
    /// Encode as a callback token.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

fn malformed(token: &str, reason: impl Into<String>) -> CommandParseError {
    CommandParseError::Malformed {
        token: token.to_string(),
        reason: reason.into(),
    }
}

fn parse_field<T: FromStr>(token: &str, value: &str, what: &str) -> Result<T, CommandParseError> {
    value
        .parse()
        .map_err(|_| malformed(token, format!("invalid {} '{}'", what, value)))
}

fn parse_time(token: &str, value: &str) -> Result<Option<LocalTime>, CommandParseError> {
    if value == "off" {
        return Ok(None);
    }
    parse_field(token, value, "time").map(Some)
}

fn parse_voice_target(token: &str, value: &str) -> Result<VoiceTarget, CommandParseError> {
    match value {
        "todos" => Ok(VoiceTarget::Todos),
        "evening" => Ok(VoiceTarget::Evening),
        other => Err(malformed(token, format!("invalid voice target '{}'", other))),
    }
}

impl FromStr for CallbackCommand {
    type Err = CommandParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CommandParseError::Empty);
        }
        let (kind, rest) = token
            .split_once(':')
            .ok_or_else(|| malformed(token, "missing ':'"))?;
        let parts: Vec<&str> = rest.split(':').collect();

        match kind {
            "sphere" => Ok(CallbackCommand::ToggleSphere(parse_field(token, rest, "sphere")?)),
            "spheres" if rest == "done" => Ok(CallbackCommand::SpheresDone),
            "focus" => Ok(CallbackCommand::Focus(parse_field(token, rest, "focus option")?)),
            "energy" => {
                let energy: u8 = parse_field(token, rest, "energy")?;
                if !ENERGY_LEVELS.contains(&energy) {
                    return Err(malformed(token, "energy must be 1..=5"));
                }
                Ok(CallbackCommand::Energy(energy))
            }
            "checkin" => match parts.as_slice() {
                [session_id, kind, status] => Ok(CallbackCommand::Checkin {
                    session_id: parse_field(token, session_id, "session id")?,
                    kind: parse_field(token, kind, "checkin kind")?,
                    status: parse_field(token, status, "checkin status")?,
                }),
                _ => Err(malformed(token, "expected checkin:<session>:<kind>:<status>")),
            },
            "evening" => match parts.as_slice() {
                [session_id, status] => Ok(CallbackCommand::Evening {
                    session_id: parse_field(token, session_id, "session id")?,
                    status: parse_field(token, status, "evening status")?,
                }),
                _ => Err(malformed(token, "expected evening:<session>:<status>")),
            },
            "deeper" => Ok(CallbackCommand::Deeper {
                session_id: parse_field(token, rest, "session id")?,
            }),
            "todo" => match parts.as_slice() {
                [todo_id, action] => {
                    let action = match *action {
                        "done" => TodoAction::Done,
                        "carry" => TodoAction::CarryToTomorrow,
                        other => {
                            return Err(malformed(token, format!("invalid todo action '{}'", other)));
                        }
                    };
                    Ok(CallbackCommand::Todo {
                        todo_id: parse_field(token, todo_id, "todo id")?,
                        action,
                    })
                }
                _ => Err(malformed(token, "expected todo:<id>:<action>")),
            },
            "todos" if rest == "skip" => Ok(CallbackCommand::SkipTodos),
            "vc_ok" => Ok(CallbackCommand::ConfirmVoice(parse_voice_target(token, rest)?)),
            "vc_edit" => Ok(CallbackCommand::EditVoice(parse_voice_target(token, rest)?)),
            "morning" => match rest {
                "dump" => Ok(CallbackCommand::Morning(MorningAnswer::DumpNow)),
                "later" => Ok(CallbackCommand::Morning(MorningAnswer::Later)),
                other => Err(malformed(token, format!("invalid morning answer '{}'", other))),
            },
            "tone" => Ok(CallbackCommand::Tone(parse_field(token, rest, "tone")?)),
            "morning_time" => Ok(CallbackCommand::MorningTime(parse_time(token, rest)?)),
            "evening_time" => Ok(CallbackCommand::EveningTime(parse_time(token, rest)?)),
            "set" => Ok(CallbackCommand::Setting(rest.parse()?)),
            other => Err(CommandParseError::UnknownKind(other.to_string())),
        }
    }
}

fn fmt_time(time: &Option<LocalTime>) -> String {
    match time {
        Some(t) => t.to_string(),
        None => "off".to_string(),
    }
}

impl fmt::Display for CallbackCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackCommand::ToggleSphere(sphere) => write!(f, "sphere:{}", sphere.as_str()),
            CallbackCommand::SpheresDone => f.write_str("spheres:done"),
            CallbackCommand::Focus(choice) => write!(f, "focus:{}", choice.as_str()),
            CallbackCommand::Energy(energy) => write!(f, "energy:{}", energy),
            CallbackCommand::Checkin {
                session_id,
                kind,
                status,
            } => write!(
                f,
                "checkin:{}:{}:{}",
                session_id,
                kind.as_str(),
                status.as_str()
            ),
            CallbackCommand::Evening { session_id, status } => {
                write!(f, "evening:{}:{}", session_id, status.as_str())
            }
            CallbackCommand::Deeper { session_id } => write!(f, "deeper:{}", session_id),
            CallbackCommand::Todo { todo_id, action } => {
                let action = match action {
                    TodoAction::Done => "done",
                    TodoAction::CarryToTomorrow => "carry",
                };
                write!(f, "todo:{}:{}", todo_id, action)
            }
            CallbackCommand::SkipTodos => f.write_str("todos:skip"),
            CallbackCommand::ConfirmVoice(target) => write!(f, "vc_ok:{}", target.as_str()),
            CallbackCommand::EditVoice(target) => write!(f, "vc_edit:{}", target.as_str()),
            CallbackCommand::Morning(MorningAnswer::DumpNow) => f.write_str("morning:dump"),
            CallbackCommand::Morning(MorningAnswer::Later) => f.write_str("morning:later"),
            CallbackCommand::Tone(tone) => write!(f, "tone:{}", tone.as_str()),
            CallbackCommand::MorningTime(time) => write!(f, "morning_time:{}", fmt_time(time)),
            CallbackCommand::EveningTime(time) => write!(f, "evening_time:{}", fmt_time(time)),
            CallbackCommand::Setting(key) => write!(f, "set:{}", key.as_str()),
        }
    }
}
