//! What the conversation tells the user.
//!
//! A [`Notice`] names the message and carries its data; wording and layout
//! belong to the messaging channel. The `Display` form is a plain English
//! rendering used by the logging channel and in tests.

use chrono::NaiveDate;
use std::fmt;

use super::command::SettingKey;
use crate::collaborators::DumpAnalysis;
use crate::core::models::{CheckinKind, CheckinStatus, EveningStatus, Sphere, TodoItem};

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Welcome,
    MainMenu,
    AskSpheres { selected: Vec<Sphere> },
    TooFewSpheres { min: usize },
    AskWeeklyFocus,
    AskMonthlyFocus,
    AskTone,
    AskMorningTime,
    AskEveningTime,
    AskTimezone,
    FocusTooShort { min: usize },
    InvalidTime,
    InvalidTimezone { value: String },
    OnboardingDone,

    AskDump,
    DumpTooShort { min: usize },
    Analyzing,
    StillAnalyzing,
    AnalysisFailed,
    AnalysisSummary(Box<DumpAnalysis>),
    ChooseOption,
    AlreadyHaveFocus { focus: Option<String> },
    AskEnergy { suggested: u8 },
    FocusLocked {
        focus: String,
        step: String,
        plan_b: String,
        energy: u8,
    },
    TodayFocus {
        focus: String,
        step: String,
        plan_b: String,
        energy: Option<u8>,
    },
    NoFocusYet,

    AskTodos { carried: Vec<String> },
    TodosEmpty,
    TodoList { items: Vec<TodoItem> },
    TodosSkipped,
    TodoDone { text: String },
    TodoCarried { text: String, date: NaiveDate },
    TodoAlreadyResolved,
    ConfirmVoice { text: String },
    TypeInstead,

    CheckinPrompt {
        kind: CheckinKind,
        focus: Option<String>,
    },
    CheckinThanks { status: CheckinStatus },
    EveningPrompt { attempt: u8 },
    AskEveningReflection { status: EveningStatus },
    DayClosed { status: EveningStatus },

    DeeperThinking,
    DeeperReflection { text: String },
    DeeperAcknowledged,
    DeeperClosed,
    DeeperFailed,

    MorningPrompt,
    MorningLater,

    SettingsMenu,
    SettingSaved(SettingKey),

    NotFound,
    TranscriptionFailed,
    ServiceUnavailable,
    SomethingWentWrong,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Welcome => f.write_str("Hi! Let's set up your daily loop."),
            Notice::MainMenu => f.write_str("What would you like to do?"),
            Notice::AskSpheres { selected } if selected.is_empty() => {
                f.write_str("Pick the areas of life that matter to you now, then press done.")
            }
            Notice::AskSpheres { selected } => {
                let names: Vec<_> = selected.iter().map(Sphere::as_str).collect();
                write!(f, "Selected: {}. Press done when ready.", names.join(", "))
            }
            Notice::TooFewSpheres { min } => write!(f, "Pick at least {} areas.", min),
            Notice::AskWeeklyFocus => f.write_str("What is your focus for this week?"),
            Notice::AskMonthlyFocus => f.write_str("What is your focus for this month?"),
            Notice::AskTone => f.write_str("How should I talk to you?"),
            Notice::AskMorningTime => f.write_str("When should I ping you in the morning?"),
            Notice::AskEveningTime => f.write_str("When should we close the day?"),
            Notice::AskTimezone => f.write_str("Send your timezone, e.g. Europe/Moscow."),
            Notice::FocusTooShort { min } => {
                write!(f, "Please write at least {} characters.", min)
            }
            Notice::InvalidTime => f.write_str("Please send the time as HH:MM."),
            Notice::InvalidTimezone { value } => write!(f, "'{}' is not a known timezone.", value),
            Notice::OnboardingDone => f.write_str("All set. See you in the morning!"),
            Notice::AskDump => f.write_str("Dump everything that is on your mind."),
            Notice::DumpTooShort { min } => {
                write!(f, "That's a bit short. Write at least {} characters.", min)
            }
            Notice::Analyzing => f.write_str("Thinking it over..."),
            Notice::StillAnalyzing => f.write_str("Still working on your dump."),
            Notice::AnalysisFailed => f.write_str("I couldn't analyze that. Please try again."),
            Notice::AnalysisSummary(analysis) => write!(
                f,
                "{}\n\nA: {}\nB: {}",
                analysis.emotion_mirror, analysis.option_a.focus, analysis.option_b.focus
            ),
            Notice::ChooseOption => f.write_str("Pick option A or B."),
            Notice::AlreadyHaveFocus { focus } => match focus {
                Some(focus) => write!(f, "You already have a focus for today: {}", focus),
                None => f.write_str("You already have a focus for today."),
            },
            Notice::AskEnergy { suggested } => {
                write!(f, "How much energy do you have? (suggested: {})", suggested)
            }
            Notice::FocusLocked {
                focus,
                step,
                plan_b,
                energy,
            } => write!(
                f,
                "Focus: {}\nFirst step: {}\nPlan B: {}\nEnergy: {}",
                focus, step, plan_b, energy
            ),
            Notice::TodayFocus {
                focus,
                step,
                plan_b,
                energy,
            } => {
                write!(f, "Focus: {}\nFirst step: {}\nPlan B: {}", focus, step, plan_b)?;
                if let Some(energy) = energy {
                    write!(f, "\nEnergy: {}", energy)?;
                }
                Ok(())
            }
            Notice::NoFocusYet => f.write_str("No focus for today yet."),
            Notice::AskTodos { carried } => {
                f.write_str("Any small todos for today? Separate them with commas.")?;
                for text in carried {
                    write!(f, "\n(carried) {}", text)?;
                }
                Ok(())
            }
            Notice::TodosEmpty => f.write_str("I couldn't find any items there."),
            Notice::TodoList { items } => {
                f.write_str("Today's todos:")?;
                for item in items {
                    write!(f, "\n- {}", item.text)?;
                }
                Ok(())
            }
            Notice::TodosSkipped => f.write_str("No todos today. Good luck with the focus!"),
            Notice::TodoDone { text } => write!(f, "Done: {}", text),
            Notice::TodoCarried { text, date } => write!(f, "Moved to {}: {}", date, text),
            Notice::TodoAlreadyResolved => f.write_str("That item is already closed."),
            Notice::ConfirmVoice { text } => write!(f, "\"{}\"\n\nIs that right?", text),
            Notice::TypeInstead => f.write_str("Type the corrected version."),
            Notice::CheckinPrompt { kind, focus } => {
                let hours = match kind {
                    CheckinKind::ThreeHours => 3,
                    CheckinKind::SixHours => 6,
                };
                write!(f, "{} hours since you started. How is it going?", hours)?;
                if let Some(focus) = focus {
                    write!(f, "\nFocus: {}", focus)?;
                }
                Ok(())
            }
            Notice::CheckinThanks { status } => write!(f, "Noted: {}.", status.as_str()),
            Notice::EveningPrompt { attempt } => match attempt {
                1 => f.write_str("Time to close the day. How did it go?"),
                2 => f.write_str("Reminder: close the day while it's fresh."),
                _ => f.write_str("Last reminder: close the day!"),
            },
            Notice::AskEveningReflection { .. } => f.write_str(
                "What did you do? What helped or got in the way? First step tomorrow?",
            ),
            Notice::DayClosed { status } => write!(f, "Day closed ({}). Rest well.", status.as_str()),
            Notice::DeeperThinking => f.write_str("Digging deeper..."),
            Notice::DeeperReflection { text } => {
                write!(f, "{}\n\nReply with your thoughts, or say 'done' to finish.", text)
            }
            Notice::DeeperAcknowledged => {
                f.write_str("I hear you. Keep going, or say 'done' when you're ready.")
            }
            Notice::DeeperClosed => f.write_str("Thanks for being honest with yourself."),
            Notice::DeeperFailed => f.write_str("Couldn't start the deeper session. Try later."),
            Notice::MorningPrompt => f.write_str("Good morning! Ready for a dump?"),
            Notice::MorningLater => f.write_str("Okay, come back when you're ready."),
            Notice::SettingsMenu => f.write_str("What would you like to change?"),
            Notice::SettingSaved(key) => write!(f, "Saved {}.", key.as_str()),
            Notice::NotFound => f.write_str("That item was not found."),
            Notice::TranscriptionFailed => f.write_str("I couldn't hear that. Please type it."),
            Notice::ServiceUnavailable => f.write_str("Something is unavailable. Try again shortly."),
            Notice::SomethingWentWrong => f.write_str("Something went wrong. Please try again."),
        }
    }
}
