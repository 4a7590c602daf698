//! The pure transition function.
//!
//! `transition` never fails and never touches storage or the network. An input
//! that makes no sense in the current state leaves the state unchanged and
//! re-sends that state's prompt.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::command::{
    CallbackCommand, ENERGY_LEVELS, MorningAnswer, SettingKey, TodoAction, VoiceTarget,
};
use super::effect::{Effect, UserPatch};
use super::event::{Input, MenuAction};
use super::notice::Notice;
use super::state::{
    CheckinContext, ConversationState, DeeperContext, DumpDraft, EnergyConfirmation, EveningDraft,
    FocusProposal, SphereSelection, TodoEntry,
};
use crate::collaborators::OutboundMessage;
use crate::config::DialogueLimits;
use crate::core::local_time::LocalTime;
use crate::core::models::{
    CheckinStatus, DailySession, DumpOutcome, EveningStatus, FocusChoice, Sphere, Tone, TodoItem,
    User,
};
use crate::core::types::SessionId;
use crate::events::Event;
use crate::todos::parse_todo_lines;

/// Words that end a go-deeper conversation.
pub const DEEPER_STOP_WORDS: [&str; 5] = ["готово", "done", "хватит", "стоп", "stop"];

const MORNING_PRESETS: [(u32, u32); 6] = [(7, 0), (8, 0), (9, 0), (10, 0), (11, 0), (12, 0)];
const EVENING_PRESETS: [(u32, u32); 6] = [(18, 0), (19, 0), (20, 0), (21, 0), (22, 0), (23, 0)];

/// Read-only facts a transition may depend on.
pub struct TransitionContext<'a> {
    pub user: &'a User,
    /// The user's session for their local today, if one exists.
    pub today: Option<&'a DailySession>,
    pub now: DateTime<Utc>,
    pub limits: &'a DialogueLimits,
}

impl TransitionContext<'_> {
    fn accepted_today(&self) -> Option<&DailySession> {
        self.today.filter(|s| s.is_accepted())
    }
}

/// Next state plus the effects to run, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: ConversationState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: ConversationState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }

    fn noop(state: ConversationState) -> Self {
        Self {
            next: state,
            effects: Vec::new(),
        }
    }
}

/// Compute the next state and effects for `input` in `state`.
pub fn transition(
    state: ConversationState,
    input: Input,
    ctx: &TransitionContext<'_>,
) -> Transition {
    use ConversationState as S;

    match (state, input) {
        // Valid from every state.
        (_, Input::Start) => start(ctx),
        (state, Input::Menu(_)) if !ctx.user.onboarded => resume_onboarding(state, ctx),
        (state, Input::Menu(action)) => menu(state, action, ctx),
        (state, Input::MorningDue) => Transition::to(
            state,
            vec![send_choices(
                Notice::MorningPrompt,
                vec![
                    CallbackCommand::Morning(MorningAnswer::DumpNow),
                    CallbackCommand::Morning(MorningAnswer::Later),
                ],
            )],
        ),
        (state, Input::CheckinDue {
            session_id,
            kind,
            focus,
        }) => {
            let prompt = send_choices(
                Notice::CheckinPrompt { kind, focus },
                CheckinStatus::ALL
                    .iter()
                    .map(|&status| CallbackCommand::Checkin {
                        session_id,
                        kind,
                        status,
                    })
                    .collect(),
            );
            let next = match state {
                S::Idle => S::AwaitingCheckinResponse(CheckinContext { session_id, kind }),
                other => other,
            };
            Transition::to(next, vec![prompt])
        }
        (state, Input::EveningDue {
            session_id,
            attempt,
        }) => Transition::to(
            state,
            vec![send_choices(
                Notice::EveningPrompt { attempt },
                EveningStatus::ALL
                    .iter()
                    .map(|&status| CallbackCommand::Evening { session_id, status })
                    .collect(),
            )],
        ),
        (state, Input::Command(CallbackCommand::Checkin {
            session_id,
            kind,
            status,
        })) => Transition::to(
            state,
            vec![Effect::RecordCheckin {
                session_id,
                kind,
                status,
            }],
        ),
        (state, Input::CheckinRecorded {
            session_id,
            kind,
            status,
            pending,
        }) => {
            let next = match state {
                S::AwaitingCheckinResponse(_) => S::Idle,
                other => other,
            };
            let mut effects = vec![
                Effect::Emit(Event::CheckinRecorded {
                    user_id: ctx.user.id,
                    session_id,
                    kind,
                    status,
                    at: ctx.now,
                }),
                Effect::Send(OutboundMessage::new(Notice::CheckinThanks { status })),
            ];
            if !pending.is_empty() {
                effects.push(todo_list(pending));
            }
            Transition::to(next, effects)
        }
        (_, Input::Command(CallbackCommand::Evening { session_id, status })) => Transition::to(
            S::AwaitingEveningReport(EveningDraft {
                session_id,
                status,
                pending_voice: None,
            }),
            vec![send(Notice::AskEveningReflection { status })],
        ),
        (_, Input::Command(CallbackCommand::Deeper { session_id })) => Transition::to(
            S::InDeeperSession(DeeperContext { session_id }),
            vec![
                Effect::Emit(Event::GoDeeperStarted {
                    user_id: ctx.user.id,
                    session_id,
                    at: ctx.now,
                }),
                send(Notice::DeeperThinking),
                Effect::RequestDeeper { session_id },
            ],
        ),
        (state, Input::Command(CallbackCommand::Todo { todo_id, action })) => {
            let effect = match action {
                TodoAction::Done => Effect::CompleteTodo { todo_id },
                TodoAction::CarryToTomorrow => Effect::CarryTodo {
                    todo_id,
                    date: tomorrow(ctx),
                },
            };
            Transition::to(state, vec![effect])
        }
        (state, Input::TodoCompleted(item)) => Transition::to(
            state,
            vec![
                Effect::Emit(Event::TodoCompleted {
                    user_id: ctx.user.id,
                    todo_id: item.id,
                    at: ctx.now,
                }),
                send(Notice::TodoDone { text: item.text }),
            ],
        ),
        (state, Input::TodoCarried { from, to }) => Transition::to(
            state,
            vec![
                Effect::Emit(Event::TodoCarried {
                    user_id: ctx.user.id,
                    from: from.id,
                    to: to.id,
                    at: ctx.now,
                }),
                send(Notice::TodoCarried {
                    text: to.text,
                    date: to.date_local,
                }),
            ],
        ),
        (state, Input::Command(CallbackCommand::Morning(answer))) if ctx.user.onboarded => {
            match answer {
                MorningAnswer::DumpNow => begin_dump(ctx),
                MorningAnswer::Later => Transition::to(state, vec![send(Notice::MorningLater)]),
            }
        }
        (_, Input::Command(CallbackCommand::Setting(key))) if ctx.user.onboarded => {
            Transition::to(S::EditingSetting(key), vec![setting_prompt(key)])
        }

        // Onboarding
        (S::ChoosingSpheres(mut selection), Input::Command(CallbackCommand::ToggleSphere(sphere))) => {
            selection.toggle(sphere);
            let prompt = spheres_prompt(&selection);
            Transition::to(S::ChoosingSpheres(selection), vec![prompt])
        }
        (S::ChoosingSpheres(selection), Input::Command(CallbackCommand::SpheresDone)) => {
            let min = ctx.limits.min_spheres;
            if selection.selected.len() < min {
                return Transition::to(
                    S::ChoosingSpheres(selection),
                    vec![send(Notice::TooFewSpheres { min })],
                );
            }
            Transition::to(
                S::EnteringWeeklyFocus,
                vec![
                    Effect::UpdateUser(UserPatch::Spheres(selection.to_vec())),
                    send(Notice::AskWeeklyFocus),
                ],
            )
        }
        (S::EnteringWeeklyFocus, Input::Text { body, .. }) => {
            focus_text(S::EnteringWeeklyFocus, body, ctx, |text| {
                (
                    UserPatch::WeeklyFocus(text),
                    S::EnteringMonthlyFocus,
                    send(Notice::AskMonthlyFocus),
                )
            })
        }
        (S::EnteringMonthlyFocus, Input::Text { body, .. }) => {
            focus_text(S::EnteringMonthlyFocus, body, ctx, |text| {
                (UserPatch::MonthlyFocus(text), S::ChoosingTone, tone_prompt())
            })
        }
        (S::ChoosingTone, Input::Command(CallbackCommand::Tone(tone))) => Transition::to(
            S::ChoosingMorningTime,
            vec![
                Effect::UpdateUser(UserPatch::Tone(tone)),
                time_prompt(Notice::AskMorningTime, &MORNING_PRESETS, CallbackCommand::MorningTime, false),
            ],
        ),
        (S::ChoosingMorningTime, input) => match morning_time_input(&input) {
            Some(Ok(time)) => Transition::to(
                S::ChoosingEveningTime,
                vec![
                    Effect::UpdateUser(UserPatch::MorningTime(time)),
                    time_prompt(Notice::AskEveningTime, &EVENING_PRESETS, CallbackCommand::EveningTime, false),
                ],
            ),
            Some(Err(())) => Transition::to(S::ChoosingMorningTime, vec![send(Notice::InvalidTime)]),
            None => reprompt(S::ChoosingMorningTime, input, ctx),
        },
        (S::ChoosingEveningTime, input) => match evening_time_input(&input) {
            Some(Ok(time)) => Transition::to(
                S::Idle,
                vec![
                    Effect::UpdateUser(UserPatch::EveningTime(time)),
                    Effect::UpdateUser(UserPatch::CompleteOnboarding),
                    Effect::RegisterMorning,
                    Effect::Emit(Event::OnboardingComplete {
                        user_id: ctx.user.id,
                        at: ctx.now,
                    }),
                    Effect::Send(OutboundMessage::with_menu(Notice::OnboardingDone)),
                ],
            ),
            Some(Err(())) => Transition::to(S::ChoosingEveningTime, vec![send(Notice::InvalidTime)]),
            None => reprompt(S::ChoosingEveningTime, input, ctx),
        },

        // Capture
        (S::Idle | S::AwaitingCheckinResponse(_), Input::Text { body, via_voice }) => {
            if ctx.user.onboarded {
                capture_dump(body, via_voice, ctx)
            } else {
                resume_onboarding(S::Idle, ctx)
            }
        }
        (S::AwaitingDump, Input::Text { body, via_voice }) => capture_dump(body, via_voice, ctx),
        (S::AnalyzingDump(draft), Input::AnalysisReady(analysis)) => {
            let effect = Effect::StoreDump {
                text: draft.text.clone(),
                via_voice: draft.via_voice,
                analysis,
            };
            Transition::to(S::AnalyzingDump(draft), vec![effect])
        }
        (S::AnalyzingDump(_), Input::AnalysisFailed) => {
            Transition::to(S::AwaitingDump, vec![send(Notice::AnalysisFailed)])
        }
        (S::AnalyzingDump(draft), Input::DumpStored { outcome, analysis }) => match outcome {
            DumpOutcome::AlreadyAccepted(session) => already_have_focus(&session),
            DumpOutcome::Created(session) | DumpOutcome::Reused(session) => {
                let summary = send_choices(
                    Notice::AnalysisSummary(analysis.clone()),
                    vec![
                        CallbackCommand::Focus(FocusChoice::A),
                        CallbackCommand::Focus(FocusChoice::B),
                    ],
                );
                Transition::to(
                    S::ChoosingFocusOption(FocusProposal {
                        session_id: session.id,
                        analysis: *analysis,
                    }),
                    vec![
                        Effect::Emit(Event::DumpCreated {
                            user_id: ctx.user.id,
                            session_id: session.id,
                            via_voice: draft.via_voice,
                            at: ctx.now,
                        }),
                        summary,
                    ],
                )
            }
        },
        (S::ChoosingFocusOption(proposal), Input::Command(CallbackCommand::Focus(choice))) => {
            let option = proposal.analysis.option(choice).clone();
            let suggested = proposal.analysis.suggested_energy;
            Transition::to(
                S::ConfirmingEnergy(EnergyConfirmation {
                    session_id: proposal.session_id,
                    suggested,
                    offer_deeper: proposal.analysis.go_deeper,
                }),
                vec![
                    Effect::SelectFocus {
                        session_id: proposal.session_id,
                        choice,
                        option,
                    },
                    Effect::Emit(Event::FocusSelected {
                        user_id: ctx.user.id,
                        session_id: proposal.session_id,
                        choice,
                        at: ctx.now,
                    }),
                    energy_prompt(suggested),
                ],
            )
        }
        (S::ConfirmingEnergy(confirm), Input::Command(CallbackCommand::Energy(energy))) => {
            if !ENERGY_LEVELS.contains(&energy) {
                let suggested = confirm.suggested;
                return Transition::to(
                    S::ConfirmingEnergy(confirm),
                    vec![energy_prompt(suggested)],
                );
            }
            Transition::to(
                S::ConfirmingEnergy(confirm),
                vec![Effect::AcceptFocus {
                    session_id: confirm.session_id,
                    energy,
                }],
            )
        }
        (S::ConfirmingEnergy(confirm), Input::FocusAccepted(session)) => {
            focus_accepted(confirm, session, ctx)
        }

        // Todo entry
        (S::EnteringTodos(entry), Input::CarryOversAttached(items)) => {
            let carried = items.into_iter().map(|item| item.text).collect();
            Transition::to(S::EnteringTodos(entry), vec![todos_prompt(carried)])
        }
        (S::EnteringTodos(entry), Input::Text { body, via_voice }) => {
            let lines = parse_todo_lines(&body, ctx.limits.max_todo_items);
            if lines.is_empty() {
                return Transition::to(S::EnteringTodos(entry), vec![send(Notice::TodosEmpty)]);
            }
            if via_voice {
                return Transition::to(
                    S::EnteringTodos(TodoEntry {
                        session_id: entry.session_id,
                        pending_voice: Some(lines),
                    }),
                    vec![voice_confirmation(body, VoiceTarget::Todos)],
                );
            }
            let session_id = entry.session_id;
            Transition::to(
                S::EnteringTodos(entry),
                vec![Effect::SaveTodos { session_id, lines }],
            )
        }
        (
            S::EnteringTodos(TodoEntry {
                session_id,
                pending_voice: Some(lines),
            }),
            Input::Command(CallbackCommand::ConfirmVoice(VoiceTarget::Todos)),
        ) => Transition::to(
            S::EnteringTodos(TodoEntry {
                session_id,
                pending_voice: None,
            }),
            vec![Effect::SaveTodos { session_id, lines }],
        ),
        (S::EnteringTodos(entry), Input::Command(CallbackCommand::EditVoice(VoiceTarget::Todos))) => {
            Transition::to(
                S::EnteringTodos(TodoEntry {
                    session_id: entry.session_id,
                    pending_voice: None,
                }),
                vec![send(Notice::TypeInstead)],
            )
        }
        (S::EnteringTodos(_), Input::Command(CallbackCommand::SkipTodos)) => Transition::to(
            S::Idle,
            vec![Effect::Send(OutboundMessage::with_menu(Notice::TodosSkipped))],
        ),
        (S::EnteringTodos(_), Input::TodosSaved(items)) => {
            Transition::to(S::Idle, vec![todo_list(items)])
        }

        // Evening report
        (S::AwaitingEveningReport(draft), Input::Text { body, via_voice }) => {
            let text = body.trim().to_string();
            if text.is_empty() {
                let status = draft.status;
                return Transition::to(
                    S::AwaitingEveningReport(draft),
                    vec![send(Notice::AskEveningReflection { status })],
                );
            }
            if via_voice {
                return Transition::to(
                    S::AwaitingEveningReport(EveningDraft {
                        pending_voice: Some(text.clone()),
                        ..draft
                    }),
                    vec![voice_confirmation(text, VoiceTarget::Evening)],
                );
            }
            close_day(draft.session_id, draft.status, text, ctx)
        }
        (
            S::AwaitingEveningReport(EveningDraft {
                session_id,
                status,
                pending_voice: Some(text),
            }),
            Input::Command(CallbackCommand::ConfirmVoice(VoiceTarget::Evening)),
        ) => close_day(session_id, status, text, ctx),
        (
            S::AwaitingEveningReport(draft),
            Input::Command(CallbackCommand::EditVoice(VoiceTarget::Evening)),
        ) => {
            let status = draft.status;
            Transition::to(
                S::AwaitingEveningReport(EveningDraft {
                    pending_voice: None,
                    ..draft
                }),
                vec![send(Notice::AskEveningReflection { status })],
            )
        }

        // Go deeper
        (S::InDeeperSession(deeper), Input::DeeperReady(text)) => Transition::to(
            S::InDeeperSession(deeper),
            vec![send(Notice::DeeperReflection { text })],
        ),
        (S::InDeeperSession(_), Input::DeeperFailed) => Transition::to(
            S::Idle,
            vec![Effect::Send(OutboundMessage::with_menu(Notice::DeeperFailed))],
        ),
        (S::InDeeperSession(deeper), Input::Text { body, .. }) => {
            let word = body.trim().to_lowercase();
            if DEEPER_STOP_WORDS.contains(&word.as_str()) {
                Transition::to(
                    S::Idle,
                    vec![
                        Effect::Emit(Event::GoDeeperCompleted {
                            user_id: ctx.user.id,
                            at: ctx.now,
                        }),
                        Effect::Send(OutboundMessage::with_menu(Notice::DeeperClosed)),
                    ],
                )
            } else {
                Transition::to(
                    S::InDeeperSession(deeper),
                    vec![send(Notice::DeeperAcknowledged)],
                )
            }
        }

        // Settings
        (S::EditingSetting(key), input) => edit_setting(key, input, ctx),

        // Results arriving after the flow moved on need no reaction.
        (state, input) if input.is_internal() => Transition::noop(state),
        (state, input) => reprompt(state, input, ctx),
    }
}

fn send(notice: Notice) -> Effect {
    Effect::Send(OutboundMessage::new(notice))
}

fn send_choices(notice: Notice, choices: Vec<CallbackCommand>) -> Effect {
    Effect::Send(OutboundMessage::with_choices(notice, choices))
}

fn tomorrow(ctx: &TransitionContext<'_>) -> chrono::NaiveDate {
    let today = ctx.user.local_today(ctx.now);
    today.succ_opt().unwrap_or(today)
}

fn tone_prompt() -> Effect {
    send_choices(
        Notice::AskTone,
        Tone::ALL.iter().map(|&tone| CallbackCommand::Tone(tone)).collect(),
    )
}

fn time_prompt(
    notice: Notice,
    presets: &[(u32, u32)],
    command: fn(Option<LocalTime>) -> CallbackCommand,
    allow_off: bool,
) -> Effect {
    let mut choices: Vec<CallbackCommand> = presets
        .iter()
        .filter_map(|&(h, m)| LocalTime::new(h, m).ok())
        .map(|time| command(Some(time)))
        .collect();
    if allow_off {
        choices.push(command(None));
    }
    send_choices(notice, choices)
}

fn spheres_prompt(selection: &SphereSelection) -> Effect {
    let mut choices: Vec<_> = Sphere::ALL
        .into_iter()
        .map(CallbackCommand::ToggleSphere)
        .collect();
    choices.push(CallbackCommand::SpheresDone);
    send_choices(
        Notice::AskSpheres {
            selected: selection.to_vec(),
        },
        choices,
    )
}

fn energy_prompt(suggested: u8) -> Effect {
    send_choices(
        Notice::AskEnergy { suggested },
        ENERGY_LEVELS.map(CallbackCommand::Energy).collect(),
    )
}

fn todos_prompt(carried: Vec<String>) -> Effect {
    send_choices(Notice::AskTodos { carried }, vec![CallbackCommand::SkipTodos])
}

fn todo_list(items: Vec<TodoItem>) -> Effect {
    let choices = items
        .iter()
        .flat_map(|item| {
            [
                CallbackCommand::Todo {
                    todo_id: item.id,
                    action: TodoAction::Done,
                },
                CallbackCommand::Todo {
                    todo_id: item.id,
                    action: TodoAction::CarryToTomorrow,
                },
            ]
        })
        .collect();
    send_choices(Notice::TodoList { items }, choices)
}

fn voice_confirmation(text: String, target: VoiceTarget) -> Effect {
    send_choices(
        Notice::ConfirmVoice { text },
        vec![
            CallbackCommand::ConfirmVoice(target),
            CallbackCommand::EditVoice(target),
        ],
    )
}

fn setting_prompt(key: SettingKey) -> Effect {
    match key {
        SettingKey::WeeklyFocus => send(Notice::AskWeeklyFocus),
        SettingKey::MonthlyFocus => send(Notice::AskMonthlyFocus),
        SettingKey::Tone => tone_prompt(),
        SettingKey::MorningTime => time_prompt(
            Notice::AskMorningTime,
            &MORNING_PRESETS,
            CallbackCommand::MorningTime,
            true,
        ),
        SettingKey::EveningTime => time_prompt(
            Notice::AskEveningTime,
            &EVENING_PRESETS,
            CallbackCommand::EveningTime,
            true,
        ),
        SettingKey::Timezone => send(Notice::AskTimezone),
    }
}

/// The prompt that tells the user what `state` expects.
fn state_prompt(state: &ConversationState) -> Effect {
    use ConversationState as S;
    match state {
        S::Idle | S::AwaitingCheckinResponse(_) => {
            Effect::Send(OutboundMessage::with_menu(Notice::MainMenu))
        }
        S::ChoosingSpheres(selection) => spheres_prompt(selection),
        S::EnteringWeeklyFocus => send(Notice::AskWeeklyFocus),
        S::EnteringMonthlyFocus => send(Notice::AskMonthlyFocus),
        S::ChoosingTone => tone_prompt(),
        S::ChoosingMorningTime => time_prompt(
            Notice::AskMorningTime,
            &MORNING_PRESETS,
            CallbackCommand::MorningTime,
            false,
        ),
        S::ChoosingEveningTime => time_prompt(
            Notice::AskEveningTime,
            &EVENING_PRESETS,
            CallbackCommand::EveningTime,
            false,
        ),
        S::AwaitingDump => send(Notice::AskDump),
        S::AnalyzingDump(_) => send(Notice::StillAnalyzing),
        S::ChoosingFocusOption(_) => send_choices(
            Notice::ChooseOption,
            vec![
                CallbackCommand::Focus(FocusChoice::A),
                CallbackCommand::Focus(FocusChoice::B),
            ],
        ),
        S::ConfirmingEnergy(confirm) => energy_prompt(confirm.suggested),
        S::EnteringTodos(_) => todos_prompt(Vec::new()),
        S::AwaitingEveningReport(draft) => send(Notice::AskEveningReflection {
            status: draft.status,
        }),
        S::InDeeperSession(_) => send(Notice::DeeperAcknowledged),
        S::EditingSetting(key) => setting_prompt(*key),
    }
}

fn reprompt(state: ConversationState, input: Input, ctx: &TransitionContext<'_>) -> Transition {
    if !ctx.user.onboarded && !state.is_onboarding() {
        return resume_onboarding(state, ctx);
    }
    tracing::debug!(
        user_id = %ctx.user.id,
        state = state.name(),
        input = input.name(),
        "Input not valid in state, re-prompting"
    );
    let prompt = state_prompt(&state);
    Transition::to(state, vec![prompt])
}

fn start(ctx: &TransitionContext<'_>) -> Transition {
    let event = Effect::Emit(Event::Start {
        user_id: ctx.user.id,
        at: ctx.now,
    });
    if !ctx.user.onboarded {
        let mut resumed = resume_onboarding(ConversationState::Idle, ctx);
        resumed.effects.insert(0, event);
        resumed.effects.insert(1, send(Notice::Welcome));
        return resumed;
    }
    Transition::to(
        ConversationState::Idle,
        vec![event, Effect::Send(OutboundMessage::with_menu(Notice::MainMenu))],
    )
}

/// Send a user who has not finished onboarding to the first missing step.
fn resume_onboarding(state: ConversationState, ctx: &TransitionContext<'_>) -> Transition {
    use ConversationState as S;
    if state.is_onboarding() {
        let prompt = state_prompt(&state);
        return Transition::to(state, vec![prompt]);
    }
    let user = ctx.user;
    let next = if user.spheres.len() < ctx.limits.min_spheres {
        S::ChoosingSpheres(SphereSelection {
            selected: user.spheres.iter().copied().collect(),
        })
    } else if user.weekly_focus.is_none() {
        S::EnteringWeeklyFocus
    } else if user.monthly_focus.is_none() {
        S::EnteringMonthlyFocus
    } else if user.morning_time.is_none() {
        S::ChoosingTone
    } else {
        S::ChoosingEveningTime
    };
    let prompt = state_prompt(&next);
    Transition::to(next, vec![prompt])
}

fn menu(state: ConversationState, action: MenuAction, ctx: &TransitionContext<'_>) -> Transition {
    match action {
        MenuAction::StartDump => begin_dump(ctx),
        MenuAction::ShowFocus => {
            let notice = match ctx.accepted_today() {
                Some(session) => Notice::TodayFocus {
                    focus: session.focus_text.clone().unwrap_or_default(),
                    step: session.step_text.clone().unwrap_or_default(),
                    plan_b: session.plan_b_text.clone().unwrap_or_default(),
                    energy: session.energy,
                },
                None => Notice::NoFocusYet,
            };
            Transition::to(state, vec![send(notice)])
        }
        MenuAction::Settings => Transition::to(
            ConversationState::Idle,
            vec![send_choices(
                Notice::SettingsMenu,
                SettingKey::ALL
                    .iter()
                    .map(|&key| CallbackCommand::Setting(key))
                    .collect(),
            )],
        ),
    }
}

fn already_have_focus(session: &DailySession) -> Transition {
    Transition::to(
        ConversationState::Idle,
        vec![Effect::Send(OutboundMessage::with_menu(
            Notice::AlreadyHaveFocus {
                focus: session.focus_text.clone(),
            },
        ))],
    )
}

/// Enter the capture flow unless today's focus is already accepted.
fn begin_dump(ctx: &TransitionContext<'_>) -> Transition {
    if let Some(session) = ctx.accepted_today() {
        return already_have_focus(session);
    }
    Transition::to(ConversationState::AwaitingDump, vec![send(Notice::AskDump)])
}

fn capture_dump(body: String, via_voice: bool, ctx: &TransitionContext<'_>) -> Transition {
    if let Some(session) = ctx.accepted_today() {
        return already_have_focus(session);
    }
    let text = body.trim().to_string();
    if text.chars().count() < ctx.limits.min_dump_chars {
        return Transition::to(
            ConversationState::AwaitingDump,
            vec![send(Notice::DumpTooShort {
                min: ctx.limits.min_dump_chars,
            })],
        );
    }
    Transition::to(
        ConversationState::AnalyzingDump(DumpDraft {
            text: text.clone(),
            via_voice,
        }),
        vec![send(Notice::Analyzing), Effect::Analyze { text }],
    )
}

fn focus_accepted(
    confirm: EnergyConfirmation,
    session: DailySession,
    ctx: &TransitionContext<'_>,
) -> Transition {
    let session_id = session.id;
    let energy = session.energy.unwrap_or(confirm.suggested);
    let locked = Notice::FocusLocked {
        focus: session.focus_text.clone().unwrap_or_default(),
        step: session.step_text.clone().unwrap_or_default(),
        plan_b: session.plan_b_text.clone().unwrap_or_default(),
        energy,
    };
    let locked = if confirm.offer_deeper {
        send_choices(locked, vec![CallbackCommand::Deeper { session_id }])
    } else {
        send(locked)
    };

    Transition::to(
        ConversationState::EnteringTodos(TodoEntry {
            session_id,
            pending_voice: None,
        }),
        vec![
            Effect::ScheduleCheckins {
                session_id,
                accepted_at: session.accepted_at.unwrap_or(ctx.now),
            },
            Effect::ScheduleEvening { session_id },
            Effect::Emit(Event::FocusAccepted {
                user_id: ctx.user.id,
                session_id,
                energy,
                at: ctx.now,
            }),
            locked,
            Effect::AttachCarryOvers { session_id },
        ],
    )
}

fn close_day(
    session_id: SessionId,
    status: EveningStatus,
    text: String,
    ctx: &TransitionContext<'_>,
) -> Transition {
    Transition::to(
        ConversationState::Idle,
        vec![
            Effect::SaveEveningReport {
                session_id,
                status,
                text,
            },
            Effect::Emit(Event::EveningReportDone {
                user_id: ctx.user.id,
                session_id,
                status,
                at: ctx.now,
            }),
            Effect::Send(OutboundMessage::with_menu(Notice::DayClosed { status })),
        ],
    )
}

/// Validate a weekly or monthly focus and move on.
fn focus_text(
    state: ConversationState,
    body: String,
    ctx: &TransitionContext<'_>,
    on_valid: impl FnOnce(String) -> (UserPatch, ConversationState, Effect),
) -> Transition {
    let text = body.trim().to_string();
    let min = ctx.limits.min_focus_chars;
    if text.chars().count() < min {
        return Transition::to(state, vec![send(Notice::FocusTooShort { min })]);
    }
    let (patch, next, prompt) = on_valid(text);
    Transition::to(next, vec![Effect::UpdateUser(patch), prompt])
}

/// A morning time from a button or typed `HH:MM`.
fn morning_time_input(input: &Input) -> Option<Result<Option<LocalTime>, ()>> {
    match input {
        Input::Command(CallbackCommand::MorningTime(time)) => Some(Ok(*time)),
        Input::Text { body, .. } => Some(body.parse::<LocalTime>().map(Some).map_err(|_| ())),
        _ => None,
    }
}

/// An evening time from a button or typed `HH:MM`.
fn evening_time_input(input: &Input) -> Option<Result<Option<LocalTime>, ()>> {
    match input {
        Input::Command(CallbackCommand::EveningTime(time)) => Some(Ok(*time)),
        Input::Text { body, .. } => Some(body.parse::<LocalTime>().map(Some).map_err(|_| ())),
        _ => None,
    }
}

fn setting_saved(key: SettingKey, mut effects: Vec<Effect>) -> Transition {
    effects.push(Effect::Send(OutboundMessage::with_menu(Notice::SettingSaved(key))));
    Transition::to(ConversationState::Idle, effects)
}

fn edit_setting(key: SettingKey, input: Input, ctx: &TransitionContext<'_>) -> Transition {
    let state = ConversationState::EditingSetting(key);
    match key {
        SettingKey::WeeklyFocus | SettingKey::MonthlyFocus => match input {
            Input::Text { body, .. } => {
                let text = body.trim().to_string();
                let min = ctx.limits.min_focus_chars;
                if text.chars().count() < min {
                    return Transition::to(state, vec![send(Notice::FocusTooShort { min })]);
                }
                let patch = if key == SettingKey::WeeklyFocus {
                    UserPatch::WeeklyFocus(text)
                } else {
                    UserPatch::MonthlyFocus(text)
                };
                setting_saved(key, vec![Effect::UpdateUser(patch)])
            }
            other => reprompt(state, other, ctx),
        },
        SettingKey::Tone => match input {
            Input::Command(CallbackCommand::Tone(tone)) => {
                setting_saved(key, vec![Effect::UpdateUser(UserPatch::Tone(tone))])
            }
            other => reprompt(state, other, ctx),
        },
        SettingKey::MorningTime => match morning_time_input(&input) {
            Some(Ok(time)) => setting_saved(
                key,
                vec![
                    Effect::UpdateUser(UserPatch::MorningTime(time)),
                    Effect::RegisterMorning,
                ],
            ),
            Some(Err(())) => Transition::to(state, vec![send(Notice::InvalidTime)]),
            None => reprompt(state, input, ctx),
        },
        SettingKey::EveningTime => match evening_time_input(&input) {
            Some(Ok(time)) => {
                let mut effects = vec![Effect::UpdateUser(UserPatch::EveningTime(time))];
                if let Some(session) = ctx.accepted_today() {
                    effects.push(Effect::ScheduleEvening {
                        session_id: session.id,
                    });
                }
                setting_saved(key, effects)
            }
            Some(Err(())) => Transition::to(state, vec![send(Notice::InvalidTime)]),
            None => reprompt(state, input, ctx),
        },
        SettingKey::Timezone => match input {
            Input::Text { body, .. } => {
                let value = body.trim().to_string();
                match value.parse::<Tz>() {
                    Ok(tz) => setting_saved(
                        key,
                        vec![
                            Effect::UpdateUser(UserPatch::Timezone(tz)),
                            Effect::RegisterMorning,
                        ],
                    ),
                    Err(_) => Transition::to(state, vec![send(Notice::InvalidTimezone { value })]),
                }
            }
            other => reprompt(state, other, ctx),
        },
    }
}
