//! Per-user conversation state machine.
//!
//! The machine is a pure function from `(state, input)` to the next state and a
//! list of [`Effect`]s. Everything that talks to storage, collaborators or the
//! scheduler lives in [`crate::coach`].

mod command;
mod effect;
mod event;
mod machine;
mod notice;
mod state;

pub use command::{
    CallbackCommand, CommandParseError, ENERGY_LEVELS, MorningAnswer, SettingKey, TodoAction,
    VoiceTarget,
};
pub use effect::{Effect, UserPatch};
pub use event::{InboundEvent, Input, MenuAction};
pub use machine::{DEEPER_STOP_WORDS, Transition, TransitionContext, transition};
pub use notice::Notice;
pub use state::{
    CheckinContext, ConversationState, DeeperContext, DumpDraft, EnergyConfirmation, EveningDraft,
    FocusProposal, SphereSelection, TodoEntry,
};
