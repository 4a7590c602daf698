//! Daily coaching loop.
//!
//! A per-user conversation state machine drives a morning brain dump, focus
//! selection, timed check-ins and an evening report. Timed prompts are
//! registered with an in-process [`Scheduler`] whose job identities are
//! derived from domain data, so [`RebuildManager`] can re-register every
//! pending job after a restart without duplicates.

pub mod coach;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod recovery;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod testing;
pub mod timing;
pub mod todos;

pub use coach::Coach;
pub use config::{CoachConfig, ConfigError, DialogueLimits, StorageConfig, YamlLoader};
pub use core::clock::{Clock, SystemClock};
pub use core::local_time::LocalTime;
pub use core::models::{
    CheckinKind, CheckinStatus, DailySession, EveningStatus, FocusChoice, Sphere, TodoItem,
    TodoStatus, Tone, User,
};
pub use core::types::{FireId, JobId, SessionId, TodoId, UserId};
pub use error::{CoachError, Missing, RecoveryError};
pub use events::{Event, EventBus, EventHandler};
pub use recovery::{RebuildManager, RebuildReport};
pub use scheduler::{
    DispatchError, FiredJob, JobDispatcher, JobPayload, JobScheduler, JobSpec, Scheduler,
    SchedulerError, SchedulerHandle, TriggerSpec,
};
pub use session::{ConversationState, InboundEvent, Notice};
#[cfg(any(feature = "sqlite", test))]
pub use storage::SqliteStorage;
pub use storage::{InMemoryStorage, Storage, StorageError};
pub use todos::TodoResolver;
