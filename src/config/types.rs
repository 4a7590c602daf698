//! Configuration type definitions.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration (coachloop.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    /// IANA timezone given to users created on first contact.
    pub default_timezone: String,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub dialogue: DialogueLimits,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            default_timezone: "Europe/Moscow".to_string(),
            scheduler: SchedulerConfig::default(),
            storage: StorageConfig::default(),
            dialogue: DialogueLimits::default(),
        }
    }
}

impl CoachConfig {
    /// The default timezone, parsed. Call after validation.
    pub fn timezone(&self) -> Option<Tz> {
        self.default_timezone.parse().ok()
    }
}

/// Scheduler service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often due jobs are checked.
    pub tick_interval_ms: u64,
    /// How long shutdown waits for in-flight dispatches.
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            shutdown_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// In-memory storage (default, non-persistent).
    #[serde(rename = "memory")]
    #[default]
    Memory,
    /// SQLite storage.
    #[serde(rename = "sqlite")]
    Sqlite {
        /// Path to the database file.
        path: String,
    },
}

/// Input limits applied by the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueLimits {
    /// Minimum characters of a morning dump.
    pub min_dump_chars: usize,
    /// Minimum characters of a weekly or monthly focus.
    pub min_focus_chars: usize,
    /// Maximum todo lines kept from one entry.
    pub max_todo_items: usize,
    /// Minimum life areas picked during onboarding.
    pub min_spheres: usize,
}

impl Default for DialogueLimits {
    fn default() -> Self {
        Self {
            min_dump_chars: 10,
            min_focus_chars: 3,
            max_todo_items: 10,
            min_spheres: 3,
        }
    }
}
