//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the coaching loop.

mod error;
mod types;
mod yaml;

pub use error::ConfigError;
pub use types::{CoachConfig, DialogueLimits, SchedulerConfig, StorageConfig};
pub use yaml::YamlLoader;
