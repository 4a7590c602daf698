//! YAML configuration parsing.

use chrono_tz::Tz;
use std::path::Path;

use super::error::ConfigError;
use super::types::{CoachConfig, StorageConfig};

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load and validate configuration from a file.
    pub fn load_config(path: impl AsRef<Path>) -> Result<CoachConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse_config(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse_config(yaml: &str) -> Result<CoachConfig, ConfigError> {
        let config: CoachConfig = serde_yaml::from_str(yaml)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration.
    pub fn validate(config: &CoachConfig) -> Result<(), ConfigError> {
        if config.default_timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "unknown timezone '{}'",
                config.default_timezone
            )));
        }

        if config.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "scheduler.tick_interval_ms cannot be zero".into(),
            ));
        }

        if let StorageConfig::Sqlite { path } = &config.storage {
            if path.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "storage.path cannot be empty".into(),
                ));
            }
        }

        let limits = &config.dialogue;
        for (name, value) in [
            ("min_dump_chars", limits.min_dump_chars),
            ("min_focus_chars", limits.min_focus_chars),
            ("max_todo_items", limits.max_todo_items),
            ("min_spheres", limits.min_spheres),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "dialogue.{} must be positive",
                    name
                )));
            }
        }

        Ok(())
    }
}
