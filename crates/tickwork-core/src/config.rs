//! Tickwork configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TickworkError};

/// Largest accepted UTC offset, in minutes (exclusive).
const MAX_OFFSET_MINUTES: i32 = 24 * 60;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickworkConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TickworkConfig {
    /// Load config from the default path (~/.tickwork/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TickworkError::config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TickworkError::config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(TickworkError::config("scheduler.tick_interval_ms must be > 0"));
        }
        if let Some(offset) = self.scheduler.utc_offset_minutes
            && offset.abs() >= MAX_OFFSET_MINUTES
        {
            return Err(TickworkError::config(format!(
                "scheduler.utc_offset_minutes out of range: {offset}"
            )));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Tickwork home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tickwork")
    }
}

/// What `register` does when a task id is already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Overwrite the existing entry, keeping its registration position.
    #[default]
    Replace,
    /// Fail with `TickworkError::DuplicateTask`.
    Reject,
}

/// Scheduler engine and driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Driver cadence in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Run the driver on the caller's task instead of in the background.
    #[serde(default = "bool_true")]
    pub blocking: bool,
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
    /// Canonical offset for daily (`at`) tasks. `None` means UTC.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

fn default_tick_interval_ms() -> u64 { 1000 }
fn bool_true() -> bool { true }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            blocking: bool_true(),
            on_duplicate: DuplicatePolicy::default(),
            utc_offset_minutes: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TickworkConfig::default();
        assert_eq!(config.scheduler.tick_interval_ms, 1000);
        assert!(config.scheduler.blocking);
        assert_eq!(config.scheduler.on_duplicate, DuplicatePolicy::Replace);
        assert!(config.scheduler.utc_offset_minutes.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [scheduler]
            tick_interval_ms = 250
            blocking = false
            on_duplicate = "reject"
            utc_offset_minutes = 540

            [logging]
            level = "debug"
        "#;

        let config: TickworkConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, 250);
        assert!(!config.scheduler.blocking);
        assert_eq!(config.scheduler.on_duplicate, DuplicatePolicy::Reject);
        assert_eq!(config.scheduler.utc_offset_minutes, Some(540));
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: TickworkConfig = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.tick_interval_ms, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = TickworkConfig::default();
        config.scheduler.tick_interval_ms = 0;
        assert!(matches!(config.validate(), Err(TickworkError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_offset() {
        let mut config = TickworkConfig::default();
        config.scheduler.utc_offset_minutes = Some(-24 * 60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = TickworkConfig::default();
        config.scheduler.on_duplicate = DuplicatePolicy::Reject;
        config.save_to(&path).unwrap();

        let loaded = TickworkConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scheduler.on_duplicate, DuplicatePolicy::Reject);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scheduler\ntick_interval_ms = ").unwrap();
        assert!(matches!(
            TickworkConfig::load_from(&path),
            Err(TickworkError::Toml(_))
        ));
    }

    #[test]
    fn test_home_dir() {
        assert!(TickworkConfig::home_dir().ends_with(".tickwork"));
        assert!(TickworkConfig::default_path().ends_with("config.toml"));
    }
}
