//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Default timer durations and repetition count
//! - Snapshot freshness window
//! - Notification preferences
//! - Remote persistence endpoint
//! - The last session setup, for form prefill
//!
//! Configuration is stored at `~/.config/studytimer/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::session::SessionConfig;

/// Default timer durations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerDefaults {
    #[serde(default = "default_action_min")]
    pub action_min: u32,
    #[serde(default = "default_break_min")]
    pub break_min: u32,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
}

/// Snapshot retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshots older than this many hours are discarded on load.
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: u32,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub sound: bool,
}

/// Remote persistence configuration.
///
/// When `base_url` is unset, sessions are recorded locally only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/studytimer/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerDefaults,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Most recently started session setup, used to prefill the next one.
    #[serde(default)]
    pub last_session: Option<SessionConfig>,
}

// Default functions
fn default_action_min() -> u32 {
    25
}
fn default_break_min() -> u32 {
    5
}
fn default_repetitions() -> u32 {
    4
}
fn default_freshness_hours() -> u32 {
    24
}
fn default_true() -> bool {
    true
}

impl Default for TimerDefaults {
    fn default() -> Self {
        Self {
            action_min: default_action_min(),
            break_min: default_break_min(),
            repetitions: default_repetitions(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            freshness_hours: default_freshness_hours(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timer: TimerDefaults::default(),
            snapshot: SnapshotConfig::default(),
            notifications: NotificationsConfig::default(),
            api: ApiConfig::default(),
            last_session: None,
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// A missing file is replaced with the written-out defaults; a
    /// present but unparseable file is an error rather than silently
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Record a session setup for prefilling the next one.
    pub fn remember_session(&mut self, session: &SessionConfig) -> Result<(), ConfigError> {
        self.last_session = Some(session.clone());
        self.save()
    }

    /// Snapshot freshness window in milliseconds.
    pub fn snapshot_max_age_ms(&self) -> u64 {
        self.snapshot.freshness_hours as u64 * 60 * 60 * 1000
    }

    /// Default session setup derived from the configured durations,
    /// overridden by the remembered last session when present.
    pub fn session_template(&self) -> SessionConfig {
        self.last_session.clone().unwrap_or_else(|| SessionConfig {
            subject: String::new(),
            lesson: String::new(),
            action_min: self.timer.action_min,
            break_min: self.timer.break_min,
            repetitions: self.timer.repetitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.timer.action_min, 25);
        assert_eq!(parsed.timer.break_min, 5);
        assert_eq!(parsed.timer.repetitions, 4);
        assert_eq!(parsed.snapshot.freshness_hours, 24);
        assert!(parsed.notifications.enabled);
        assert!(parsed.api.base_url.is_none());
    }

    #[test]
    fn partial_file_fills_missing_fields_with_defaults() {
        let parsed: Config = toml::from_str(
            "[timer]\n\
             action_min = 50\n",
        )
        .unwrap();
        assert_eq!(parsed.timer.action_min, 50);
        assert_eq!(parsed.timer.break_min, 5);
        assert_eq!(parsed.snapshot.freshness_hours, 24);
    }

    #[test]
    fn snapshot_window_converts_to_ms() {
        let mut cfg = Config::default();
        assert_eq!(cfg.snapshot_max_age_ms(), 24 * 60 * 60 * 1000);
        cfg.snapshot.freshness_hours = 1;
        assert_eq!(cfg.snapshot_max_age_ms(), 3_600_000);
    }

    #[test]
    fn session_template_prefers_last_session() {
        let mut cfg = Config::default();
        let template = cfg.session_template();
        assert_eq!(template.action_min, 25);
        assert!(template.subject.is_empty());

        cfg.last_session = Some(SessionConfig {
            subject: "History".into(),
            lesson: "Unit 3".into(),
            action_min: 50,
            break_min: 10,
            repetitions: 2,
        });
        let template = cfg.session_template();
        assert_eq!(template.subject, "History");
        assert_eq!(template.action_min, 50);
    }
}
