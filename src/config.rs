use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/persistence.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "PersistenceConfig::default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,
    #[serde(default = "PersistenceConfig::default_reminder_enabled")]
    pub reminder_enabled: bool,
    #[serde(default = "PersistenceConfig::default_reminder_check_interval_ms")]
    pub reminder_check_interval_ms: u64,
    #[serde(default = "PersistenceConfig::default_reminder_threshold_ms")]
    pub reminder_threshold_ms: u64,
    #[serde(default = "PersistenceConfig::default_project_name")]
    pub default_project_name: String,
    #[serde(default = "PersistenceConfig::default_scene_name")]
    pub default_scene_name: String,
    #[serde(default = "PersistenceConfig::default_preferences_path")]
    pub preferences_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceOverrides {
    pub watchdog_timeout_ms: Option<u64>,
    pub reminder_enabled: Option<bool>,
    pub preferences_path: Option<PathBuf>,
}

impl PersistenceConfig {
    const fn default_watchdog_timeout_ms() -> u64 {
        30_000
    }

    const fn default_reminder_enabled() -> bool {
        true
    }

    const fn default_reminder_check_interval_ms() -> u64 {
        60_000
    }

    const fn default_reminder_threshold_ms() -> u64 {
        600_000
    }

    fn default_project_name() -> String {
        "Untitled Project".to_string()
    }

    fn default_scene_name() -> String {
        "Main Scene".to_string()
    }

    fn default_preferences_path() -> PathBuf {
        PathBuf::from("config/preferences.json")
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn reminder_check_interval(&self) -> Duration {
        Duration::from_millis(self.reminder_check_interval_ms.max(1))
    }

    pub fn reminder_threshold(&self) -> Duration {
        Duration::from_millis(self.reminder_threshold_ms)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &PersistenceOverrides) {
        if let Some(timeout) = overrides.watchdog_timeout_ms {
            self.watchdog_timeout_ms = timeout;
        }
        if let Some(enabled) = overrides.reminder_enabled {
            self.reminder_enabled = enabled;
        }
        if let Some(path) = &overrides.preferences_path {
            self.preferences_path = path.clone();
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: Self::default_watchdog_timeout_ms(),
            reminder_enabled: Self::default_reminder_enabled(),
            reminder_check_interval_ms: Self::default_reminder_check_interval_ms(),
            reminder_threshold_ms: Self::default_reminder_threshold_ms(),
            default_project_name: Self::default_project_name(),
            default_scene_name: Self::default_scene_name(),
            preferences_path: Self::default_preferences_path(),
        }
    }
}

impl PersistenceOverrides {
    pub fn is_empty(&self) -> bool {
        self.watchdog_timeout_ms.is_none() && self.reminder_enabled.is_none() && self.preferences_path.is_none()
    }
}
