use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const RECENT_LIMIT: usize = 8;

/// Process-local convenience settings kept next to the editor, never inside an archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub last_opened: Option<PathBuf>,
    pub recent: Vec<PathBuf>,
    pub ui_collapse_state: BTreeMap<String, Value>,
}

impl Preferences {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read preferences {}", path.display()))?;
        let prefs = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse preferences {}", path.display()))?;
        Ok(prefs)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(prefs) => prefs,
            Err(err) => {
                log::warn!("[preferences] {err:?}. Starting with empty preferences.");
                Self::default()
            }
        }
    }

    pub fn store(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create preferences dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).with_context(|| format!("Failed to write preferences {}", path.display()))?;
        Ok(())
    }

    /// Makes `path` the last opened archive and moves it to the front of the recent list.
    pub fn record_opened(&mut self, path: &Path) {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.recent.retain(|p| p != &canonical);
        self.recent.insert(0, canonical.clone());
        self.recent.truncate(RECENT_LIMIT);
        self.last_opened = Some(canonical);
    }

    pub fn forget(&mut self, path: &Path) {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.recent.retain(|p| p != &canonical && p != path);
        if self.last_opened.as_deref().is_some_and(|last| last == canonical || last == path) {
            self.last_opened = None;
        }
    }
}

/// Preferences bound to their file. Write failures are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
    prefs: Preferences,
}

impl PreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefs = Preferences::load_or_default(&path);
        Self { path, prefs }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &Preferences {
        &self.prefs
    }

    pub fn update(&mut self, change: impl FnOnce(&mut Preferences)) {
        change(&mut self.prefs);
        if let Err(err) = self.prefs.store(&self.path) {
            log::warn!("[preferences] failed to persist preferences: {err:?}");
        }
    }
}
