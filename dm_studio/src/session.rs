use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Process-lifetime state shared by the guard, its watchdog and the save reminder.
#[derive(Debug)]
pub struct SessionState {
    pub guard_held: bool,
    pub guard_acquired_at: Option<Instant>,
    /// Bumped on every acquisition so stale watchdogs and leases cannot release a newer hold.
    pub(crate) generation: u64,
    /// Dropping the sender wakes and cancels the armed watchdog.
    pub(crate) watchdog_cancel: Option<Sender<()>>,
    pub last_successful_save_at: Instant,
    pub reminder_enabled: bool,
    pub reminder_visible: bool,
    pub last_archive: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionContext {
    pub fn new(reminder_enabled: bool) -> Self {
        let state = SessionState {
            guard_held: false,
            guard_acquired_at: None,
            generation: 0,
            watchdog_cancel: None,
            last_successful_save_at: Instant::now(),
            reminder_enabled,
            reminder_visible: false,
            last_archive: None,
        };
        Self { inner: Arc::new(Mutex::new(state)) }
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn guard_held(&self) -> bool {
        self.lock().guard_held
    }

    pub fn last_archive(&self) -> Option<PathBuf> {
        self.lock().last_archive.clone()
    }

    pub fn set_last_archive(&self, path: Option<&Path>) {
        self.lock().last_archive = path.map(Path::to_path_buf);
    }

    pub fn last_successful_save_at(&self) -> Instant {
        self.lock().last_successful_save_at
    }

    /// Records a successful save and hides any visible reminder.
    pub fn mark_saved(&self, at: Instant) {
        let mut state = self.lock();
        state.last_successful_save_at = at;
        state.reminder_visible = false;
    }

    pub fn set_reminder_enabled(&self, enabled: bool) {
        self.lock().reminder_enabled = enabled;
    }
}
