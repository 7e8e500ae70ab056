use crate::assembler::SnapshotAssembler;
use crate::error::OperationError;
use crate::gate::{Decision, DiscardPrompt, PromptFuture, UnsavedChangesGate};
use crate::guard::OperationGuard;
use crate::notify::{Notifier, Severity};
use crate::preferences::PreferenceStore;
use crate::reminder::{ReminderHandle, SaveReminderScheduler};
use crate::restore::{RestoreOrchestrator, RestoreReport};
use crate::session::SessionContext;
use crate::workspace::Workspace;
use anyhow::Context;
use dm_engine::archive::{ArchiveCodec, ARCHIVE_EXTENSION};
use dm_engine::config::PersistenceConfig;
use dm_engine::snapshot::ProjectSnapshot;
use std::cell::RefCell;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

/// Chooses archive locations. `None` means the user dismissed the picker.
pub trait ArchivePicker {
    fn pick_save_path<'a>(&'a self, suggested_name: &'a str) -> PromptFuture<'a, Option<PathBuf>>;
    fn pick_open_path(&self) -> PromptFuture<'_, Option<PathBuf>>;
}

/// Picker with fixed answers.
#[derive(Debug, Clone, Default)]
pub struct FixedPicker {
    pub save_path: Option<PathBuf>,
    pub open_path: Option<PathBuf>,
}

impl ArchivePicker for FixedPicker {
    fn pick_save_path<'a>(&'a self, _suggested_name: &'a str) -> PromptFuture<'a, Option<PathBuf>> {
        let path = self.save_path.clone();
        Box::pin(async move { path })
    }

    fn pick_open_path(&self) -> PromptFuture<'_, Option<PathBuf>> {
        let path = self.open_path.clone();
        Box::pin(async move { path })
    }
}

/// Invocation surface for new/save/load. Every operation holds the guard for its whole span,
/// including prompts and nested saves, and reports through the notifier.
pub struct PersistenceService {
    config: PersistenceConfig,
    session: SessionContext,
    guard: OperationGuard,
    notifier: Arc<dyn Notifier>,
    gate: UnsavedChangesGate,
    picker: Box<dyn ArchivePicker>,
    restorer: RestoreOrchestrator,
    reminder: SaveReminderScheduler,
    workspace: Rc<RefCell<Workspace>>,
    preferences: RefCell<PreferenceStore>,
}

impl PersistenceService {
    pub fn new(
        config: PersistenceConfig,
        workspace: Rc<RefCell<Workspace>>,
        notifier: Arc<dyn Notifier>,
        prompt: Box<dyn DiscardPrompt>,
        picker: Box<dyn ArchivePicker>,
    ) -> Self {
        let session = SessionContext::new(config.reminder_enabled);
        let guard = OperationGuard::new(session.clone(), Arc::clone(&notifier));
        let reminder = SaveReminderScheduler::new(session.clone(), Arc::clone(&notifier), config.reminder_threshold());
        let restorer = RestoreOrchestrator::new(&config.default_project_name, &config.default_scene_name);
        let preferences = PreferenceStore::open(&config.preferences_path);
        {
            let mut ws = workspace.borrow_mut();
            let blobs = &preferences.get().ui_collapse_state;
            if ws.settings().ui_collapse_state.is_empty() && !blobs.is_empty() {
                ws.settings_mut().ui_collapse_state = blobs.clone();
            }
        }
        Self {
            config,
            session,
            guard,
            notifier,
            gate: UnsavedChangesGate::new(prompt),
            picker,
            restorer,
            reminder,
            workspace,
            preferences: RefCell::new(preferences),
        }
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn guard(&self) -> &OperationGuard {
        &self.guard
    }

    pub fn reminder(&self) -> &SaveReminderScheduler {
        &self.reminder
    }

    pub fn workspace(&self) -> &Rc<RefCell<Workspace>> {
        &self.workspace
    }

    pub fn recent_projects(&self) -> Vec<PathBuf> {
        self.preferences.borrow().get().recent.clone()
    }

    /// Starts the periodic save reminder when enabled in the config.
    pub fn start_reminder(&self) -> Option<ReminderHandle> {
        if !self.config.reminder_enabled {
            return None;
        }
        match self.reminder.start(self.config.reminder_check_interval()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::warn!("[reminder] failed to start reminder thread: {err}");
                None
            }
        }
    }

    pub async fn new_project(&self) -> Result<(), OperationError> {
        self.guarded("new project", move || async move {
            self.confirm_discard().await?;
            let mut ws = self.workspace.borrow_mut();
            ws.reset_to_fresh(&self.config.default_project_name, &self.config.default_scene_name);
            self.session.set_last_archive(None);
            self.notifier.notify(Severity::Success, &format!("Created '{}'", ws.project_name()));
            Ok(())
        })
        .await
    }

    /// Saves to the current archive, asking for a location if there is none yet.
    pub async fn save_project(&self) -> Result<(), OperationError> {
        self.guarded("save", move || self.save_current()).await
    }

    pub async fn save_project_as(&self) -> Result<(), OperationError> {
        self.guarded("save as", move || self.save_with_picker()).await
    }

    pub async fn save_project_to(&self, path: &Path) -> Result<(), OperationError> {
        self.guarded("save", move || async move { self.write_archive(path) }).await
    }

    pub async fn load_project(&self) -> Result<(), OperationError> {
        self.guarded("load", move || async move {
            self.confirm_discard().await?;
            let path = self.picker.pick_open_path().await.ok_or(OperationError::Cancelled)?;
            self.read_and_restore(&path).map(|_| ())
        })
        .await
    }

    pub async fn load_project_from(&self, path: &Path) -> Result<RestoreReport, OperationError> {
        self.guarded("load", move || async move {
            self.confirm_discard().await?;
            self.read_and_restore(path)
        })
        .await
    }

    pub async fn reopen_last_project(&self) -> Result<RestoreReport, OperationError> {
        let last = self.preferences.borrow().get().last_opened.clone();
        let Some(path) = last else {
            self.report::<()>("reopen", &Err(OperationError::NoRecentProject));
            return Err(OperationError::NoRecentProject);
        };
        if !path.exists() {
            log::warn!("[persistence] last archive {} no longer exists; forgetting it", path.display());
            self.preferences.borrow_mut().update(|prefs| prefs.forget(&path));
            self.report::<()>("reopen", &Err(OperationError::NoRecentProject));
            return Err(OperationError::NoRecentProject);
        }
        self.load_project_from(&path).await
    }

    /// Read-only capture of the current project.
    pub fn gather_state(&self) -> ProjectSnapshot {
        SnapshotAssembler::assemble(&*self.workspace.borrow())
    }

    /// Applies archive bytes directly, under the guard and without the unsaved-changes prompt.
    pub async fn restore_state(&self, bytes: &[u8]) -> Result<RestoreReport, OperationError> {
        self.guarded("restore", move || async move { self.apply_restore(bytes, None) }).await
    }

    /// Runs the unsaved-changes prompt on its own. A clean workspace answers `Discard`.
    pub async fn prompt_unsaved_changes(&self) -> Decision {
        let result = self
            .guarded("unsaved changes", move || async move {
                if !self.workspace.borrow().is_dirty() {
                    return Ok(Decision::Discard);
                }
                let scene = self.active_scene_label();
                Ok(self.gate.confirm_discard(&scene, move || self.save_current()).await)
            })
            .await;
        result.unwrap_or(Decision::Cancel)
    }

    async fn guarded<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, OperationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let Some(lease) = self.guard.lease(self.config.watchdog_timeout()) else {
            let busy = Err(OperationError::Busy);
            self.report(label, &busy);
            return busy;
        };
        log::debug!("[persistence] {label} started");
        let result = operation().await;
        if !lease.is_current() {
            log::warn!("[persistence] {label} finished after the watchdog released the guard");
        }
        drop(lease);
        self.report(label, &result);
        result
    }

    fn report<T>(&self, label: &str, result: &Result<T, OperationError>) {
        match result {
            Ok(_) => log::info!("[persistence] {label} finished"),
            Err(OperationError::Cancelled) => {
                log::info!("[persistence] {label} cancelled");
                self.notifier.notify(Severity::Info, &format!("{} cancelled", capitalize(label)));
            }
            Err(OperationError::Busy) => {
                log::warn!("[persistence] {label} rejected: another operation is running");
                self.notifier.notify(Severity::Warn, "Another save or load is already in progress");
            }
            Err(err) => {
                log::error!("[persistence] {label} failed: {err}");
                self.notifier.notify(Severity::Error, &format!("{} failed: {err}", capitalize(label)));
            }
        }
    }

    /// Suspends on the prompt when there are unsaved changes. `Cancel` aborts the caller.
    async fn confirm_discard(&self) -> Result<(), OperationError> {
        if !self.workspace.borrow().is_dirty() {
            return Ok(());
        }
        let scene = self.active_scene_label();
        match self.gate.confirm_discard(&scene, move || self.save_current()).await {
            Decision::Cancel => Err(OperationError::Cancelled),
            Decision::Save | Decision::Discard => Ok(()),
        }
    }

    fn active_scene_label(&self) -> String {
        let ws = self.workspace.borrow();
        ws.active_scene_name().unwrap_or(ws.project_name()).to_string()
    }

    async fn save_current(&self) -> Result<(), OperationError> {
        match self.session.last_archive() {
            Some(path) => self.write_archive(&path),
            None => self.save_with_picker().await,
        }
    }

    async fn save_with_picker(&self) -> Result<(), OperationError> {
        let suggested = format!("{}.{ARCHIVE_EXTENSION}", self.workspace.borrow().project_name());
        let path = self.picker.pick_save_path(&suggested).await.ok_or(OperationError::Cancelled)?;
        self.write_archive(&with_archive_extension(path))
    }

    fn write_archive(&self, path: &Path) -> Result<(), OperationError> {
        let snapshot = self.gather_state();
        let bytes = ArchiveCodec::encode(&snapshot)?;
        fs::write(path, &bytes).with_context(|| format!("Failed to write archive {}", path.display()))?;

        self.session.set_last_archive(Some(path));
        self.session.mark_saved(Instant::now());
        self.workspace.borrow_mut().mark_clean();
        let blobs = snapshot.editor_settings.ui_collapse_state.clone();
        self.preferences.borrow_mut().update(|prefs| {
            prefs.record_opened(path);
            prefs.ui_collapse_state = blobs;
        });

        if snapshot.partial_assets {
            self.notifier.notify(
                Severity::Warn,
                "Assets could not be listed; the project was saved without its asset files",
            );
        }
        log::info!("[persistence] wrote {} bytes to {}", bytes.len(), path.display());
        self.notifier.notify(Severity::Success, &format!("Saved '{}' to {}", snapshot.project_name, path.display()));
        Ok(())
    }

    fn read_and_restore(&self, path: &Path) -> Result<RestoreReport, OperationError> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read archive {}", path.display()))?;
        self.apply_restore(&bytes, Some(path))
    }

    fn apply_restore(&self, bytes: &[u8], source: Option<&Path>) -> Result<RestoreReport, OperationError> {
        let result = self.restorer.restore(&mut self.workspace.borrow_mut(), bytes);
        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.session.set_last_archive(None);
                return Err(err);
            }
        };
        self.session.set_last_archive(source);
        self.session.mark_saved(Instant::now());
        if let Some(path) = source {
            let blobs = self.workspace.borrow().settings().ui_collapse_state.clone();
            self.preferences.borrow_mut().update(|prefs| {
                prefs.record_opened(path);
                prefs.ui_collapse_state = blobs;
            });
        }
        for issue in &report.issues {
            self.notifier.notify(Severity::Warn, &issue.to_string());
        }
        self.notifier.notify(Severity::Success, &report.summary());
        Ok(report)
    }
}

fn with_archive_extension(path: PathBuf) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION) {
        path
    } else {
        let mut name = path.clone().into_os_string();
        name.push(".");
        name.push(ARCHIVE_EXTENSION);
        PathBuf::from(name)
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
