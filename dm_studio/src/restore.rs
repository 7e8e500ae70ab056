use crate::error::OperationError;
use crate::resolver::ResolutionReport;
use crate::workspace::Workspace;
use dm_engine::archive::{ArchiveCodec, AssetPayload, DecodedArchive};
use dm_engine::assets::AssetContent;
use dm_engine::registry::TypeKey;
use dm_engine::scene::{MaterializeError, PortableScene, Scene};
use dm_engine::snapshot::scene_name;
use std::collections::HashSet;
use std::fmt;

/// A partial failure that did not stop the load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreIssue {
    AssetSkipped { path: String, reason: String },
    SceneDropped { name: String, reason: String },
    SceneDegraded { name: String, stand_ins: Vec<String> },
    ActiveSceneMissing { requested: String, used: String },
    SelectionCleared { id: String },
}

impl fmt::Display for RestoreIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreIssue::AssetSkipped { path, reason } => write!(f, "Asset '{path}' was skipped: {reason}"),
            RestoreIssue::SceneDropped { name, reason } => write!(f, "Scene '{name}' could not be loaded: {reason}"),
            RestoreIssue::SceneDegraded { name, stand_ins } => write!(
                f,
                "Scene '{name}' uses placeholder types ({}); some behaviour may be missing",
                stand_ins.join(", ")
            ),
            RestoreIssue::ActiveSceneMissing { requested, used } => {
                write!(f, "Active scene '{requested}' was not found; opened '{used}' instead")
            }
            RestoreIssue::SelectionCleared { id } => write!(f, "Selected object '{id}' no longer exists"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub project_name: String,
    pub folders_restored: usize,
    pub assets_restored: usize,
    pub scenes_restored: Vec<String>,
    pub resolution: ResolutionReport,
    pub active_scene: String,
    pub selection: Option<String>,
    pub issues: Vec<RestoreIssue>,
}

impl RestoreReport {
    pub fn degraded_scenes(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().filter_map(|issue| match issue {
            RestoreIssue::SceneDegraded { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn skipped_assets(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().filter_map(|issue| match issue {
            RestoreIssue::AssetSkipped { path, .. } => Some(path.as_str()),
            _ => None,
        })
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Loaded '{}': {} scene(s), {} asset(s)",
            self.project_name,
            self.scenes_restored.len(),
            self.assets_restored
        );
        if !self.issues.is_empty() {
            summary.push_str(&format!(", {} issue(s)", self.issues.len()));
        }
        summary
    }
}

/// Applies an archive onto the workspace in a fixed order: clear, reset assets, parse, resolve
/// core types, assets, scenes, editor settings, active scene and selection. Only parsing and core
/// type resolution are fatal. Module and object types are resolved per scene, so a scene whose
/// types cannot be made available is dropped on its own.
#[derive(Debug, Clone)]
pub struct RestoreOrchestrator {
    fallback_project_name: String,
    fallback_scene_name: String,
}

impl RestoreOrchestrator {
    pub fn new(fallback_project_name: impl Into<String>, fallback_scene_name: impl Into<String>) -> Self {
        Self { fallback_project_name: fallback_project_name.into(), fallback_scene_name: fallback_scene_name.into() }
    }

    pub fn restore(&self, workspace: &mut Workspace, bytes: &[u8]) -> Result<RestoreReport, OperationError> {
        workspace.clear();
        workspace.reset_assets();
        match self.apply(workspace, bytes) {
            Ok(report) => {
                workspace.mark_clean();
                Ok(report)
            }
            Err(err) => {
                log::error!("[restore] load failed after clearing the workspace: {err}");
                workspace.reset_to_fresh(&self.fallback_project_name, &self.fallback_scene_name);
                Err(err)
            }
        }
    }

    fn apply(&self, workspace: &mut Workspace, bytes: &[u8]) -> Result<RestoreReport, OperationError> {
        let archive = ArchiveCodec::decode(bytes)?;
        let mut report = RestoreReport { project_name: archive.manifest.project_name.clone(), ..Default::default() };

        report.resolution = workspace.resolve_types(TypeKey::core())?;

        self.restore_assets(workspace, &archive, &mut report);
        self.restore_scenes(workspace, &archive, &mut report);

        workspace.set_project_name(archive.manifest.project_name.clone());
        archive.manifest.editor_settings.apply_view(workspace.settings_mut());
        self.restore_focus(workspace, &archive, &mut report);

        for issue in &report.issues {
            log::warn!("[restore] {issue}");
        }
        log::info!("[restore] {}", report.summary());
        Ok(report)
    }

    fn restore_assets(&self, workspace: &mut Workspace, archive: &DecodedArchive, report: &mut RestoreReport) {
        let store = workspace.assets_mut();
        for folder in archive.manifest.folder_assets() {
            match store.create_folder(&folder.path, folder.created_at, folder.modified_at) {
                Ok(()) => report.folders_restored += 1,
                Err(err) => report
                    .issues
                    .push(RestoreIssue::AssetSkipped { path: folder.path.clone(), reason: format!("{err:#}") }),
            }
        }

        let mut listed = HashSet::new();
        for asset in archive.manifest.file_assets() {
            listed.insert(asset.path.as_str());
            let bytes = match archive.payload(&asset.path) {
                Some(AssetPayload::Intact(bytes)) => bytes.clone(),
                Some(AssetPayload::Corrupt(reason)) => {
                    report.issues.push(RestoreIssue::AssetSkipped { path: asset.path.clone(), reason: reason.clone() });
                    continue;
                }
                None => {
                    report.issues.push(RestoreIssue::AssetSkipped {
                        path: asset.path.clone(),
                        reason: "missing from archive".to_string(),
                    });
                    continue;
                }
            };
            let content = AssetContent::from_stored(bytes, asset.text);
            match store.write_file(&asset.path, content, asset.created_at, asset.modified_at) {
                Ok(()) => {
                    log::debug!("[restore] wrote {}", asset.path);
                    report.assets_restored += 1;
                }
                Err(err) => report
                    .issues
                    .push(RestoreIssue::AssetSkipped { path: asset.path.clone(), reason: format!("{err:#}") }),
            }
        }

        // Entries present in the container but not listed in the manifest still carry content.
        let timestamp = archive.manifest.timestamp;
        for (path, payload) in &archive.assets {
            if listed.contains(path.as_str()) {
                continue;
            }
            let AssetPayload::Intact(bytes) = payload else {
                continue;
            };
            log::debug!("[restore] {path} is not listed in the manifest; restoring as binary");
            match store.write_file(path, AssetContent::Bytes(bytes.clone()), timestamp, timestamp) {
                Ok(()) => report.assets_restored += 1,
                Err(err) => log::debug!("[restore] could not place unlisted entry {path}: {err:#}"),
            }
        }
        for entry in &archive.ignored_entries {
            log::debug!("[restore] ignored archive entry {entry}");
        }
    }

    fn restore_scenes(&self, workspace: &mut Workspace, archive: &DecodedArchive, report: &mut RestoreReport) {
        let mut seen = HashSet::new();
        for (index, value) in archive.manifest.scenes.iter().enumerate() {
            let name = scene_name(value).map(str::to_string).unwrap_or_else(|| format!("scene #{}", index + 1));
            if !seen.insert(name.clone()) {
                report
                    .issues
                    .push(RestoreIssue::SceneDropped { name, reason: "duplicate scene name".to_string() });
                continue;
            }
            let mut portable = match PortableScene::pending(value) {
                Ok(portable) => portable,
                Err(err) => {
                    report.issues.push(RestoreIssue::SceneDropped { name, reason: err.to_string() });
                    continue;
                }
            };
            let mut outcome = portable.try_materialize(workspace.registry()).map(|_| ());
            let missing = match &outcome {
                Err(MaterializeError::MissingType(key)) => Some(key.clone()),
                _ => None,
            };
            if let Some(key) = missing {
                log::debug!("[restore] scene '{name}' is waiting on '{key}'; resolving and retrying once");
                let required = Scene::referenced_types(value);
                outcome = match workspace.resolve_types(required.iter().map(String::as_str)) {
                    Ok(resolved) => {
                        report.resolution.merge(resolved);
                        portable.try_materialize(workspace.registry()).map(|_| ())
                    }
                    Err(err) => Err(MaterializeError::MissingType(err.to_string())),
                };
            }
            if let Err(err) = outcome {
                report.issues.push(RestoreIssue::SceneDropped { name, reason: err.to_string() });
                continue;
            }
            let Some(scene) = portable.into_scene() else {
                continue;
            };
            if scene.is_degraded() {
                let stand_ins = scene.stand_in_types().map(str::to_string).collect();
                report.issues.push(RestoreIssue::SceneDegraded { name: scene.name.clone(), stand_ins });
            }
            log::debug!("[restore] scene '{}' with {} object(s)", scene.name, scene.object_count());
            report.scenes_restored.push(scene.name.clone());
            workspace.add_scene(scene);
        }
    }

    fn restore_focus(&self, workspace: &mut Workspace, archive: &DecodedArchive, report: &mut RestoreReport) {
        let requested = archive.manifest.editor_settings.active_scene_name.clone();
        let found = requested.as_deref().filter(|name| workspace.scene(name).is_some()).map(str::to_string);
        let active = match found {
            Some(name) => name,
            None => {
                let fallback = match workspace.scenes().first() {
                    Some(scene) => scene.name.clone(),
                    None => {
                        workspace.add_scene(Scene::new(&self.fallback_scene_name));
                        self.fallback_scene_name.clone()
                    }
                };
                if let Some(requested) = requested.filter(|requested| *requested != fallback) {
                    report.issues.push(RestoreIssue::ActiveSceneMissing { requested, used: fallback.clone() });
                }
                fallback
            }
        };
        workspace.settings_mut().active_scene_name = Some(active.clone());
        workspace.settings_mut().selected_object_id = None;
        report.active_scene = active;

        if let Some(id) = archive.manifest.editor_settings.selected_object_id.as_deref() {
            if workspace.select(Some(id)) {
                report.selection = Some(id.to_string());
            } else {
                report.issues.push(RestoreIssue::SelectionCleared { id: id.to_string() });
            }
        }
    }
}
