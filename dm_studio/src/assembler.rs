use crate::workspace::Workspace;
use dm_engine::assets::AssetStore;
use dm_engine::settings::EditorSettings;
use dm_engine::snapshot::{ProjectSnapshot, SceneRecord, FORMAT_VERSION};
use dm_engine::time::unix_millis;
use serde_json::Value;

/// Read-only view of the state a snapshot is taken from.
pub trait ProjectSource {
    fn project_name(&self) -> &str;
    fn editor_settings(&self) -> &EditorSettings;
    fn portable_scenes(&self) -> Vec<Value>;
    fn asset_store(&self) -> &dyn AssetStore;
}

impl ProjectSource for Workspace {
    fn project_name(&self) -> &str {
        Workspace::project_name(self)
    }

    fn editor_settings(&self) -> &EditorSettings {
        self.settings()
    }

    fn portable_scenes(&self) -> Vec<Value> {
        Workspace::portable_scenes(self)
    }

    fn asset_store(&self) -> &dyn AssetStore {
        self.assets()
    }
}

pub struct SnapshotAssembler;

impl SnapshotAssembler {
    /// Captures the project. Never fails: if the asset listing cannot be read the snapshot carries
    /// no assets and is flagged `partial_assets`.
    pub fn assemble(source: &dyn ProjectSource) -> ProjectSnapshot {
        let scenes = source.portable_scenes().into_iter().map(SceneRecord::from_portable).collect();
        let (assets, partial_assets) = match source.asset_store().all_entries() {
            Ok(entries) => (entries.into_iter().filter(|entry| !entry.is_root()).collect(), false),
            Err(err) => {
                log::warn!("[persistence] asset listing failed, saving without assets: {err:?}");
                (Vec::new(), true)
            }
        };
        ProjectSnapshot {
            project_name: source.project_name().to_string(),
            format_version: FORMAT_VERSION.to_string(),
            created_at: unix_millis(),
            editor_settings: source.editor_settings().clone(),
            scenes,
            assets,
            partial_assets,
        }
    }
}
