use crate::resolver::{DependencyResolver, LiveTypeCache, ResolutionReport, UnresolvedTypes};
use dm_engine::assets::{AssetStore, MemoryAssetStore};
use dm_engine::registry::TypeRegistry;
use dm_engine::scene::{GameObject, Scene};
use dm_engine::settings::EditorSettings;
use serde_json::Value;

/// The live application state that persistence reads on save and rebuilds on load.
pub struct Workspace {
    project_name: String,
    scenes: Vec<Scene>,
    settings: EditorSettings,
    assets: Box<dyn AssetStore>,
    registry: TypeRegistry,
    live_types: LiveTypeCache,
    dirty: bool,
}

impl Workspace {
    pub fn new(project_name: impl Into<String>, assets: Box<dyn AssetStore>, registry: TypeRegistry) -> Self {
        Self {
            project_name: project_name.into(),
            scenes: Vec::new(),
            settings: EditorSettings::default(),
            assets,
            registry,
            live_types: LiveTypeCache::new(),
            dirty: false,
        }
    }

    /// Engine default types, an in-memory asset store and one empty scene.
    pub fn with_defaults(project_name: &str, scene_name: &str) -> Self {
        let mut workspace =
            Self::new(project_name, Box::new(MemoryAssetStore::new()), TypeRegistry::with_engine_defaults());
        workspace.add_scene(Scene::new(scene_name));
        workspace.dirty = false;
        workspace
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn set_project_name(&mut self, name: impl Into<String>) {
        self.project_name = name.into();
        self.dirty = true;
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.name == name)
    }

    /// Adds a scene, replacing one with the same name. The first scene becomes active.
    pub fn add_scene(&mut self, scene: Scene) {
        self.live_types.remember_scene(&scene, &self.registry);
        if self.settings.active_scene_name.is_none() {
            self.settings.active_scene_name = Some(scene.name.clone());
        }
        match self.scenes.iter_mut().find(|existing| existing.name == scene.name) {
            Some(existing) => *existing = scene,
            None => self.scenes.push(scene),
        }
        self.dirty = true;
    }

    pub fn add_object(&mut self, scene_name: &str, object: GameObject) -> bool {
        let Some(scene) = self.scenes.iter_mut().find(|scene| scene.name == scene_name) else {
            return false;
        };
        scene.objects.push(object);
        self.live_types.remember_scene(scene, &self.registry);
        self.dirty = true;
        true
    }

    pub fn active_scene_name(&self) -> Option<&str> {
        self.settings.active_scene_name.as_deref()
    }

    pub fn active_scene(&self) -> Option<&Scene> {
        self.active_scene_name().and_then(|name| self.scene(name))
    }

    pub fn set_active_scene(&mut self, name: &str) -> bool {
        if self.scene(name).is_none() {
            return false;
        }
        if self.active_scene_name() != Some(name) {
            self.settings.active_scene_name = Some(name.to_string());
            self.settings.selected_object_id = None;
        }
        true
    }

    pub fn selection(&self) -> Option<&str> {
        self.settings.selected_object_id.as_deref()
    }

    /// Selects an object in the active scene; `None` clears the selection.
    pub fn select(&mut self, id: Option<&str>) -> bool {
        match id {
            None => {
                self.settings.selected_object_id = None;
                true
            }
            Some(id) => {
                let found = self.active_scene().and_then(|scene| scene.find_object(id)).is_some();
                if found {
                    self.settings.selected_object_id = Some(id.to_string());
                }
                found
            }
        }
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EditorSettings {
        &mut self.settings
    }

    pub fn assets(&self) -> &dyn AssetStore {
        self.assets.as_ref()
    }

    pub fn assets_mut(&mut self) -> &mut dyn AssetStore {
        self.dirty = true;
        self.assets.as_mut()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn resolve_types<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<ResolutionReport, UnresolvedTypes> {
        DependencyResolver::ensure_available(&mut self.registry, &self.live_types, keys)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn portable_scenes(&self) -> Vec<Value> {
        self.scenes.iter().map(Scene::to_portable).collect()
    }

    /// Drops every scene, the active scene pointer and the selection.
    pub fn clear(&mut self) {
        self.scenes.clear();
        self.settings.active_scene_name = None;
        self.settings.selected_object_id = None;
    }

    pub fn reset_assets(&mut self) {
        self.assets.reset();
    }

    /// Replaces everything with an empty project holding one scene.
    pub fn reset_to_fresh(&mut self, project_name: &str, scene_name: &str) {
        self.clear();
        self.assets.reset();
        self.settings = EditorSettings::default();
        self.project_name = project_name.to_string();
        self.add_scene(Scene::new(scene_name));
        self.dirty = false;
    }
}
