use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, zoom: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    pub show: bool,
    pub size: f32,
    pub snap: bool,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self { show: true, size: 32.0, snap: false }
    }
}

/// Editor state that travels with a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorSettings {
    pub active_scene_name: Option<String>,
    pub camera: CameraSettings,
    pub grid: GridSettings,
    pub selected_object_id: Option<String>,
    pub ui_collapse_state: BTreeMap<String, Value>,
    pub active_tab_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snap: Option<bool>,
}

/// Manifest form of [`EditorSettings`]. Every field is optional so manifests written by older
/// editors leave the current value in place instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSettingsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_scene_name: Option<String>,
    #[serde(default)]
    pub camera: CameraRecord,
    #[serde(default)]
    pub grid: GridRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_collapse_state: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_tab_ids: Option<Vec<String>>,
}

impl From<&EditorSettings> for EditorSettingsRecord {
    fn from(settings: &EditorSettings) -> Self {
        Self {
            active_scene_name: settings.active_scene_name.clone(),
            camera: CameraRecord {
                x: Some(settings.camera.x),
                y: Some(settings.camera.y),
                zoom: Some(settings.camera.zoom),
            },
            grid: GridRecord {
                show: Some(settings.grid.show),
                size: Some(settings.grid.size),
                snap: Some(settings.grid.snap),
            },
            selected_object_id: settings.selected_object_id.clone(),
            ui_collapse_state: Some(settings.ui_collapse_state.clone()),
            active_tab_ids: Some(settings.active_tab_ids.clone()),
        }
    }
}

impl EditorSettingsRecord {
    /// Applies camera, grid and UI layout onto `target`. Active scene and selection are
    /// resolved separately once scenes exist.
    pub fn apply_view(&self, target: &mut EditorSettings) {
        if let Some(x) = self.camera.x.filter(|v| v.is_finite()) {
            target.camera.x = x;
        }
        if let Some(y) = self.camera.y.filter(|v| v.is_finite()) {
            target.camera.y = y;
        }
        if let Some(zoom) = self.camera.zoom.filter(|v| v.is_finite() && *v > 0.0) {
            target.camera.zoom = zoom;
        }
        if let Some(show) = self.grid.show {
            target.grid.show = show;
        }
        if let Some(size) = self.grid.size.filter(|v| v.is_finite() && *v > 0.0) {
            target.grid.size = size;
        }
        if let Some(snap) = self.grid.snap {
            target.grid.snap = snap;
        }
        if let Some(blobs) = &self.ui_collapse_state {
            target.ui_collapse_state = blobs.clone();
        }
        if let Some(tabs) = &self.active_tab_ids {
            target.active_tab_ids = tabs.clone();
        }
    }
}
