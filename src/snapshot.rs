use crate::assets::{AssetKind, AssetRecord};
use crate::settings::{EditorSettings, EditorSettingsRecord};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Schema version written into every manifest.
pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq)]
pub struct SceneRecord {
    pub name: String,
    pub portable: Value,
}

impl SceneRecord {
    pub fn from_portable(portable: Value) -> Self {
        let name = scene_name(&portable).unwrap_or_default().to_string();
        Self { name, portable }
    }
}

pub fn scene_name(portable: &Value) -> Option<&str> {
    portable.get("name").and_then(Value::as_str)
}

/// Everything a project persists, captured at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSnapshot {
    pub project_name: String,
    pub format_version: String,
    pub created_at: u64,
    pub editor_settings: EditorSettings,
    pub scenes: Vec<SceneRecord>,
    pub assets: Vec<AssetRecord>,
    /// Set when asset enumeration failed and `assets` is a best-effort subset.
    pub partial_assets: bool,
}

impl ProjectSnapshot {
    pub fn scene_names(&self) -> Vec<&str> {
        self.scenes.iter().map(|scene| scene.name.as_str()).collect()
    }

    pub fn file_assets(&self) -> impl Iterator<Item = &AssetRecord> {
        self.assets.iter().filter(|asset| asset.kind == AssetKind::File)
    }

    pub fn validate(&self) -> Result<()> {
        let mut paths = HashSet::new();
        for asset in &self.assets {
            if !paths.insert(asset.path.as_str()) {
                bail!("duplicate asset path '{}'", asset.path);
            }
        }
        let mut names = HashSet::new();
        for scene in &self.scenes {
            if !names.insert(scene.name.as_str()) {
                bail!("duplicate scene name '{}'", scene.name);
            }
        }
        Ok(())
    }

    /// The manifest form: everything except file content, plus a digest per file.
    pub fn manifest(&self) -> ProjectManifest {
        ProjectManifest {
            project_name: self.project_name.clone(),
            format_version: self.format_version.clone(),
            timestamp: self.created_at,
            editor_settings: EditorSettingsRecord::from(&self.editor_settings),
            scenes: self.scenes.iter().map(|scene| scene.portable.clone()).collect(),
            assets: self.assets.iter().map(ManifestAsset::from).collect(),
            partial_assets: self.partial_assets,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestAsset {
    pub path: String,
    pub kind: AssetKind,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub modified_at: u64,
    /// blake3 hex digest of the stored bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub text: bool,
}

impl From<&AssetRecord> for ManifestAsset {
    fn from(record: &AssetRecord) -> Self {
        let checksum = (record.kind == AssetKind::File)
            .then(|| blake3::hash(record.content.as_bytes()).to_hex().to_string());
        Self {
            path: record.path.clone(),
            kind: record.kind,
            created_at: record.created_at,
            modified_at: record.modified_at,
            checksum,
            text: record.content.is_text(),
        }
    }
}

/// `project.json` inside an archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub project_name: String,
    pub format_version: String,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub editor_settings: EditorSettingsRecord,
    #[serde(default)]
    pub scenes: Vec<Value>,
    #[serde(default)]
    pub assets: Vec<ManifestAsset>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub partial_assets: bool,
}

impl ProjectManifest {
    pub fn scene_names(&self) -> Vec<&str> {
        self.scenes.iter().map(|scene| scene_name(scene).unwrap_or("")).collect()
    }

    pub fn file_assets(&self) -> impl Iterator<Item = &ManifestAsset> {
        self.assets.iter().filter(|asset| asset.kind == AssetKind::File)
    }

    pub fn folder_assets(&self) -> impl Iterator<Item = &ManifestAsset> {
        self.assets.iter().filter(|asset| asset.kind == AssetKind::Folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetContent;
    use serde_json::json;

    fn snapshot() -> ProjectSnapshot {
        ProjectSnapshot {
            project_name: "Demo".into(),
            format_version: FORMAT_VERSION.into(),
            created_at: 1_700_000_000_000,
            editor_settings: EditorSettings::default(),
            scenes: vec![SceneRecord::from_portable(json!({ "name": "Main", "gameObjects": [] }))],
            assets: vec![
                AssetRecord::folder("/art", 1, 1),
                AssetRecord::file("/art/readme.md", AssetContent::Text("# art".into()), 2, 3),
            ],
            partial_assets: false,
        }
    }

    #[test]
    fn manifest_strips_content_and_records_digest() {
        let manifest = snapshot().manifest();
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["projectName"], json!("Demo"));
        assert_eq!(json["timestamp"], json!(1_700_000_000_000u64));
        assert!(json["assets"][1].get("content").is_none());
        assert_eq!(json["assets"][1]["text"], json!(true));
        assert!(json["assets"][0].get("checksum").is_none());
        assert_eq!(
            manifest.assets[1].checksum.as_deref(),
            Some(blake3::hash(b"# art").to_hex().as_str())
        );
        assert!(json.get("partialAssets").is_none());
    }

    #[test]
    fn validate_rejects_duplicate_scene_names() {
        let mut snap = snapshot();
        snap.scenes.push(SceneRecord::from_portable(json!({ "name": "Main" })));
        assert!(snap.validate().is_err());
    }
}
