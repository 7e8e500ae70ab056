//! `.dmproj` container: a zip with `project.json` plus one `assets/...` entry per file asset.

use crate::snapshot::{ProjectManifest, ProjectSnapshot};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Read, Write};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const ARCHIVE_EXTENSION: &str = "dmproj";
pub const MANIFEST_ENTRY: &str = "project.json";
pub const ASSET_PREFIX: &str = "assets/";

/// Major format version this build reads. Any `1.x` manifest is accepted.
const SUPPORTED_MAJOR: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    Unreadable(String),
    MissingManifest,
    InvalidManifest(String),
    UnsupportedVersion { found: String },
    Write(String),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::Unreadable(reason) => write!(f, "archive is not readable: {reason}"),
            ArchiveError::MissingManifest => write!(f, "archive has no {MANIFEST_ENTRY}"),
            ArchiveError::InvalidManifest(reason) => write!(f, "{MANIFEST_ENTRY} is invalid: {reason}"),
            ArchiveError::UnsupportedVersion { found } => {
                write!(f, "unsupported project format version '{found}'")
            }
            ArchiveError::Write(reason) => write!(f, "failed to write archive: {reason}"),
        }
    }
}

impl std::error::Error for ArchiveError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetPayload {
    Intact(Vec<u8>),
    /// Entry exists but could not be read or failed its checksum.
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct DecodedArchive {
    pub manifest: ProjectManifest,
    /// Asset content keyed by asset path (`/sprites/a.png`).
    pub assets: BTreeMap<String, AssetPayload>,
    /// Entries that are neither the manifest nor a valid asset path.
    pub ignored_entries: Vec<String>,
}

impl DecodedArchive {
    pub fn payload(&self, path: &str) -> Option<&AssetPayload> {
        self.assets.get(path)
    }
}

/// Entry name for an asset path, e.g. `/sprites/a.png` -> `assets/sprites/a.png`.
pub fn entry_name(asset_path: &str) -> String {
    format!("{ASSET_PREFIX}{}", asset_path.trim_start_matches('/'))
}

/// Inverse of [`entry_name`]; rejects names that would escape the asset root.
pub fn asset_path(entry: &str) -> Option<String> {
    let relative = entry.strip_prefix(ASSET_PREFIX)?;
    if relative.is_empty() || relative.starts_with('/') || relative.contains('\\') {
        return None;
    }
    if relative.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return None;
    }
    Some(format!("/{relative}"))
}

pub fn is_supported_version(version: &str) -> bool {
    version.split('.').next() == Some(SUPPORTED_MAJOR)
}

pub struct ArchiveCodec;

impl ArchiveCodec {
    pub fn encode(snapshot: &ProjectSnapshot) -> Result<Vec<u8>, ArchiveError> {
        snapshot.validate().map_err(|err| ArchiveError::Write(err.to_string()))?;
        let manifest = serde_json::to_vec_pretty(&snapshot.manifest())
            .map_err(|err| ArchiveError::Write(format!("serializing {MANIFEST_ENTRY}: {err}")))?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(MANIFEST_ENTRY, options)
            .map_err(|err| ArchiveError::Write(format!("adding {MANIFEST_ENTRY}: {err}")))?;
        zip.write_all(&manifest)
            .map_err(|err| ArchiveError::Write(format!("writing {MANIFEST_ENTRY}: {err}")))?;

        for asset in snapshot.file_assets() {
            let name = entry_name(&asset.path);
            if asset_path(&name).as_deref() != Some(asset.path.as_str()) {
                return Err(ArchiveError::Write(format!("asset path '{}' cannot be stored as an entry", asset.path)));
            }
            zip.start_file(name.as_str(), options)
                .map_err(|err| ArchiveError::Write(format!("adding {name}: {err}")))?;
            zip.write_all(asset.content.as_bytes())
                .map_err(|err| ArchiveError::Write(format!("writing {name}: {err}")))?;
        }

        let cursor = zip.finish().map_err(|err| ArchiveError::Write(err.to_string()))?;
        log::debug!(
            "[archive] encoded '{}' with {} scene(s) and {} file asset(s)",
            snapshot.project_name,
            snapshot.scenes.len(),
            snapshot.file_assets().count()
        );
        Ok(cursor.into_inner())
    }

    pub fn decode(bytes: &[u8]) -> Result<DecodedArchive, ArchiveError> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|err| ArchiveError::Unreadable(err.to_string()))?;
        let manifest = read_manifest(&mut archive)?;

        let mut assets = BTreeMap::new();
        let mut ignored_entries = Vec::new();
        for index in 0..archive.len() {
            let mut file = match archive.by_index(index) {
                Ok(file) => file,
                Err(err) => {
                    ignored_entries.push(format!("#{index} ({err})"));
                    continue;
                }
            };
            let name = file.name().to_string();
            if name == MANIFEST_ENTRY || file.is_dir() {
                continue;
            }
            let Some(path) = asset_path(&name) else {
                log::warn!("[archive] ignoring unexpected entry '{name}'");
                ignored_entries.push(name);
                continue;
            };
            let mut buffer = Vec::new();
            let payload = match file.read_to_end(&mut buffer) {
                Ok(_) => AssetPayload::Intact(buffer),
                Err(err) => AssetPayload::Corrupt(err.to_string()),
            };
            assets.insert(path, payload);
        }

        for asset in manifest.file_assets() {
            let (Some(expected), Some(payload)) = (asset.checksum.as_deref(), assets.get_mut(&asset.path)) else {
                continue;
            };
            if let AssetPayload::Intact(bytes) = payload {
                let actual = blake3::hash(bytes).to_hex();
                if actual.as_str() != expected {
                    *payload = AssetPayload::Corrupt(format!("checksum mismatch (expected {expected}, found {actual})"));
                }
            }
        }

        Ok(DecodedArchive { manifest, assets, ignored_entries })
    }
}

fn read_manifest(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<ProjectManifest, ArchiveError> {
    let mut buffer = Vec::new();
    match archive.by_name(MANIFEST_ENTRY) {
        Ok(mut file) => {
            file.read_to_end(&mut buffer)
                .map_err(|err| ArchiveError::Unreadable(format!("reading {MANIFEST_ENTRY}: {err}")))?;
        }
        Err(ZipError::FileNotFound) => return Err(ArchiveError::MissingManifest),
        Err(err) => return Err(ArchiveError::Unreadable(err.to_string())),
    }
    let value: Value =
        serde_json::from_slice(&buffer).map_err(|err| ArchiveError::InvalidManifest(err.to_string()))?;
    let version = value
        .get("formatVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| ArchiveError::InvalidManifest("missing formatVersion".to_string()))?;
    if !is_supported_version(version) {
        return Err(ArchiveError::UnsupportedVersion { found: version.to_string() });
    }
    serde_json::from_value(value).map_err(|err| ArchiveError::InvalidManifest(err.to_string()))
}
