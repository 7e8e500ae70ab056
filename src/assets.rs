use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Path of the virtual file system's root placeholder entry.
pub const ROOT_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetContent {
    Bytes(Vec<u8>),
    Text(String),
    Empty,
}

impl AssetContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AssetContent::Bytes(bytes) => bytes,
            AssetContent::Text(text) => text.as_bytes(),
            AssetContent::Empty => &[],
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, AssetContent::Text(_))
    }

    /// Rebuilds content from stored bytes, keeping text as text when it is valid UTF-8.
    pub fn from_stored(bytes: Vec<u8>, text: bool) -> Self {
        if text {
            match String::from_utf8(bytes) {
                Ok(text) => AssetContent::Text(text),
                Err(err) => AssetContent::Bytes(err.into_bytes()),
            }
        } else {
            AssetContent::Bytes(bytes)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub path: String,
    pub kind: AssetKind,
    pub content: AssetContent,
    pub created_at: u64,
    pub modified_at: u64,
}

impl AssetRecord {
    pub fn file(path: impl Into<String>, content: AssetContent, created_at: u64, modified_at: u64) -> Self {
        Self { path: path.into(), kind: AssetKind::File, content, created_at, modified_at }
    }

    pub fn folder(path: impl Into<String>, created_at: u64, modified_at: u64) -> Self {
        Self { path: path.into(), kind: AssetKind::Folder, content: AssetContent::Empty, created_at, modified_at }
    }

    pub fn is_root(&self) -> bool {
        self.path == ROOT_PATH
    }
}

/// The project's virtual file system as seen by the persistence layer.
pub trait AssetStore {
    /// Every entry including the root placeholder, parents before children.
    fn all_entries(&self) -> Result<Vec<AssetRecord>>;

    /// Drops every entry and recreates an empty root.
    fn reset(&mut self);

    fn create_folder(&mut self, path: &str, created_at: u64, modified_at: u64) -> Result<()>;

    fn write_file(&mut self, path: &str, content: AssetContent, created_at: u64, modified_at: u64) -> Result<()>;

    fn read_file(&self, path: &str) -> Option<AssetContent>;
}

/// Normalizes an absolute-style asset path (`/sprites/hero.png`). Rejects relative paths,
/// backslashes and `.`/`..` components.
pub fn normalize_path(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        bail!("asset path '{path}' must start with '/'");
    }
    if path.contains('\\') {
        bail!("asset path '{path}' contains a backslash");
    }
    let mut parts = Vec::new();
    for part in path.split('/').filter(|part| !part.is_empty()) {
        if part == "." || part == ".." {
            bail!("asset path '{path}' contains a relative component");
        }
        parts.push(part);
    }
    if parts.is_empty() {
        return Ok(ROOT_PATH.to_string());
    }
    Ok(format!("/{}", parts.join("/")))
}

fn parent_of(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT_PATH),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

#[derive(Debug, Clone)]
pub struct MemoryAssetStore {
    entries: BTreeMap<String, AssetRecord>,
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        let mut store = Self { entries: BTreeMap::new() };
        store.reset();
        store
    }
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, path: &str) -> Option<&AssetRecord> {
        self.entries.get(path)
    }

    fn ensure_parents(&mut self, path: &str, created_at: u64, modified_at: u64) -> Result<()> {
        let mut missing = Vec::new();
        let mut cursor = parent_of(path);
        while let Some(parent) = cursor {
            match self.entries.get(parent) {
                Some(record) if record.kind == AssetKind::Folder => break,
                Some(_) => return Err(anyhow!("cannot place '{path}' under file '{parent}'")),
                None => missing.push(parent.to_string()),
            }
            cursor = parent_of(parent);
        }
        for folder in missing.into_iter().rev() {
            self.entries.insert(folder.clone(), AssetRecord::folder(folder, created_at, modified_at));
        }
        Ok(())
    }
}

impl AssetStore for MemoryAssetStore {
    fn all_entries(&self) -> Result<Vec<AssetRecord>> {
        // BTreeMap order already yields parents before children.
        Ok(self.entries.values().cloned().collect())
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.entries.insert(ROOT_PATH.to_string(), AssetRecord::folder(ROOT_PATH, 0, 0));
    }

    fn create_folder(&mut self, path: &str, created_at: u64, modified_at: u64) -> Result<()> {
        let path = normalize_path(path)?;
        match self.entries.get(&path) {
            Some(record) if record.kind == AssetKind::File => bail!("'{path}' already exists as a file"),
            Some(_) => return Ok(()),
            None => {}
        }
        self.ensure_parents(&path, created_at, modified_at)?;
        self.entries.insert(path.clone(), AssetRecord::folder(path, created_at, modified_at));
        Ok(())
    }

    fn write_file(&mut self, path: &str, content: AssetContent, created_at: u64, modified_at: u64) -> Result<()> {
        let path = normalize_path(path)?;
        if path == ROOT_PATH {
            bail!("cannot write file content to the root folder");
        }
        if let Some(record) = self.entries.get(&path) {
            if record.kind == AssetKind::Folder {
                bail!("'{path}' already exists as a folder");
            }
        }
        self.ensure_parents(&path, created_at, modified_at)?;
        self.entries.insert(path.clone(), AssetRecord::file(path, content, created_at, modified_at));
        Ok(())
    }

    fn read_file(&self, path: &str) -> Option<AssetContent> {
        self.entries.get(path).filter(|record| record.kind == AssetKind::File).map(|record| record.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("/a//b/").unwrap(), "/a/b");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert!(normalize_path("a/b").is_err());
        assert!(normalize_path("/a/../b").is_err());
        assert!(normalize_path("/art\\hero.png").is_err());
    }

    #[test]
    fn backslash_names_never_reach_the_store() {
        let mut store = MemoryAssetStore::new();
        assert!(store.write_file("/art\\hero.png", AssetContent::Bytes(vec![1]), 0, 0).is_err());
        assert!(store.create_folder("/art\\sprites", 0, 0).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn writes_create_parent_folders() {
        let mut store = MemoryAssetStore::new();
        store.write_file("/sprites/hero/idle.png", AssetContent::Bytes(vec![1, 2, 3]), 10, 20).unwrap();
        let entries = store.all_entries().unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/sprites", "/sprites/hero", "/sprites/hero/idle.png"]);
        assert_eq!(store.get("/sprites").unwrap().kind, AssetKind::Folder);
        assert_eq!(store.read_file("/sprites/hero/idle.png"), Some(AssetContent::Bytes(vec![1, 2, 3])));
    }

    #[test]
    fn rejects_file_folder_collisions() {
        let mut store = MemoryAssetStore::new();
        store.write_file("/notes.txt", AssetContent::Text("hi".into()), 0, 0).unwrap();
        assert!(store.create_folder("/notes.txt", 0, 0).is_err());
        assert!(store.write_file("/notes.txt/inner", AssetContent::Empty, 0, 0).is_err());
        store.create_folder("/empty", 0, 0).unwrap();
        assert!(store.write_file("/empty", AssetContent::Empty, 0, 0).is_err());
    }

    #[test]
    fn reset_keeps_only_root() {
        let mut store = MemoryAssetStore::new();
        store.write_file("/a.txt", AssetContent::Text("a".into()), 0, 0).unwrap();
        store.reset();
        assert!(store.is_empty());
        assert!(store.get(ROOT_PATH).is_some());
    }

    #[test]
    fn stored_text_falls_back_to_bytes() {
        assert_eq!(AssetContent::from_stored(b"ok".to_vec(), true), AssetContent::Text("ok".into()));
        assert_eq!(AssetContent::from_stored(vec![0xff, 0xfe], true), AssetContent::Bytes(vec![0xff, 0xfe]));
    }
}
