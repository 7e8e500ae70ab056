use anyhow::{anyhow, Context, Result};
use dm_engine::archive::{self, ArchiveCodec, AssetPayload, DecodedArchive};
use dm_engine::assets::{normalize_path, AssetKind, ROOT_PATH};
use dm_engine::registry::TypeRegistry;
use dm_engine::scene::{MaterializeError, Scene};
use dm_engine::snapshot::scene_name;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };
    match command.as_str() {
        "inspect" => {
            let path = args
                .next()
                .ok_or_else(|| anyhow!("inspect requires a path: project_tool inspect <archive>"))?;
            cmd_inspect(&path)
        }
        "verify" => {
            let path =
                args.next().ok_or_else(|| anyhow!("verify requires a path: project_tool verify <archive>"))?;
            cmd_verify(&path)
        }
        "extract" => {
            let path = args.next().ok_or_else(|| {
                anyhow!("extract requires arguments: project_tool extract <archive> <output_dir>")
            })?;
            let output = args.next().ok_or_else(|| anyhow!("extract missing output directory argument"))?;
            cmd_extract(&path, &output)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(anyhow!("unknown command '{other}'")),
    }
}

fn print_usage() {
    eprintln!(
        "Project Tool

Usage:
  project_tool inspect <archive>         Print the manifest summary of a .{ext} archive
  project_tool verify <archive>          Check version, asset checksums and scene types
  project_tool extract <archive> <dir>   Write every file asset into <dir>
  project_tool help                      Show this message
",
        ext = archive::ARCHIVE_EXTENSION
    );
}

fn load_archive(path: &str) -> Result<DecodedArchive> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read archive {path}"))?;
    let decoded = ArchiveCodec::decode(&bytes).with_context(|| format!("Failed to decode archive {path}"))?;
    Ok(decoded)
}

fn cmd_inspect(path: &str) -> Result<()> {
    let decoded = load_archive(path)?;
    let manifest = &decoded.manifest;
    println!("Project:  {}", manifest.project_name);
    println!("Format:   {}", manifest.format_version);
    println!("Saved at: {} (unix ms)", manifest.timestamp);
    if manifest.partial_assets {
        println!("Warning:  asset listing was incomplete when this archive was saved");
    }
    let active = manifest.editor_settings.active_scene_name.as_deref().unwrap_or("-");
    println!("Active:   {active}");
    println!();
    println!("{:<5} {:<32} {}", "Idx", "Scene", "Objects");
    println!("{}", "-".repeat(48));
    for (index, scene) in manifest.scenes.iter().enumerate() {
        let objects = scene.get("gameObjects").and_then(|v| v.as_array()).map(Vec::len).unwrap_or(0);
        println!("{:<5} {:<32} {}", index, scene_name(scene).unwrap_or("-"), objects);
    }
    println!();
    println!("{:<8} {:<48} {}", "Kind", "Path", "Bytes");
    println!("{}", "-".repeat(68));
    for asset in &manifest.assets {
        let size = match decoded.payload(&asset.path) {
            Some(AssetPayload::Intact(bytes)) => bytes.len().to_string(),
            Some(AssetPayload::Corrupt(_)) => "corrupt".to_string(),
            None if asset.checksum.is_some() => "missing".to_string(),
            None => "-".to_string(),
        };
        let kind = match asset.kind {
            AssetKind::File => "file",
            AssetKind::Folder => "folder",
        };
        println!("{:<8} {:<48} {}", kind, asset.path, size);
    }
    Ok(())
}

fn cmd_verify(path: &str) -> Result<()> {
    let decoded = load_archive(path)?;
    let mut issues = Vec::new();

    for asset in decoded.manifest.file_assets() {
        match decoded.payload(&asset.path) {
            Some(AssetPayload::Intact(_)) => {}
            Some(AssetPayload::Corrupt(reason)) => issues.push(format!("asset '{}' is corrupt: {reason}", asset.path)),
            None => issues.push(format!("asset '{}' has no archive entry", asset.path)),
        }
    }
    for entry in &decoded.ignored_entries {
        issues.push(format!("entry '{entry}' is outside the asset tree"));
    }

    let registry = TypeRegistry::with_engine_defaults();
    for scene in &decoded.manifest.scenes {
        let name = scene_name(scene).unwrap_or("<unnamed>");
        let missing = registry.missing(Scene::referenced_types(scene).iter().map(String::as_str));
        if !missing.is_empty() {
            issues.push(format!("scene '{name}' needs types not built in: {}", missing.join(", ")));
            continue;
        }
        if let Err(err @ MaterializeError::Malformed(_)) = Scene::from_portable(scene, &registry) {
            issues.push(format!("scene '{name}' cannot be loaded: {err}"));
        }
    }

    if issues.is_empty() {
        println!(
            "Archive '{}' is valid. Format: {}  Scenes: {}  Files: {}",
            path,
            decoded.manifest.format_version,
            decoded.manifest.scenes.len(),
            decoded.manifest.file_assets().count(),
        );
        Ok(())
    } else {
        Err(anyhow!(format!("archive '{}' has issues:\n  - {}", path, issues.join("\n  - "))))
    }
}

fn cmd_extract(path: &str, output: &str) -> Result<()> {
    let decoded = load_archive(path)?;
    let root = Path::new(output);
    fs::create_dir_all(root).with_context(|| format!("Failed to create output dir {}", root.display()))?;
    for folder in decoded.manifest.folder_assets() {
        let Some(target) = output_path(root, &folder.path) else {
            eprintln!("[project_tool] skipping folder with unsafe path '{}'", folder.path);
            continue;
        };
        fs::create_dir_all(&target).with_context(|| format!("Failed to create {}", target.display()))?;
    }
    let mut written = 0usize;
    for (asset_path, payload) in &decoded.assets {
        let AssetPayload::Intact(bytes) = payload else {
            eprintln!("[project_tool] skipping corrupt asset {asset_path}");
            continue;
        };
        let Some(target) = output_path(root, asset_path) else {
            eprintln!("[project_tool] skipping asset with unsafe path '{asset_path}'");
            continue;
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&target, bytes).with_context(|| format!("Failed to write {}", target.display()))?;
        written += 1;
    }
    println!("Extracted {written} asset(s) from '{path}' into '{}'", root.display());
    Ok(())
}

/// Location under `root` for an asset path taken from an archive; `None` when the path is not a
/// normalized path below the asset root.
fn output_path(root: &Path, asset_path: &str) -> Option<PathBuf> {
    let normalized = normalize_path(asset_path).ok()?;
    if normalized == ROOT_PATH || normalized != asset_path {
        return None;
    }
    Some(root.join(normalized.trim_start_matches('/')))
}
