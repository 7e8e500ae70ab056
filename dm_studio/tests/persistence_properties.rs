use dm_engine::assets::{AssetContent, AssetKind};
use dm_engine::config::PersistenceConfig;
use dm_engine::registry::{Constructor, TypeKey};
use dm_engine::scene::{GameObject, ModuleInstance, Scene, Transform};
use dm_studio::gate::{Decision, DiscardPrompt, FixedPrompt, PromptFuture};
use dm_studio::notify::{NotificationLog, Severity};
use dm_studio::restore::RestoreIssue;
use dm_studio::service::{FixedPicker, PersistenceService};
use dm_studio::workspace::Workspace;
use dm_studio::OperationError;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

fn noop_waker() -> Waker {
    Waker::from(Arc::new(NoopWake))
}

/// Prompt that stays pending until a test supplies the answer.
#[derive(Clone, Default)]
struct DeferredPrompt {
    answer: Rc<Cell<Option<Decision>>>,
    asked: Rc<Cell<usize>>,
}

struct Deferred {
    slot: Rc<Cell<Option<Decision>>>,
}

impl Future for Deferred {
    type Output = Decision;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Decision> {
        match self.slot.take() {
            Some(decision) => Poll::Ready(decision),
            None => Poll::Pending,
        }
    }
}

impl DiscardPrompt for DeferredPrompt {
    fn ask<'a>(&'a self, _active_scene: &'a str) -> PromptFuture<'a, Decision> {
        self.asked.set(self.asked.get() + 1);
        Box::pin(Deferred { slot: Rc::clone(&self.answer) })
    }
}

struct Harness {
    dir: TempDir,
    service: PersistenceService,
    workspace: Rc<RefCell<Workspace>>,
    log: Arc<NotificationLog>,
}

impl Harness {
    fn new(prompt: Box<dyn DiscardPrompt>, picker: FixedPicker) -> Self {
        Self::with_watchdog(prompt, picker, 30_000)
    }

    fn with_watchdog(prompt: Box<dyn DiscardPrompt>, picker: FixedPicker, watchdog_timeout_ms: u64) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        Self::in_dir(dir, prompt, picker, watchdog_timeout_ms)
    }

    fn in_dir(dir: TempDir, prompt: Box<dyn DiscardPrompt>, picker: FixedPicker, watchdog_timeout_ms: u64) -> Self {
        let config = PersistenceConfig {
            watchdog_timeout_ms,
            reminder_enabled: false,
            preferences_path: dir.path().join("preferences.json"),
            ..PersistenceConfig::default()
        };
        let workspace = Rc::new(RefCell::new(Workspace::with_defaults("Untitled Project", "Main Scene")));
        let log = Arc::new(NotificationLog::new());
        let service = PersistenceService::new(config, Rc::clone(&workspace), log.clone(), prompt, Box::new(picker));
        Self { dir, service, workspace, log }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn populate(workspace: &mut Workspace) {
    workspace.reset_to_fresh("Skyline", "Intro");
    let mut level = Scene::new("Level 1");
    let mut hero = GameObject::new("Hero", Transform::default()).with_id("hero");
    hero.modules.push(ModuleInstance::new("SpriteRenderer", json!({ "sprite": "/sprites/hero.png", "layer": 2 })));
    let sword = GameObject::new("Sword", Transform::default()).with_id("sword");
    hero.children.push(sword);
    level.objects.push(hero);
    workspace.add_scene(level);
    assert!(workspace.set_active_scene("Level 1"));
    assert!(workspace.select(Some("sword")));

    let assets = workspace.assets_mut();
    assets.write_file("/sprites/hero.png", AssetContent::Bytes(vec![137, 80, 78, 71, 0, 1]), 10, 20).unwrap();
    assets.write_file("/notes/todo.txt", AssetContent::Text("ship it".into()), 11, 21).unwrap();
    assets.create_folder("/audio", 12, 12).unwrap();

    let settings = workspace.settings_mut();
    settings.camera.x = 64.0;
    settings.camera.zoom = 2.0;
    settings.grid.snap = true;
    settings.ui_collapse_state.insert("hierarchy".into(), json!({ "Hero": true }));
    settings.active_tab_ids = vec!["scene".into(), "assets".into()];
    workspace.mark_dirty();
}

fn save_populated(path: &Path) {
    let harness = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    populate(&mut harness.workspace.borrow_mut());
    pollster::block_on(harness.service.save_project_to(path)).expect("save");
}

fn rewrite_entry(path: &Path, entry: &str, replacement: &[u8]) {
    let bytes = std::fs::read(path).unwrap();
    let mut source = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for index in 0..source.len() {
        let mut file = source.by_index(index).unwrap();
        let name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        out.start_file(name.as_str(), zip::write::FileOptions::default()).unwrap();
        out.write_all(if name == entry { replacement } else { &data[..] }).unwrap();
    }
    std::fs::write(path, out.finish().unwrap().into_inner()).unwrap();
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn round_trip_restores_scenes_assets_and_settings() {
    let source = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    populate(&mut source.workspace.borrow_mut());
    let archive = source.path("skyline.dmproj");
    pollster::block_on(source.service.save_project_to(&archive)).expect("save");
    assert!(!source.workspace.borrow().is_dirty());

    let target = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    let report = pollster::block_on(target.service.load_project_from(&archive)).expect("load");
    assert!(report.issues.is_empty(), "unexpected issues: {:?}", report.issues);
    assert_eq!(report.scenes_restored, vec!["Intro".to_string(), "Level 1".to_string()]);

    let ws = target.workspace.borrow();
    assert_eq!(ws.project_name(), "Skyline");
    assert_eq!(ws.active_scene_name(), Some("Level 1"));
    assert_eq!(ws.selection(), Some("sword"));
    assert_eq!(ws.settings().camera.x, 64.0);
    assert_eq!(ws.settings().camera.zoom, 2.0);
    assert!(ws.settings().grid.snap);
    assert_eq!(ws.settings().active_tab_ids, vec!["scene".to_string(), "assets".to_string()]);
    assert_eq!(ws.settings().ui_collapse_state["hierarchy"], json!({ "Hero": true }));

    let entries = ws.assets().all_entries().unwrap();
    let mut paths: Vec<_> = entries.iter().filter(|e| !e.is_root()).map(|e| e.path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec!["/audio", "/notes", "/notes/todo.txt", "/sprites", "/sprites/hero.png"]);
    assert_eq!(ws.assets().read_file("/sprites/hero.png"), Some(AssetContent::Bytes(vec![137, 80, 78, 71, 0, 1])));
    assert_eq!(ws.assets().read_file("/notes/todo.txt"), Some(AssetContent::Text("ship it".into())));
    let audio = entries.iter().find(|e| e.path == "/audio").unwrap();
    assert_eq!(audio.kind, AssetKind::Folder);
    assert_eq!(audio.created_at, 12);

    let hero = ws.scene("Level 1").unwrap().find_object("hero").unwrap();
    assert_eq!(hero.modules[0].properties["sprite"], json!("/sprites/hero.png"));
    assert!(!ws.is_dirty());
    assert_eq!(target.log.count(Severity::Success), 1);
}

#[test]
fn single_flight_rejects_overlapping_operations() {
    let prompt = DeferredPrompt::default();
    let harness = Harness::new(Box::new(prompt.clone()), FixedPicker::default());
    harness.workspace.borrow_mut().mark_dirty();
    let blocked_save = harness.path("blocked.dmproj");

    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut load = Box::pin(harness.service.load_project());
    assert!(load.as_mut().poll(&mut cx).is_pending());
    assert_eq!(prompt.asked.get(), 1);
    assert!(harness.service.guard().is_held());

    let second = pollster::block_on(harness.service.save_project_to(&blocked_save));
    assert!(matches!(second, Err(OperationError::Busy)));
    assert!(!blocked_save.exists());
    assert_eq!(harness.log.count(Severity::Warn), 1);

    prompt.answer.set(Some(Decision::Cancel));
    match load.as_mut().poll(&mut cx) {
        Poll::Ready(result) => assert!(matches!(result, Err(OperationError::Cancelled))),
        Poll::Pending => panic!("load should finish once the prompt is answered"),
    }
    drop(load);
    assert!(!harness.service.guard().is_held());
    pollster::block_on(harness.service.save_project_to(&blocked_save)).expect("guard is free again");
    assert!(blocked_save.exists());
}

#[test]
fn watchdog_frees_a_wedged_operation_and_warns_once() {
    let prompt = DeferredPrompt::default();
    let harness = Harness::with_watchdog(Box::new(prompt.clone()), FixedPicker::default(), 50);
    harness.workspace.borrow_mut().mark_dirty();

    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut stuck = Box::pin(harness.service.new_project());
    assert!(stuck.as_mut().poll(&mut cx).is_pending());
    assert!(harness.service.session().guard_held());

    assert!(wait_until(|| !harness.service.session().guard_held()));
    assert!(wait_until(|| harness.log.count(Severity::Warn) == 1));
    thread::sleep(Duration::from_millis(150));
    assert_eq!(harness.log.count(Severity::Warn), 1);

    let archive = harness.path("after-timeout.dmproj");
    pollster::block_on(harness.service.save_project_to(&archive)).expect("guard available after timeout");
    assert!(archive.exists());
    drop(stuck);
    assert!(!harness.service.session().guard_held());
}

#[test]
fn corrupt_asset_is_skipped_with_one_warning() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("damaged.dmproj");
    save_populated(&archive);
    rewrite_entry(&archive, "assets/sprites/hero.png", b"not the original bytes");

    let harness = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    let report = pollster::block_on(harness.service.load_project_from(&archive)).expect("load completes");
    assert_eq!(report.skipped_assets().collect::<Vec<_>>(), vec!["/sprites/hero.png"]);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(harness.log.count(Severity::Warn), 1);

    let ws = harness.workspace.borrow();
    assert_eq!(ws.assets().read_file("/notes/todo.txt"), Some(AssetContent::Text("ship it".into())));
    assert!(ws.assets().read_file("/sprites/hero.png").is_none());
    assert_eq!(ws.scenes().len(), 2);
}

#[test]
fn missing_module_type_loads_as_degraded_scene() {
    let source = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    {
        let mut ws = source.workspace.borrow_mut();
        ws.registry_mut().register(TypeKey::module("Tilemap"), Constructor::passthrough_module());
        let mut map = GameObject::new("Map", Transform::default()).with_id("map");
        map.modules.push(ModuleInstance::new("Tilemap", json!({ "tiles": [4, 4, 7] })));
        ws.add_object("Main Scene", map);
    }
    let archive = source.path("plugin.dmproj");
    pollster::block_on(source.service.save_project_to(&archive)).expect("save");

    let target = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    let report = pollster::block_on(target.service.load_project_from(&archive)).expect("load completes");
    assert_eq!(report.resolution.stand_ins, vec!["module:Tilemap".to_string()]);
    assert_eq!(report.degraded_scenes().collect::<Vec<_>>(), vec!["Main Scene"]);

    let ws = target.workspace.borrow();
    let scene = ws.scene("Main Scene").expect("scene restored");
    assert!(scene.is_degraded());
    let map = scene.find_object("map").unwrap();
    assert_eq!(map.modules[0].properties["tiles"], json!([4, 4, 7]));
}

#[test]
fn unknown_selection_is_cleared_without_error() {
    let source = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    source.workspace.borrow_mut().settings_mut().selected_object_id = Some("ghost".into());
    let archive = source.path("ghost.dmproj");
    pollster::block_on(source.service.save_project_to(&archive)).expect("save");

    let target = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    let report = pollster::block_on(target.service.load_project_from(&archive)).expect("load completes");
    assert_eq!(report.selection, None);
    assert_eq!(report.issues, vec![RestoreIssue::SelectionCleared { id: "ghost".into() }]);
    assert_eq!(target.workspace.borrow().selection(), None);
}

#[test]
fn cancel_leaves_workspace_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let other = dir.path().join("other.dmproj");
    save_populated(&other);

    let picker = FixedPicker { save_path: None, open_path: Some(other) };
    let harness = Harness::new(Box::new(FixedPrompt(Decision::Cancel)), picker);
    {
        let mut ws = harness.workspace.borrow_mut();
        ws.add_scene(Scene::new("Draft"));
        ws.assets_mut().write_file("/draft.txt", AssetContent::Text("wip".into()), 1, 1).unwrap();
        ws.settings_mut().camera.y = -8.0;
    }
    let before = harness.service.gather_state();
    let archive_before = harness.service.session().last_archive();

    let result = pollster::block_on(harness.service.load_project());
    assert!(matches!(result, Err(OperationError::Cancelled)));

    let after = harness.service.gather_state();
    assert_eq!(serde_json::to_vec(&after.manifest().scenes).unwrap(), serde_json::to_vec(&before.manifest().scenes).unwrap());
    assert_eq!(after.assets, before.assets);
    assert_eq!(after.editor_settings, before.editor_settings);
    assert_eq!(harness.service.session().last_archive(), archive_before);
    assert!(harness.workspace.borrow().is_dirty());
    assert!(!harness.service.guard().is_held());
    assert_eq!(harness.log.messages(Severity::Info), vec!["Load cancelled".to_string()]);
}

#[test]
fn unsupported_version_leaves_a_fresh_project() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("future.dmproj");
    save_populated(&archive);
    let bytes = std::fs::read(&archive).unwrap();
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut manifest = String::new();
    zip.by_name("project.json").unwrap().read_to_string(&mut manifest).unwrap();
    let mut manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    manifest["formatVersion"] = json!("2.0.0");
    rewrite_entry(&archive, "project.json", &serde_json::to_vec(&manifest).unwrap());

    let harness = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    harness.workspace.borrow_mut().add_scene(Scene::new("Draft"));
    let result = pollster::block_on(harness.service.load_project_from(&archive));
    assert!(matches!(result, Err(OperationError::Archive(_))));

    let ws = harness.workspace.borrow();
    assert_eq!(ws.project_name(), "Untitled Project");
    assert_eq!(ws.scenes().len(), 1);
    assert_eq!(ws.active_scene_name(), Some("Main Scene"));
    assert!(!ws.is_dirty());
    assert_eq!(harness.service.session().last_archive(), None);
    assert_eq!(harness.log.count(Severity::Error), 1);
}

#[test]
fn reopen_uses_the_last_saved_archive() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("skyline.dmproj");
    {
        let first = Harness::in_dir(
            tempfile::tempdir().unwrap(),
            Box::new(FixedPrompt(Decision::Discard)),
            FixedPicker::default(),
            30_000,
        );
        let result = pollster::block_on(first.service.reopen_last_project());
        assert!(matches!(result, Err(OperationError::NoRecentProject)));
    }

    let writer = Harness::in_dir(dir, Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default(), 30_000);
    populate(&mut writer.workspace.borrow_mut());
    pollster::block_on(writer.service.save_project_to(&archive)).expect("save");
    assert_eq!(writer.service.recent_projects(), vec![archive.canonicalize().unwrap()]);

    writer.workspace.borrow_mut().reset_to_fresh("Scratch", "Main Scene");
    let report = pollster::block_on(writer.service.reopen_last_project()).expect("reopen");
    assert_eq!(report.project_name, "Skyline");
    assert_eq!(writer.workspace.borrow().project_name(), "Skyline");
}

#[test]
fn save_answer_writes_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let incoming = dir.path().join("incoming.dmproj");
    save_populated(&incoming);

    let draft = dir.path().join("draft.dmproj");
    let picker = FixedPicker { save_path: Some(draft.clone()), open_path: Some(incoming) };
    let harness = Harness::new(Box::new(FixedPrompt(Decision::Save)), picker);
    harness.workspace.borrow_mut().set_project_name("Draft Work");

    pollster::block_on(harness.service.load_project()).expect("load after saving");
    assert!(draft.exists());
    assert_eq!(harness.workspace.borrow().project_name(), "Skyline");
    assert_eq!(harness.log.count(Severity::Success), 2);
    assert!(!harness.service.guard().is_held());
}

#[test]
fn plugin_module_with_an_unusual_name_still_loads() {
    let source = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    {
        let mut ws = source.workspace.borrow_mut();
        ws.registry_mut().register(TypeKey::module("my-plugin"), Constructor::passthrough_module());
        let mut emitter = GameObject::new("Emitter", Transform::default()).with_id("emitter");
        emitter.modules.push(ModuleInstance::new("my-plugin", json!({ "rate": 12 })));
        ws.add_object("Main Scene", emitter);
    }
    let archive = source.path("odd-plugin.dmproj");
    pollster::block_on(source.service.save_project_to(&archive)).expect("save");

    let target = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    let report = pollster::block_on(target.service.load_project_from(&archive)).expect("load completes");
    assert_eq!(report.resolution.stand_ins, vec!["module:my-plugin".to_string()]);
    assert_eq!(report.scenes_restored, vec!["Main Scene".to_string()]);
    let ws = target.workspace.borrow();
    let emitter = ws.scene("Main Scene").unwrap().find_object("emitter").expect("object restored");
    assert_eq!(emitter.modules[0].properties, json!({ "rate": 12 }));
}

#[test]
fn modules_saved_half_configured_survive_a_round_trip() {
    let source = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    {
        let mut ws = source.workspace.borrow_mut();
        let mut npc = GameObject::new("Npc", Transform::default()).with_id("npc");
        npc.modules.push(ModuleInstance::new("Script", json!({})));
        npc.modules.push(ModuleInstance::new("BoxCollider", json!({ "width": -4 })));
        ws.add_object("Main Scene", npc);
    }
    let archive = source.path("draft.dmproj");
    pollster::block_on(source.service.save_project_to(&archive)).expect("save");

    let target = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    let report = pollster::block_on(target.service.load_project_from(&archive)).expect("load completes");
    assert!(report.issues.is_empty(), "unexpected issues: {:?}", report.issues);
    assert_eq!(target.log.count(Severity::Warn), 0);
    let ws = target.workspace.borrow();
    let npc = ws.scene("Main Scene").unwrap().find_object("npc").expect("object restored");
    assert_eq!(npc.modules[0].type_name, "Script");
    assert_eq!(npc.modules[1].properties["width"], json!(-4));
}

#[test]
fn reopen_forgets_an_archive_that_was_removed() {
    let harness = Harness::new(Box::new(FixedPrompt(Decision::Discard)), FixedPicker::default());
    let archive = harness.path("gone.dmproj");
    pollster::block_on(harness.service.save_project_to(&archive)).expect("save");
    std::fs::remove_file(&archive).unwrap();

    let result = pollster::block_on(harness.service.reopen_last_project());
    assert!(matches!(result, Err(OperationError::NoRecentProject)));
    assert!(harness.service.recent_projects().is_empty());
    let again = pollster::block_on(harness.service.reopen_last_project());
    assert!(matches!(again, Err(OperationError::NoRecentProject)));
}
