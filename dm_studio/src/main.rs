use anyhow::{anyhow, Result};
use dm_engine::config::{PersistenceConfig, PersistenceOverrides, DEFAULT_CONFIG_PATH};
use dm_studio::gate::{Decision, DiscardPrompt, PromptFuture};
use dm_studio::notify::ConsoleNotifier;
use dm_studio::service::{FixedPicker, PersistenceService};
use dm_studio::workspace::Workspace;
use std::cell::RefCell;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Action {
    New(String),
    Load(PathBuf),
    Reopen,
    Save,
    SaveAs(PathBuf),
}

#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    overrides: PersistenceOverrides,
    actions: Vec<Action>,
}

/// Reads Save/Discard/Cancel from stdin.
struct StdinPrompt;

impl DiscardPrompt for StdinPrompt {
    fn ask<'a>(&'a self, active_scene: &'a str) -> PromptFuture<'a, Decision> {
        Box::pin(async move {
            print!("'{active_scene}' has unsaved changes. [s]ave, [d]iscard or [c]ancel? ");
            if io::stdout().flush().is_err() {
                return Decision::Cancel;
            }
            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line).is_err() {
                return Decision::Cancel;
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "s" | "save" => Decision::Save,
                "d" | "discard" => Decision::Discard,
                _ => Decision::Cancel,
            }
        })
    }
}

fn main() {
    env_logger::init();
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("[cli] {err}");
            print_usage();
            std::process::exit(2);
        }
    };
    if args.actions.is_empty() {
        print_usage();
        return;
    }
    if let Err(err) = pollster::block_on(run(args)) {
        eprintln!("[studio] {err}");
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!(
        "dm_studio (headless)

Usage:
  dm_studio [--config <path>] [--no-reminder] <actions...>

Actions run in order:
  --new <name>         Start a new project named <name>
  --load <archive>     Load a project archive
  --reopen             Load the most recently opened archive
  --save               Save to the current archive
  --save-as <archive>  Save to <archive>
"
    );
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(flag) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| anyhow!("Expected a value after {name}"));
        match flag.as_str() {
            "--config" => parsed.config_path = Some(PathBuf::from(value("--config")?)),
            "--no-reminder" => parsed.overrides.reminder_enabled = Some(false),
            "--new" => parsed.actions.push(Action::New(value("--new")?)),
            "--load" => parsed.actions.push(Action::Load(PathBuf::from(value("--load")?))),
            "--reopen" => parsed.actions.push(Action::Reopen),
            "--save" => parsed.actions.push(Action::Save),
            "--save-as" => parsed.actions.push(Action::SaveAs(PathBuf::from(value("--save-as")?))),
            other => return Err(anyhow!("Unknown flag '{other}'")),
        }
    }
    Ok(parsed)
}

async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = PersistenceConfig::load_or_default(&config_path);
    if !args.overrides.is_empty() {
        config.apply_overrides(&args.overrides);
    }
    let workspace =
        Rc::new(RefCell::new(Workspace::with_defaults(&config.default_project_name, &config.default_scene_name)));
    let service = PersistenceService::new(
        config,
        Rc::clone(&workspace),
        Arc::new(ConsoleNotifier),
        Box::new(StdinPrompt),
        Box::new(FixedPicker::default()),
    );
    let _reminder = service.start_reminder();

    let mut failures = 0usize;
    for action in args.actions {
        let result = match &action {
            Action::New(name) => service.new_project().await.map(|()| {
                workspace.borrow_mut().set_project_name(name.clone());
            }),
            Action::Load(path) => service.load_project_from(path).await.map(|_| ()),
            Action::Reopen => service.reopen_last_project().await.map(|_| ()),
            Action::Save => service.save_project().await,
            Action::SaveAs(path) => service.save_project_to(path).await,
        };
        if let Err(err) = result {
            if !err.is_cancelled() {
                failures += 1;
            }
        }
    }

    let ws = workspace.borrow();
    println!(
        "Project '{}': {} scene(s), active '{}'{}",
        ws.project_name(),
        ws.scenes().len(),
        ws.active_scene_name().unwrap_or("-"),
        if ws.is_dirty() { " (unsaved changes)" } else { "" }
    );
    if failures > 0 {
        return Err(anyhow!("{failures} action(s) failed"));
    }
    Ok(())
}
