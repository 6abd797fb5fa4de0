mod args;
mod report;
mod script;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use stratum_core::config::load_or_default;
use stratum_core::engine::LayerEngine;
use stratum_core::scene::MemoryScene;
use stratum_core::snapshot::Snapshot;
use stratum_store::{FileSystemStore, SaveStatus, SnapshotPersistence, SnapshotStore, poll_now};

use args::{Cli, Command};
use script::{Script, ScriptRunner};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Replay {
            script,
            config,
            out,
            key,
            resume,
            dry_run,
        } => replay(&script, &config, out.as_deref(), key, resume, dry_run).await,
        Command::Inspect { snapshot, objects } => inspect(&snapshot, objects),
        Command::Validate { snapshot } => validate(&snapshot),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            log::error!("{msg}");
            ExitCode::FAILURE
        }
    }
}

async fn replay(
    script_path: &Path,
    config_path: &Path,
    out: Option<&Path>,
    key: Option<String>,
    resume: bool,
    dry_run: bool,
) -> Result<(), String> {
    let config = load_or_default(config_path);
    let script = Script::load(script_path).map_err(|e| e.to_string())?;

    let root = out.unwrap_or(config.storage.root.as_path());
    let store = FileSystemStore::new(root);
    let key = key.unwrap_or_else(|| config.autosave.key.clone());
    let persistence = SnapshotPersistence::new(Arc::new(store), key).map_err(|e| e.to_string())?;

    let mut engine = LayerEngine::new(MemoryScene::default(), &config);
    if resume {
        if persistence.restore_into(&mut engine).await {
            log::info!(
                "Resumed from '{}' ({} layers)",
                persistence.key(),
                engine.model().len()
            );
        } else {
            log::info!("Nothing stored under '{}', starting empty", persistence.key());
        }
    }

    let mut runner = ScriptRunner::new();
    let report = runner.run(&mut engine, &script).await;
    print!("{}", report::replay_summary(&report, engine.diagnostics()));

    if dry_run {
        println!("dry run, nothing saved");
        return Ok(());
    }
    match persistence.save_engine(&mut engine).await {
        SaveStatus::Saved => {
            println!("saved '{}' to {}", persistence.key(), root.display());
            Ok(())
        }
        status => Err(format!("save {status}")),
    }
}

/// Reads `<dir>/<key>.json` through a filesystem store rooted at `<dir>`.
fn read_snapshot(path: &Path) -> Result<Snapshot, String> {
    let key = path
        .extension()
        .filter(|ext| *ext == "json")
        .and(path.file_stem())
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| format!("{}: expected a .json snapshot file", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let store = FileSystemStore::new(dir);
    let bytes = poll_now(store.read(key)).map_err(|e| format!("{}: {e}", path.display()))?;
    Snapshot::from_slice(&bytes).map_err(|e| format!("{}: {e}", path.display()))
}

fn inspect(path: &Path, objects: bool) -> Result<(), String> {
    let snapshot = read_snapshot(path)?;
    print!("{}", report::snapshot_summary(&snapshot, objects));
    Ok(())
}

fn validate(path: &Path) -> Result<(), String> {
    let snapshot = read_snapshot(path)?;
    snapshot
        .validate()
        .map_err(|e| format!("{}: {e}", path.display()))?;
    println!("{}: ok ({} layers)", path.display(), snapshot.layers.len());
    Ok(())
}
