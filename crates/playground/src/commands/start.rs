use super::recipe_with_flags;
use crate::{StartArgs, signals, tables};
use anyhow::{Context, Result, bail};
use async_channel::Receiver;
use futures_lite::future;
use playground_artifacts::ArtifactsBuilder;
use playground_manifest::{ContenderConfig, ExContext, LogLevel, MANIFEST_FILE, Output, home_dir};
use playground_recipes::{ComponentRegistry, Recipe, prepare};
use playground_runner::{ContainerRuntime, DockerCli, LocalRunner, RunnerConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Session directory under the home directory when `--output` is not given
const DEFAULT_SESSION_DIR: &str = "devnet";

pub async fn run(args: StartArgs, log_level: LogLevel) -> Result<()> {
    let (recipe, flags) = recipe_with_flags(&args.recipe, &args.flags)?;
    let dir = session_dir(args.output.as_deref())?;
    let output = Output::new(&dir)
        .with_context(|| format!("Failed to create session directory {}", dir.display()))?;

    let builder = artifacts_builder(&args);
    let ex = ExContext {
        log_level,
        contender: ContenderConfig {
            enabled: args.contender,
            extra_args: args.contender_args.clone(),
        },
        ..ExContext::default()
    };

    info!("Preparing recipe {} in {}", recipe.name(), output.dir().display());
    let prepared = {
        let (recipe, output) = (recipe.clone(), output.clone());
        smol::unblock(move || {
            prepare(&recipe, &flags, builder, ex, &output, &ComponentRegistry::builtin())
        })
        .await
        .context("Failed to prepare the session")?
    };

    let mut config = RunnerConfig::new()
        .with_bind_locally(args.bind_locally)
        .with_keep_volumes(args.keep_volumes);
    if let Some(platform) = &args.platform {
        config = config.with_platform(platform.clone());
    }
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new());
    let runner = LocalRunner::prepare(prepared.manifest, output, runtime, config)
        .await
        .context("Failed to prepare the runner")?;

    println!("Session {} in {}", runner.manifest().id, runner.output().dir().display());
    println!("{}", tables::services(runner.manifest()));
    if args.dry_run {
        println!("Dry run: wrote {}", runner.compose_file().display());
        return Ok(());
    }

    let signals = signals::install()?;
    let result = supervise(&runner, recipe.as_ref(), args.watchdog, &signals).await;
    if result.is_err() {
        error!("Session {} failed, tearing down", runner.manifest().id);
    }
    let stopped = shutdown(&runner, &signals).await;
    result?;
    stopped
}

fn artifacts_builder(args: &StartArgs) -> ArtifactsBuilder {
    let mut builder = ArtifactsBuilder::new().with_latest_fork(args.latest_fork);
    if let Some(delay) = args.genesis_delay {
        builder = builder.with_genesis_delay(delay);
    }
    if let Some(block_time) = args.block_time {
        builder = builder.with_block_time(block_time);
    }
    args.prefund
        .iter()
        .fold(builder, |builder, key| builder.with_prefunded_key(key.clone()))
}

/// Resolve the session directory, clearing a previous session left in it
fn session_dir(requested: Option<&Path>) -> Result<PathBuf> {
    let dir = match requested {
        Some(dir) => dir.to_path_buf(),
        None => home_dir()?.join(DEFAULT_SESSION_DIR),
    };
    if !dir.exists() || std::fs::read_dir(&dir)?.next().is_none() {
        return Ok(dir);
    }
    if !dir.join(MANIFEST_FILE).is_file() {
        bail!("{} is not empty and holds no playground session", dir.display());
    }
    warn!("Removing previous session in {}", dir.display());
    std::fs::remove_dir_all(&dir)
        .with_context(|| format!("Failed to clear {}", dir.display()))?;
    Ok(dir)
}

/// Resolves on the next signal; never resolves if the signal thread is gone
async fn interrupted(signals: &Receiver<i32>) {
    if signals.recv().await.is_err() {
        future::pending::<()>().await;
    }
}

/// Start the session and run it until a signal or a session-fatal error
async fn supervise(
    runner: &LocalRunner,
    recipe: &dyn Recipe,
    watchdog: bool,
    signals: &Receiver<i32>,
) -> Result<()> {
    let stop_requested = || async {
        interrupted(signals).await;
        info!("Interrupted");
        Ok::<_, playground_runner::Error>(false)
    };

    let started = future::or(async { runner.start().await.map(|()| true) }, stop_requested())
        .await
        .context("Failed to start the session")?;
    if !started {
        return Ok(());
    }
    let ready = future::or(async { runner.wait_for_ready().await.map(|()| true) }, stop_requested())
        .await
        .context("Session did not become ready")?;
    if !ready {
        return Ok(());
    }

    println!("{}", tables::endpoints(&recipe.output(runner.manifest())));
    println!("Session is ready. Press Ctrl+C to stop.");

    let watch = async {
        if watchdog {
            runner.run_watchdogs().await?;
            info!("All watchdogs finished");
        }
        future::pending::<playground_runner::Result<bool>>().await
    };
    let exit = async { Err::<bool, _>(runner.wait_for_exit().await) };
    future::or(future::or(watch, exit), stop_requested())
        .await
        .context("Session failed")?;
    Ok(())
}

/// Graceful teardown; a second signal escalates to a force kill
async fn shutdown(runner: &LocalRunner, signals: &Receiver<i32>) -> Result<()> {
    println!("Stopping session {}... (Ctrl+C again to force)", runner.manifest().id);
    let graceful = async { runner.stop().await.context("Failed to stop the session") };
    let forced = async {
        interrupted(signals).await;
        warn!("Second interrupt, force killing session {}", runner.manifest().id);
        runner.force_kill().await.context("Failed to kill the session")
    };
    future::or(graceful, forced).await?;
    println!("✓ Session {} stopped", runner.manifest().id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_dir_clears_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("devnet");
        std::fs::create_dir_all(session.join("logs")).unwrap();
        std::fs::write(session.join(MANIFEST_FILE), "{}").unwrap();

        assert_eq!(session_dir(Some(&session)).unwrap(), session);
        assert!(!session.exists());
    }

    #[test]
    fn test_session_dir_keeps_foreign_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "mine").unwrap();

        let err = session_dir(Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("holds no playground session"));
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_session_dir_accepts_empty_or_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(session_dir(Some(dir.path())).unwrap(), dir.path());
        let missing = dir.path().join("new");
        assert_eq!(session_dir(Some(&missing)).unwrap(), missing);
    }
}
