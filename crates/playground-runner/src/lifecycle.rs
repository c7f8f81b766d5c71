//! Lifecycle-hook services.
//!
//! Instead of a binary these services declare shell commands: `init` runs
//! sequentially before start, `start` is the long-running process and `stop`
//! runs on teardown.

use crate::error::failure_report;
use crate::host::{HostCommand, host_rewrites, rewrite_paths, wait_for_dependencies};
use crate::runner::Session;
use crate::state::TaskStatus;
use crate::{Error, Result};
use playground_manifest::{Manifest, Output, Service};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

fn working_dir(service: &Service, output: &Output) -> PathBuf {
    service
        .recipe_dir
        .clone()
        .unwrap_or_else(|| output.dir().to_path_buf())
}

fn hook_env(manifest: &Manifest, service: &Service, output: &Output) -> Result<BTreeMap<String, String>> {
    let rewrites = host_rewrites(service, output);
    Ok(manifest
        .resolve_env(service)?
        .into_iter()
        .map(|(k, v)| (k, rewrite_paths(&v, &rewrites)))
        .collect())
}

/// Run the `init` commands in order, failing on the first non-zero exit
pub async fn run_init(manifest: &Manifest, service: &Service, output: &Output) -> Result<()> {
    let env = hook_env(manifest, service, output)?;
    let cwd = working_dir(service, output);
    let log = output.log_path(&service.name);

    for script in &service.lifecycle.init {
        let command = HostCommand::shell(script, env.clone(), cwd.clone(), log.clone());
        info!("{}: init {}", service.name, script);
        let status = command.spawn()?.status().await?;
        if !status.success() {
            let headline = format!("Init hook of {} exited with {}", service.name, status);
            return Err(Error::Lifecycle(failure_report(
                &headline,
                &service.name,
                Some(script),
                &log,
            )));
        }
    }
    Ok(())
}

/// Wait for dependencies, run `init`, then launch `start` and watch it.
///
/// Returns the supervising task of the `start` process, if one is declared.
pub async fn start_lifecycle_service(session: &Session, service: &Service) -> Result<Option<smol::Task<()>>> {
    wait_for_dependencies(session, service).await?;
    run_init(&session.manifest, service, &session.output).await?;

    let Some(script) = &service.lifecycle.start else {
        session.state.update_status(&service.name, TaskStatus::Started);
        return Ok(None);
    };
    let command = HostCommand::shell(
        script,
        hook_env(&session.manifest, service, &session.output)?,
        working_dir(service, &session.output),
        session.output.log_path(&service.name),
    );
    info!("{}: start {}", service.name, script);
    let child = command.spawn()?;
    Ok(Some(crate::host::supervise(session, &service.name, child, &command)))
}

/// Run every `stop` command of every lifecycle service.
///
/// Failures are logged and never stop the remaining commands.
pub async fn run_stop_hooks(manifest: &Manifest, output: &Output) {
    for service in manifest.lifecycle_services() {
        let env = match hook_env(manifest, service, output) {
            Ok(env) => env,
            Err(e) => {
                warn!("{}: cannot resolve env for stop hooks: {}", service.name, e);
                BTreeMap::new()
            }
        };
        let cwd = working_dir(service, output);
        let log = output.log_path(&service.name);

        for script in &service.lifecycle.stop {
            info!("{}: stop {}", service.name, script);
            let command = HostCommand::shell(script, env.clone(), cwd.clone(), log.clone());
            let status = match command.spawn() {
                Ok(mut child) => child.status().await.map_err(Error::from),
                Err(e) => Err(e),
            };
            match status {
                Ok(status) if status.success() => {}
                Ok(status) => warn!("{}: stop hook '{}' exited with {}", service.name, script, status),
                Err(e) => warn!("{}: stop hook '{}' failed: {}", service.name, script, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playground_manifest::{ComponentTree, ExContext};

    fn manifest(service: Service) -> Manifest {
        let mut tree = ComponentTree::new("test");
        let root = tree.root();
        tree.add_service(root, service);
        Manifest::from_tree("s", "test", ExContext::default(), &tree).unwrap()
    }

    fn lifecycle(name: &str, init: &[&str], start: Option<&str>, stop: &[&str]) -> Service {
        let mut service = Service::new(name);
        service.lifecycle_hooks = true;
        service.lifecycle.init = init.iter().map(|s| s.to_string()).collect();
        service.lifecycle.start = start.map(String::from);
        service.lifecycle.stop = stop.iter().map(|s| s.to_string()).collect();
        service
    }

    #[smol_potat::test]
    async fn test_init_runs_in_order_in_recipe_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = Output::new(dir.path().join("out")).unwrap();
        let mut service = lifecycle("hooks", &["echo one > x", "echo two >> x"], None, &[]);
        service.recipe_dir = Some(dir.path().to_path_buf());
        let manifest = manifest(service);

        run_init(&manifest, &manifest.services[0], &output).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("x")).unwrap(), "one\ntwo\n");
    }

    #[smol_potat::test]
    async fn test_failing_init_reports_log_tail() {
        let dir = tempfile::tempdir().unwrap();
        let output = Output::new(dir.path()).unwrap();
        let manifest = manifest(lifecycle(
            "hooks",
            &["echo preparing", "echo broken >&2; exit 3", "echo never"],
            None,
            &[],
        ));

        let err = run_init(&manifest, &manifest.services[0], &output).await.unwrap_err();
        let report = match err {
            Error::Lifecycle(report) => report,
            other => panic!("unexpected error {other:?}"),
        };
        assert!(report.contains("command: echo broken >&2; exit 3"));
        assert!(report.contains(&output.log_path("hooks").display().to_string()));
        assert!(report.contains("broken"));
        assert!(!report.contains("never"));
    }

    #[smol_potat::test]
    async fn test_stop_hooks_do_not_short_circuit() {
        let dir = tempfile::tempdir().unwrap();
        let output = Output::new(dir.path()).unwrap();
        let marker = dir.path().join("stopped");
        let manifest = manifest(lifecycle(
            "hooks",
            &["true"],
            None,
            &["exit 1", &format!("touch {}", marker.display())],
        ));

        run_stop_hooks(&manifest, &output).await;
        assert!(marker.exists());
    }
}
