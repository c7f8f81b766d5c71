//! The local runner: docker compose for containers, child processes for host
//! services.
//!
//! A session goes through [`LocalRunner::prepare`] (ports, manifest, compose
//! file), [`LocalRunner::start`] (pulls, compose up, host services),
//! [`LocalRunner::wait_for_ready`] and finally [`LocalRunner::stop`]. Any
//! container death or non-zero host exit after start is published once on
//! the session's [`ExitSignal`].

use crate::compose::{COMPOSE_FILE, write_compose};
use crate::config::RunnerConfig;
use crate::error::failure_report;
use crate::host::{self, probe_until_ready, signal_process};
use crate::lifecycle;
use crate::ports::PortReserver;
use crate::pull::{ImagePuller, PullEvent};
use crate::runtime::{ContainerEvent, ContainerInfo, ContainerRuntime, EventKind};
use crate::state::{ExitSignal, StateActor, StateHandle, TaskStatus};
use crate::watchdog;
use crate::{Error, Result};
use async_channel::Receiver;
use futures::lock::Mutex;
use futures::stream::{BoxStream, StreamExt};
use futures_lite::io::AsyncWriteExt;
use nix::sys::signal::Signal;
use playground_manifest::{LOGS_DIR, Manifest, Output, Service};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything the background tasks of a session share
pub(crate) struct Session {
    pub(crate) manifest: Manifest,
    pub(crate) output: Output,
    pub(crate) config: RunnerConfig,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) state: StateHandle,
    pub(crate) exit: ExitSignal,
}

impl Session {
    fn has_containers(&self) -> bool {
        self.manifest.container_services().next().is_some()
    }

    fn compose_file(&self) -> PathBuf {
        self.output.path(COMPOSE_FILE)
    }
}

/// Runs one session on the local machine
pub struct LocalRunner {
    session: Arc<Session>,
    _actor: smol::Task<()>,
    tasks: Mutex<Vec<smol::Task<()>>>,
}

impl LocalRunner {
    /// Reserve host ports, rewrite `manifest.json` and emit the compose file
    pub async fn prepare(
        mut manifest: Manifest,
        output: Output,
        runtime: Arc<dyn ContainerRuntime>,
        config: RunnerConfig,
    ) -> Result<Self> {
        let mut reserver = PortReserver::new(config.bind_locally);
        reserver.reserve_manifest(&mut manifest).await?;
        manifest.save(&output)?;
        let compose = write_compose(&manifest, &output, &config)?;
        output.create_dir(LOGS_DIR)?;
        info!("Wrote {}", compose.display());

        let (actor, state) = StateActor::new(&manifest);
        let session = Session {
            manifest,
            output,
            config,
            runtime,
            state,
            exit: ExitSignal::new(),
        };
        Ok(Self {
            session: Arc::new(session),
            _actor: smol::spawn(actor.run()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Manifest with reserved host ports
    pub fn manifest(&self) -> &Manifest {
        &self.session.manifest
    }

    /// Session directory
    pub fn output(&self) -> &Output {
        &self.session.output
    }

    /// Path of the compose document
    pub fn compose_file(&self) -> PathBuf {
        self.session.compose_file()
    }

    /// Handle on the session state
    pub fn state(&self) -> &StateHandle {
        &self.session.state
    }

    /// Pull images, bring the compose project up and launch host services.
    ///
    /// Host and lifecycle services start in the background; their failures
    /// surface through [`wait_for_ready`](Self::wait_for_ready).
    pub async fn start(&self) -> Result<()> {
        let session = &self.session;
        let mut tasks = Vec::new();

        let images: Vec<String> = session
            .manifest
            .container_services()
            .filter_map(Service::image_ref)
            .collect();
        let (pull_tx, pull_rx) = async_channel::unbounded();
        tasks.push(smol::spawn(forward_pull_events(pull_rx, session.clone())));
        ImagePuller::new(session.runtime.clone(), session.config.pull_parallelism)
            .with_platform(session.config.platform.clone())
            .with_events(pull_tx)
            .pull_all(images)
            .await?;

        if session.has_containers() {
            let events = session.runtime.events(&session.manifest.id).await?;
            tasks.push(smol::spawn(event_loop(events, session.clone())));
            session
                .runtime
                .compose_up(&session.manifest.id, &session.compose_file())
                .await?;

            for container in session.runtime.containers(&session.manifest.id).await? {
                let log = session.output.log_path(&container.service);
                tasks.push(smol::spawn(pump_logs(session.runtime.clone(), container, log)));
            }
        }

        for service in session.manifest.services.iter().filter(|s| s.runs_on_host()) {
            tasks.push(smol::spawn(run_host_service(session.clone(), service.name.clone())));
        }

        self.tasks.lock().await.extend(tasks);
        Ok(())
    }

    /// Resolve once every service is ready and every ready hook passed, or
    /// with the first session-fatal error
    pub async fn wait_for_ready(&self) -> Result<()> {
        let session = &self.session;
        let failed = || async { Err(session.exit.wait().await) };

        futures_lite::future::or(
            async {
                session.state.subscribe().await;
                Ok(())
            },
            failed(),
        )
        .await?;
        futures_lite::future::or(watchdog::run_ready_hooks(&session.manifest), failed()).await
    }

    /// Wait for the error that ends the session
    pub async fn wait_for_exit(&self) -> Error {
        self.session.exit.wait().await
    }

    /// Run the watchdogs of the session until one fails
    pub async fn run_watchdogs(&self) -> Result<()> {
        watchdog::run_watchdogs(&self.session.manifest).await
    }

    /// Teardown: kill host processes, bring the project down and run lifecycle
    /// stop hooks
    pub async fn stop(&self) -> Result<()> {
        let session = &self.session;
        session.exit.begin_stop();
        info!("Stopping session {}", session.manifest.id);

        for handle in session.state.handles().await {
            signal_process(&handle, Signal::SIGKILL);
        }
        let result = teardown(
            &session.manifest,
            &session.output,
            session.runtime.as_ref(),
            session.config.keep_volumes,
        )
        .await;
        self.tasks.lock().await.clear();
        result
    }

    /// SIGKILL host processes and every container of the session
    pub async fn force_kill(&self) -> Result<()> {
        let session = &self.session;
        session.exit.begin_stop();
        warn!("Force killing session {}", session.manifest.id);

        for handle in session.state.handles().await {
            signal_process(&handle, Signal::SIGKILL);
        }
        session.runtime.kill_session(&session.manifest.id).await
    }
}

/// Bring a session's compose project down and run its lifecycle stop hooks.
///
/// Works on a rehydrated manifest; the stop hooks run even when compose fails.
pub async fn teardown(
    manifest: &Manifest,
    output: &Output,
    runtime: &dyn ContainerRuntime,
    keep_volumes: bool,
) -> Result<()> {
    let down = if manifest.container_services().next().is_some() {
        runtime
            .compose_down(&manifest.id, &output.path(COMPOSE_FILE), keep_volumes)
            .await
    } else {
        Ok(())
    };
    if let Err(e) = &down {
        error!("Failed to bring {} down: {}", manifest.id, e);
    }
    lifecycle::run_stop_hooks(manifest, output).await;
    down
}

async fn forward_pull_events(events: Receiver<PullEvent>, session: Arc<Session>) {
    while let Ok(event) = events.recv().await {
        let (image, status) = match &event {
            PullEvent::Pulling(image) => (image, TaskStatus::Pulling),
            PullEvent::Pulled(image) => (image, TaskStatus::Pulled),
        };
        for service in session
            .manifest
            .container_services()
            .filter(|s| s.image_ref().as_deref() == Some(image.as_str()))
        {
            session.state.update_status(&service.name, status);
        }
    }
}

async fn event_loop(mut events: BoxStream<'static, ContainerEvent>, session: Arc<Session>) {
    while let Some(event) = events.next().await {
        let ContainerEvent { service, kind } = event;
        match kind {
            EventKind::Start => session.state.update_status(&service, TaskStatus::Started),
            EventKind::Healthy => session.state.update_status(&service, TaskStatus::Healthy),
            EventKind::Unhealthy => {
                warn!("{} is unhealthy", service);
                session.state.update_status(&service, TaskStatus::Unhealthy);
            }
            EventKind::Die { exit_code } => {
                session.state.update_status(&service, TaskStatus::Die);
                if session.exit.is_stopping() {
                    continue;
                }
                let code = exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
                let headline = format!("Container {} exited with code {}", service, code);
                let log = session.output.log_path(&service);
                session
                    .exit
                    .fail(Error::ServiceDied(failure_report(&headline, &service, None, &log)));
            }
        }
    }
    debug!("Event stream of {} ended", session.manifest.id);
}

async fn pump_logs(runtime: Arc<dyn ContainerRuntime>, container: ContainerInfo, path: PathBuf) {
    if let Err(e) = try_pump_logs(runtime.as_ref(), &container, &path).await {
        debug!("Log pump of {} stopped: {}", container.service, e);
    }
}

async fn try_pump_logs(
    runtime: &dyn ContainerRuntime,
    container: &ContainerInfo,
    path: &Path,
) -> Result<()> {
    let mut lines = runtime.logs(&container.id).await?;
    let mut file = async_fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    while let Some(line) = lines.next().await {
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
    }
    Ok(())
}

async fn run_host_service(session: Arc<Session>, name: String) {
    let Some(service) = session.manifest.service(&name) else {
        return;
    };
    let started = if service.is_lifecycle() {
        lifecycle::start_lifecycle_service(&session, service).await
    } else {
        host::start_host_service(&session, service).await.map(Some)
    };

    match started {
        Ok(supervisor) => {
            probe_until_ready(&session, service).await;
            if let Some(supervisor) = supervisor {
                supervisor.await;
            }
        }
        Err(Error::Stopped) => {}
        Err(e) => {
            error!("Failed to start {}: {}", name, e);
            session.exit.fail(e);
        }
    }
}
