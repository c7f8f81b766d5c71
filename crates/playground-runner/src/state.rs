//! Session state owned by a single task.
//!
//! Status updates, readiness bits and host-process handles are mutated only
//! by the [`StateActor`]. Everyone else talks to it through a cloneable
//! [`StateHandle`] that sends typed commands.

use crate::Error;
use async_channel::{Receiver, Sender};
use playground_manifest::Manifest;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Last known status of a service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskStatus {
    /// Nothing happened yet
    #[default]
    Pending,
    /// Image is being pulled
    Pulling,
    /// Image pull finished
    Pulled,
    /// Container or process started
    Started,
    /// Ready check passed
    Healthy,
    /// Ready check failed
    Unhealthy,
    /// Container or process exited
    Die,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Pulling => "pulling",
            TaskStatus::Pulled => "pulled",
            TaskStatus::Started => "started",
            TaskStatus::Healthy => "healthy",
            TaskStatus::Unhealthy => "unhealthy",
            TaskStatus::Die => "exited",
        };
        write!(f, "{}", s)
    }
}

/// Point-in-time view of one service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskState {
    /// Last status
    pub status: TaskStatus,
    /// The container is up, or the host process was launched
    pub started: bool,
    /// The ready check passes
    pub healthy: bool,
    /// The service declares a ready check
    pub has_ready_check: bool,
    /// The service runs as a host process
    pub on_host: bool,
}

impl TaskState {
    fn is_ready(&self) -> bool {
        self.started && (!self.has_ready_check || self.healthy)
    }
}

/// A process spawned on the host for a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostHandle {
    /// Owning service
    pub service: String,
    /// Process id
    pub pid: u32,
}

enum Command {
    Subscribe(Sender<()>),
    UpdateStatus { service: String, status: TaskStatus },
    AddHandle(HostHandle),
    RecordReadiness { service: String, healthy: bool },
    Query { service: String, reply: Sender<Option<TaskState>> },
    Snapshot(Sender<BTreeMap<String, TaskState>>),
    Handles(Sender<Vec<HostHandle>>),
}

/// The task owning the session state
pub struct StateActor {
    commands: Receiver<Command>,
    tasks: BTreeMap<String, TaskState>,
    handles: Vec<HostHandle>,
    waiters: Vec<Sender<()>>,
    ready: bool,
}

impl StateActor {
    /// Create the actor and its handle for the services of a manifest
    pub fn new(manifest: &Manifest) -> (Self, StateHandle) {
        let (tx, rx) = async_channel::unbounded();
        let tasks = manifest
            .services
            .iter()
            .map(|s| {
                let state = TaskState {
                    has_ready_check: s.ready_check.is_some(),
                    on_host: s.runs_on_host(),
                    ..Default::default()
                };
                (s.name.clone(), state)
            })
            .collect();
        let actor = Self { commands: rx, tasks, handles: Vec::new(), waiters: Vec::new(), ready: false };
        (actor, StateHandle { commands: tx })
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self) {
        while let Ok(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!("State actor stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe(waiter) => {
                self.waiters.push(waiter);
            }
            Command::UpdateStatus { service, status } => {
                let Some(task) = self.tasks.get_mut(&service) else {
                    debug!("Ignoring status {} of unknown service {}", status, service);
                    return;
                };
                task.status = status;
                match status {
                    TaskStatus::Started => task.started = true,
                    TaskStatus::Healthy => {
                        task.started = true;
                        task.healthy = true;
                    }
                    TaskStatus::Unhealthy => task.healthy = false,
                    // A host process may exit 0 once done; a non-zero exit
                    // ends the session through the exit signal instead
                    TaskStatus::Die if task.on_host => {}
                    TaskStatus::Die => {
                        task.started = false;
                        task.healthy = false;
                    }
                    TaskStatus::Pending | TaskStatus::Pulling | TaskStatus::Pulled => {}
                }
                debug!("{} is {}", service, status);
            }
            Command::AddHandle(handle) => self.handles.push(handle),
            Command::RecordReadiness { service, healthy } => {
                if let Some(task) = self.tasks.get_mut(&service) {
                    task.healthy = healthy;
                    if healthy {
                        task.status = TaskStatus::Healthy;
                    }
                }
            }
            Command::Query { service, reply } => {
                let _ = reply.try_send(self.tasks.get(&service).copied());
            }
            Command::Snapshot(reply) => {
                let _ = reply.try_send(self.tasks.clone());
            }
            Command::Handles(reply) => {
                let _ = reply.try_send(self.handles.clone());
            }
        }
        self.check_ready();
    }

    fn check_ready(&mut self) {
        if self.ready {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.try_send(());
            }
            return;
        }
        if self.tasks.values().all(TaskState::is_ready) {
            self.ready = true;
            info!("All services are ready");
            for waiter in self.waiters.drain(..) {
                let _ = waiter.try_send(());
            }
        }
    }
}

/// Cloneable sender of state commands
#[derive(Clone)]
pub struct StateHandle {
    commands: Sender<Command>,
}

impl StateHandle {
    fn send(&self, command: Command) {
        let _ = self.commands.try_send(command);
    }

    async fn ask<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = async_channel::bounded(1);
        self.send(make(tx));
        rx.recv().await.ok()
    }

    /// Record a status change
    pub fn update_status(&self, service: &str, status: TaskStatus) {
        self.send(Command::UpdateStatus { service: service.to_string(), status });
    }

    /// Record the outcome of a ready probe run by the supervisor
    pub fn record_readiness(&self, service: &str, healthy: bool) {
        self.send(Command::RecordReadiness { service: service.to_string(), healthy });
    }

    /// Track a host process for teardown
    pub fn add_handle(&self, handle: HostHandle) {
        self.send(Command::AddHandle(handle));
    }

    /// Resolve once every service is ready; resolves immediately afterwards
    pub async fn subscribe(&self) {
        self.ask(Command::Subscribe).await;
    }

    /// State of one service
    pub async fn query(&self, service: &str) -> Option<TaskState> {
        self.ask(|reply| Command::Query { service: service.to_string(), reply })
            .await
            .flatten()
    }

    /// State of every service
    pub async fn snapshot(&self) -> BTreeMap<String, TaskState> {
        self.ask(Command::Snapshot).await.unwrap_or_default()
    }

    /// Every tracked host process
    pub async fn handles(&self) -> Vec<HostHandle> {
        self.ask(Command::Handles).await.unwrap_or_default()
    }
}

/// One-shot, buffered channel carrying the error that ends a session.
///
/// Only the first error is kept. Errors raised after teardown began are
/// dropped so that containers exiting on `compose down` stay quiet.
#[derive(Clone)]
pub struct ExitSignal {
    tx: Sender<Error>,
    rx: Receiver<Error>,
    fired: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ExitSignal {
    /// Create an unfired signal
    pub fn new() -> Self {
        let (tx, rx) = async_channel::bounded(1);
        Self {
            tx,
            rx,
            fired: Arc::new(AtomicBool::new(false)),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publish a session-fatal error; returns whether it was kept
    pub fn fail(&self, error: Error) -> bool {
        if self.is_stopping() {
            debug!("Ignoring error during teardown: {}", error);
            return false;
        }
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("Ignoring error after the first: {}", error);
            return false;
        }
        self.tx.try_send(error).is_ok()
    }

    /// Mark teardown as started and release waiters
    pub fn begin_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.tx.close();
    }

    /// Whether teardown has started
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Wait for the session-fatal error, or [`Error::Stopped`] on teardown
    pub async fn wait(&self) -> Error {
        self.rx.recv().await.unwrap_or(Error::Stopped)
    }
}
