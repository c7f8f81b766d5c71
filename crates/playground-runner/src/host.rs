//! Services running directly on the supervisor host.
//!
//! Host services keep their place in the dependency graph: they wait for
//! their healthy-condition dependencies, log to `logs/<service>.log` and are
//! tracked so teardown can signal them.

use crate::compose::{ARTIFACTS_MOUNT, volume_dir};
use crate::error::failure_report;
use crate::release::ensure_release;
use crate::runner::Session;
use crate::state::{HostHandle, TaskStatus};
use crate::{Error, Result};
use async_process::{Child, Command, Stdio};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use playground_manifest::{DependsOnCondition, Output, Probe, Protocol, Service, home_dir};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interval between dependency and ready probes
pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Container paths of a service mapped to their host counterparts, longest first
pub fn host_rewrites(service: &Service, output: &Output) -> Vec<(String, String)> {
    let mut rewrites = vec![(ARTIFACTS_MOUNT.to_string(), output.dir().display().to_string())];
    for (container_path, artifact) in &service.files_mapped {
        rewrites.push((container_path.clone(), output.path(artifact).display().to_string()));
    }
    for (container_path, volume) in &service.volumes_mapped {
        rewrites.push((
            container_path.clone(),
            volume_dir(output, &volume.name).display().to_string(),
        ));
    }
    rewrites.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    rewrites
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Replace whole container paths in `value` with host paths.
///
/// A match must start at a boundary and end at the end of the value, a `/`
/// or a character that cannot continue a path segment.
pub fn rewrite_paths(value: &str, rewrites: &[(String, String)]) -> String {
    let mut out = String::with_capacity(value.len());
    let mut i = 0;
    while i < value.len() {
        let rest = &value[i..];
        let at_boundary = value[..i].chars().next_back().is_none_or(|c| !is_path_char(c) && c != '/');
        let hit = at_boundary
            .then(|| {
                rewrites.iter().find(|(from, _)| {
                    rest.starts_with(from.as_str())
                        && rest[from.len()..].chars().next().is_none_or(|c| c == '/' || !is_path_char(c))
                })
            })
            .flatten();

        match hit {
            Some((from, to)) => {
                out.push_str(to);
                i += from.len();
            }
            None => {
                let c = rest.chars().next().unwrap_or_default();
                out.push(c);
                i += c.len_utf8().max(1);
            }
        }
    }
    out
}

/// How the supervisor checks a service from the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostProbe {
    /// HTTP GET must return 2xx
    Http(String),
    /// TCP connect to localhost must succeed
    Tcp(u16),
    /// Shell command must exit 0
    Shell(Vec<String>),
    /// Rely on the status reported by the container runtime
    Status,
}

fn host_port_of(service: &Service, container_port: u16) -> Option<u16> {
    service
        .ports
        .iter()
        .find(|p| p.container_port == container_port && p.protocol == Protocol::Tcp)
        .and_then(|p| p.host_port)
}

fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.find('/').map_or("", |i| &rest[i..])
}

impl HostProbe {
    /// Probe for a service as seen from the host
    pub fn for_service(service: &Service) -> Self {
        let http_port = || {
            service
                .port("http")
                .and_then(|p| p.host_port)
                .map_or(HostProbe::Status, HostProbe::Tcp)
        };
        let Some(check) = &service.ready_check else {
            return http_port();
        };
        match &check.probe {
            Probe::Http { url, use_nc: false } => check
                .port()
                .and_then(|p| host_port_of(service, p))
                .map_or_else(http_port, |port| {
                    HostProbe::Http(format!("http://localhost:{}{}", port, path_of(url)))
                }),
            Probe::Http { use_nc: true, .. } | Probe::Tcp { .. } => check
                .port()
                .and_then(|p| host_port_of(service, p))
                .map_or_else(http_port, HostProbe::Tcp),
            Probe::Command { test } if service.runs_on_host() => HostProbe::Shell(test.clone()),
            Probe::Command { .. } => http_port(),
        }
    }

    /// Run the probe once
    pub async fn check(&self, service: &str, session: &Session) -> bool {
        match self {
            HostProbe::Http(url) => {
                let url = url.clone();
                smol::unblock(move || {
                    reqwest::blocking::Client::builder()
                        .timeout(Duration::from_secs(5))
                        .build()
                        .and_then(|client| client.get(&url).send())
                        .is_ok_and(|r| r.status().is_success())
                })
                .await
            }
            HostProbe::Tcp(port) => async_net::TcpStream::connect(("127.0.0.1", *port)).await.is_ok(),
            HostProbe::Shell(test) => {
                let mut command = match test.first().map(String::as_str) {
                    Some("CMD-SHELL") => {
                        let mut c = Command::new("sh");
                        c.arg("-c").arg(test[1..].join(" "));
                        c
                    }
                    Some("CMD") if test.len() > 1 => {
                        let mut c = Command::new(&test[1]);
                        c.args(&test[2..]);
                        c
                    }
                    _ => return false,
                };
                command
                    .current_dir(session.output.dir())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await
                    .is_ok_and(|s| s.success())
            }
            HostProbe::Status => session
                .state
                .query(service)
                .await
                .is_some_and(|s| s.healthy),
        }
    }
}

/// Wait for every dependency of `service` to satisfy its condition
pub async fn wait_for_dependencies(session: &Session, service: &Service) -> Result<()> {
    for dep in &service.depends_on {
        let Some(target) = session.manifest.service(&dep.name) else {
            continue;
        };
        let deadline = Instant::now() + session.config.dependency_timeout;
        let probe = HostProbe::for_service(target);
        debug!("{} waits for {} ({:?})", service.name, dep.name, probe);

        loop {
            let satisfied = match dep.condition {
                DependsOnCondition::Healthy => probe.check(&dep.name, session).await,
                DependsOnCondition::Started => session
                    .state
                    .query(&dep.name)
                    .await
                    .is_some_and(|s| s.started),
            };
            if satisfied {
                break;
            }
            if session.exit.is_stopping() {
                return Err(Error::Stopped);
            }
            if Instant::now() >= deadline {
                return Err(Error::DependencyTimeout {
                    service: service.name.clone(),
                    dependency: dep.name.clone(),
                });
            }
            smol::Timer::after(PROBE_INTERVAL).await;
        }
        info!("{}: dependency {} is ready", service.name, dep.name);
    }
    Ok(())
}

/// Probe a host-run service until its ready check passes
pub async fn probe_until_ready(session: &Session, service: &Service) {
    if service.ready_check.is_none() {
        return;
    }
    let probe = HostProbe::for_service(service);
    if probe == HostProbe::Status {
        warn!("Cannot probe {} from the host", service.name);
        return;
    }
    while !session.exit.is_stopping() {
        if probe.check(&service.name, session).await {
            info!("{} is healthy", service.name);
            session.state.record_readiness(&service.name, true);
            return;
        }
        smol::Timer::after(PROBE_INTERVAL).await;
    }
}

/// A fully resolved process to run on the host
#[derive(Debug, Clone)]
pub struct HostCommand {
    /// Program
    pub program: PathBuf,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment
    pub env: BTreeMap<String, String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Log file receiving stdout and stderr
    pub log: PathBuf,
}

impl HostCommand {
    /// `sh -c <script>`
    pub fn shell(script: &str, env: BTreeMap<String, String>, cwd: PathBuf, log: PathBuf) -> Self {
        Self {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            env,
            cwd,
            log,
        }
    }

    /// Printable command line
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Spawn with output appended to the log file, preceded by the command line
    pub fn spawn(&self) -> Result<Child> {
        if let Some(parent) = self.log.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut log = OpenOptions::new().create(true).append(true).open(&self.log)?;
        writeln!(log, "$ {}", self.command_line())?;
        let stderr = log.try_clone()?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr))
            .spawn()?;
        Ok(child)
    }
}

/// Send a signal to a host process, ignoring processes that are already gone
pub fn signal_process(handle: &HostHandle, sig: Signal) {
    let Ok(raw) = i32::try_from(handle.pid) else {
        return;
    };
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => debug!("Sent {} to {} ({})", sig, handle.service, handle.pid),
        Err(e) => debug!("Could not signal {} ({}): {}", handle.service, handle.pid, e),
    }
}

/// Track a spawned child and turn a non-zero exit into a session-fatal error
pub fn supervise(session: &Session, service: &str, child: Child, command: &HostCommand) -> smol::Task<()> {
    session.state.add_handle(HostHandle { service: service.to_string(), pid: child.id() });
    session.state.update_status(service, TaskStatus::Started);

    let state = session.state.clone();
    let exit = session.exit.clone();
    let service = service.to_string();
    let command = command.clone();
    let mut child = child;
    smol::spawn(async move {
        let status = child.status().await;
        state.update_status(&service, TaskStatus::Die);
        if exit.is_stopping() {
            return;
        }
        match status {
            Ok(status) if status.success() => info!("{} exited", service),
            Ok(status) => {
                let headline = format!("Host service {} exited with {}", service, status);
                exit.fail(Error::HostExit(failure_report(
                    &headline,
                    &service,
                    Some(&command.command_line()),
                    &command.log,
                )));
            }
            Err(e) => {
                exit.fail(Error::Io(e));
            }
        }
    })
}

/// Resolve the binary, args and env of a host service
pub async fn host_command(session: &Session, service: &Service) -> Result<HostCommand> {
    let program = match (&service.host_path, &service.release) {
        (Some(path), _) => path.clone(),
        (None, Some(release)) => ensure_release(release, &home_dir()?).await?,
        (None, None) => {
            return Err(Error::HostExit(format!("service {} has no host binary", service.name)));
        }
    };

    for volume in service.volumes_mapped.values() {
        async_fs::create_dir_all(volume_dir(&session.output, &volume.name)).await?;
    }
    let rewrites = host_rewrites(service, &session.output);
    let args = session
        .manifest
        .resolve_args(service)?
        .iter()
        .map(|a| rewrite_paths(a, &rewrites))
        .collect();
    let env = session
        .manifest
        .resolve_env(service)?
        .into_iter()
        .map(|(k, v)| (k, rewrite_paths(&v, &rewrites)))
        .collect();

    Ok(HostCommand {
        program,
        args,
        env,
        cwd: session.output.dir().to_path_buf(),
        log: session.output.log_path(&service.name),
    })
}

/// Wait for dependencies, then launch a host service and watch it
pub async fn start_host_service(session: &Session, service: &Service) -> Result<smol::Task<()>> {
    wait_for_dependencies(session, service).await?;
    let command = host_command(session, service).await?;
    info!("Starting host service {}: {}", service.name, command.command_line());
    let child = command.spawn()?;
    Ok(supervise(session, &service.name, child, &command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use playground_manifest::{ReadyCheck, Volume};

    #[test]
    fn test_rewrite_paths() {
        let dir = tempfile::tempdir().unwrap();
        let output = Output::new(dir.path()).unwrap();
        let service = Service::new("el")
            .with_host_path("/usr/bin/reth")
            .with_artifact("/data/genesis.json", "genesis.json")
            .with_artifact("/data/jwtsecret", "jwtsecret")
            .with_volume("/data_reth", Volume::local_bind("el-data"));
        let rewrites = host_rewrites(&service, &output);
        let root = output.dir().display().to_string();

        assert_eq!(rewrite_paths("/data/genesis.json", &rewrites), format!("{}/genesis.json", root));
        assert_eq!(
            rewrite_paths("--authrpc.jwtsecret=/data/jwtsecret", &rewrites),
            format!("--authrpc.jwtsecret={}/jwtsecret", root)
        );
        assert_eq!(rewrite_paths("/data_reth/db", &rewrites), format!("{}/volumes/el-data/db", root));
        assert_eq!(rewrite_paths("/artifacts/testnet", &rewrites), format!("{}/testnet", root));
        // Prefix of a longer path segment is not a match
        assert_eq!(rewrite_paths("/data/jwtsecret2", &rewrites), "/data/jwtsecret2");
        assert_eq!(rewrite_paths("/opt/data/jwtsecret", &rewrites), "/opt/data/jwtsecret");
        assert_eq!(rewrite_paths("node", &rewrites), "node");
    }

    #[test]
    fn test_probe_selection() {
        let mut el = Service::new("el")
            .with_image("reth")
            .with_port("http", 8545, Protocol::Tcp)
            .with_ready_check(ReadyCheck::http("http://localhost:8545/health"));
        el.ports[0].host_port = Some(18545);
        assert_eq!(HostProbe::for_service(&el), HostProbe::Http("http://localhost:18545/health".to_string()));

        el.ready_check = Some(ReadyCheck::nc("http://localhost:8545"));
        assert_eq!(HostProbe::for_service(&el), HostProbe::Tcp(18545));

        el.ready_check = Some(ReadyCheck::command(["CMD-SHELL", "pg_isready"]));
        assert_eq!(HostProbe::for_service(&el), HostProbe::Tcp(18545));

        let db = Service::new("db")
            .with_image("postgres")
            .with_ready_check(ReadyCheck::command(["CMD-SHELL", "pg_isready"]));
        assert_eq!(HostProbe::for_service(&db), HostProbe::Status);

        let host = Service::new("svc")
            .with_host_path("/bin/true")
            .with_ready_check(ReadyCheck::command(["CMD-SHELL", "true"]));
        assert_eq!(
            HostProbe::for_service(&host),
            HostProbe::Shell(vec!["CMD-SHELL".to_string(), "true".to_string()])
        );
    }

    #[smol_potat::test]
    async fn test_spawn_writes_command_line_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("svc.log");
        let command = HostCommand::shell("echo hello", BTreeMap::new(), dir.path().to_path_buf(), log.clone());
        let status = command.spawn().unwrap().status().await.unwrap();
        assert!(status.success());

        let contents = std::fs::read_to_string(&log).unwrap();
        assert_eq!(contents, "$ sh -c echo hello\nhello\n");
    }
}
