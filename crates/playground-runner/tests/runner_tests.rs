//! End-to-end runner tests against a scripted container runtime

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use playground_manifest::{ComponentTree, ExContext, Manifest, Output, ReadyCheck, Service};
use playground_runner::compose::ComposeFile;
use playground_runner::{
    ContainerEvent, ContainerInfo, ContainerRuntime, Error, EventKind, LocalRunner, Result,
    RunnerConfig, TaskStatus,
};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every call and replays events pushed by the test
struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    cached: Vec<String>,
    events_tx: Sender<ContainerEvent>,
    events_rx: Receiver<ContainerEvent>,
}

impl FakeRuntime {
    fn new(cached: &[&str]) -> Arc<Self> {
        let (events_tx, events_rx) = async_channel::unbounded();
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            cached: cached.iter().map(|s| s.to_string()).collect(),
            events_tx,
            events_rx,
        })
    }

    fn emit(&self, service: &str, kind: EventKind) {
        self.events_tx.try_send(ContainerEvent::new(service, kind)).unwrap();
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.cached.iter().any(|c| c == image))
    }

    async fn pull_image(&self, image: &str, _platform: Option<&str>) -> Result<()> {
        self.record(format!("pull {}", image));
        Ok(())
    }

    async fn compose_up(&self, session: &str, compose_file: &Path) -> Result<()> {
        assert!(compose_file.exists());
        self.record(format!("up {}", session));
        Ok(())
    }

    async fn compose_down(&self, session: &str, _compose_file: &Path, keep_volumes: bool) -> Result<()> {
        self.record(format!("down {} keep={}", session, keep_volumes));
        Ok(())
    }

    async fn events(&self, _session: &str) -> Result<BoxStream<'static, ContainerEvent>> {
        Ok(self.events_rx.clone().boxed())
    }

    async fn containers(&self, _session: &str) -> Result<Vec<ContainerInfo>> {
        Ok(vec![ContainerInfo { id: "c-el".to_string(), service: "el".to_string() }])
    }

    async fn logs(&self, container: &str) -> Result<BoxStream<'static, String>> {
        let lines = vec![format!("hello from {}", container)];
        Ok(stream::iter(lines).chain(stream::pending()).boxed())
    }

    async fn kill_session(&self, session: &str) -> Result<()> {
        self.record(format!("kill {}", session));
        Ok(())
    }
}

async fn within<T>(fut: impl Future<Output = T>) -> T {
    futures_lite::future::or(fut, async {
        smol::Timer::after(Duration::from_secs(20)).await;
        panic!("timed out");
    })
    .await
}

fn assemble(services: Vec<Service>) -> Manifest {
    let mut tree = ComponentTree::new("test");
    let root = tree.root();
    for service in services {
        tree.add_service(root, service);
    }
    Manifest::from_tree("brave-otter", "test", ExContext::default(), &tree).unwrap()
}

fn lifecycle(name: &str, init: &[String], start: Option<&str>, stop: &[String]) -> Service {
    let mut service = Service::new(name);
    service.lifecycle_hooks = true;
    service.lifecycle.init = init.to_vec();
    service.lifecycle.start = start.map(String::from);
    service.lifecycle.stop = stop.to_vec();
    service
}

fn read_compose(runner: &LocalRunner) -> ComposeFile {
    let yaml = std::fs::read_to_string(runner.compose_file()).unwrap();
    serde_yaml::from_str(&yaml).unwrap()
}

#[smol_potat::test]
async fn test_same_container_port_gets_distinct_host_ports() {
    let dir = tempfile::tempdir().unwrap();
    let output = Output::new(dir.path()).unwrap();
    let manifest = assemble(vec![
        Service::new("el").with_image("reth").with_args(["--http.port", r#"{{Port "http" 8545}}"#]),
        Service::new("op-geth").with_image("geth").with_args(["--http.port", r#"{{Port "http" 8545}}"#]),
    ]);

    let runner = LocalRunner::prepare(manifest, output.clone(), FakeRuntime::new(&[]), RunnerConfig::new())
        .await
        .unwrap();

    let el = runner.manifest().service("el").unwrap().port("http").unwrap().host_port.unwrap();
    let geth = runner.manifest().service("op-geth").unwrap().port("http").unwrap().host_port.unwrap();
    assert_ne!(el, geth);

    let compose = read_compose(&runner);
    assert!(compose.services["el"].ports.contains(&format!("{}:8545", el)));
    assert!(compose.services["op-geth"].ports.contains(&format!("{}:8545", geth)));

    let saved = Manifest::load(output.path(playground_manifest::MANIFEST_FILE)).unwrap();
    assert_eq!(saved.service("el").unwrap().port("http").unwrap().host_port, Some(el));
}

#[smol_potat::test]
async fn test_host_service_is_reached_through_host_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let output = Output::new(dir.path()).unwrap();
    let manifest = assemble(vec![
        Service::new("el")
            .with_host_path("/bin/sh")
            .with_args(["-c", "sleep 3600", r#"{{Port "http" 8545}}"#])
            .with_ready_check(ReadyCheck::tcp(8545)),
        Service::new("beacon")
            .with_image("lighthouse")
            .with_args(["--execution-endpoint", r#"{{Service "el" "http" "http" ""}}"#])
            .depends_on_healthy("el"),
    ]);

    let runner = LocalRunner::prepare(
        manifest,
        output,
        FakeRuntime::new(&[]),
        RunnerConfig::new().with_host_gateway(true),
    )
    .await
    .unwrap();

    let port = runner.manifest().service("el").unwrap().port("http").unwrap().host_port.unwrap();
    let compose = read_compose(&runner);
    assert!(!compose.services.contains_key("el"));
    let beacon = &compose.services["beacon"];
    assert_eq!(
        beacon.command,
        vec!["--execution-endpoint".to_string(), format!("http://host.docker.internal:{}", port)]
    );
    assert!(beacon.depends_on.is_empty());
    assert_eq!(beacon.extra_hosts, vec!["host.docker.internal:172.17.0.1"]);
}

#[smol_potat::test]
async fn test_ready_after_container_events() {
    let dir = tempfile::tempdir().unwrap();
    let output = Output::new(dir.path()).unwrap();
    let manifest = assemble(vec![
        Service::new("el")
            .with_image("reth")
            .with_args(["--http.port", r#"{{Port "http" 8545}}"#])
            .with_ready_check(ReadyCheck::http("http://localhost:8545")),
        Service::new("beacon").with_image("reth"),
    ]);
    let runtime = FakeRuntime::new(&[]);
    let runner = LocalRunner::prepare(manifest, output.clone(), runtime.clone(), RunnerConfig::new())
        .await
        .unwrap();

    runner.start().await.unwrap();
    assert_eq!(runtime.calls(), vec!["pull reth", "up brave-otter"]);

    runtime.emit("el", EventKind::Start);
    runtime.emit("beacon", EventKind::Start);
    runtime.emit("el", EventKind::Healthy);
    within(runner.wait_for_ready()).await.unwrap();

    let log = output.log_path("el");
    within(async {
        while !std::fs::read_to_string(&log).unwrap_or_default().contains("hello from c-el") {
            smol::Timer::after(Duration::from_millis(20)).await;
        }
    })
    .await;

    runner.stop().await.unwrap();
    assert_eq!(runtime.calls().last().unwrap(), "down brave-otter keep=false");
}

#[smol_potat::test]
async fn test_container_death_ends_session() {
    let dir = tempfile::tempdir().unwrap();
    let output = Output::new(dir.path()).unwrap();
    let manifest = assemble(vec![Service::new("el").with_image("reth")]);
    let runtime = FakeRuntime::new(&["reth"]);
    let runner = LocalRunner::prepare(manifest, output, runtime.clone(), RunnerConfig::new())
        .await
        .unwrap();

    runner.start().await.unwrap();
    assert!(!runtime.calls().iter().any(|c| c.starts_with("pull")));
    runtime.emit("el", EventKind::Start);
    within(runner.wait_for_ready()).await.unwrap();

    runtime.emit("el", EventKind::Die { exit_code: Some(137) });
    let err = within(runner.wait_for_exit()).await;
    let report = match err {
        Error::ServiceDied(report) => report,
        other => panic!("unexpected error {other:?}"),
    };
    assert!(report.contains("Container el exited with code 137"));
    assert!(report.contains("service: el"));
    assert!(report.contains("hello from c-el") || report.contains("el.log"));

    runner.stop().await.unwrap();
}

#[smol_potat::test]
async fn test_deaths_during_stop_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let output = Output::new(dir.path()).unwrap();
    let manifest = assemble(vec![Service::new("el").with_image("reth")]);
    let runtime = FakeRuntime::new(&["reth"]);
    let runner = LocalRunner::prepare(manifest, output, runtime.clone(), RunnerConfig::new())
        .await
        .unwrap();

    runner.start().await.unwrap();
    runner.stop().await.unwrap();
    runtime.emit("el", EventKind::Die { exit_code: Some(0) });
    assert!(matches!(within(runner.wait_for_exit()).await, Error::Stopped));
}

#[smol_potat::test]
async fn test_lifecycle_service() {
    let dir = tempfile::tempdir().unwrap();
    let output = Output::new(dir.path().join("session")).unwrap();
    let initialized = dir.path().join("initialized");
    let stopped = dir.path().join("stopped");
    let manifest = assemble(vec![lifecycle(
        "hooks",
        &[format!("echo ok > {}", initialized.display())],
        Some("sleep 3600"),
        &[format!("touch {}", stopped.display())],
    )]);
    let runtime = FakeRuntime::new(&[]);
    let runner = LocalRunner::prepare(manifest, output, runtime.clone(), RunnerConfig::new())
        .await
        .unwrap();

    runner.start().await.unwrap();
    within(runner.wait_for_ready()).await.unwrap();
    assert_eq!(std::fs::read_to_string(&initialized).unwrap(), "ok\n");

    let handles = runner.state().handles().await;
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].service, "hooks");

    runner.stop().await.unwrap();
    assert!(stopped.exists());
    assert!(runtime.calls().is_empty());
}

#[smol_potat::test]
async fn test_lifecycle_start_may_finish_before_containers() {
    let dir = tempfile::tempdir().unwrap();
    let output = Output::new(dir.path().join("session")).unwrap();
    let manifest = assemble(vec![
        Service::new("el").with_image("reth"),
        lifecycle("hooks", &["true".to_string()], Some("exit 0"), &[]),
    ]);
    let runtime = FakeRuntime::new(&["reth"]);
    let runner = LocalRunner::prepare(manifest, output, runtime.clone(), RunnerConfig::new())
        .await
        .unwrap();

    runner.start().await.unwrap();
    within(async {
        while runner.state().query("hooks").await.unwrap().status != TaskStatus::Die {
            smol::Timer::after(Duration::from_millis(20)).await;
        }
    })
    .await;

    runtime.emit("el", EventKind::Start);
    within(runner.wait_for_ready()).await.unwrap();
    runner.stop().await.unwrap();
}

#[smol_potat::test]
async fn test_host_exit_fails_readiness() {
    let dir = tempfile::tempdir().unwrap();
    let output = Output::new(dir.path()).unwrap();
    let manifest = assemble(vec![
        Service::new("el")
            .with_host_path("/bin/sh")
            .with_args(["-c", "echo boom; exit 4"])
            .with_ready_check(ReadyCheck::command(["CMD-SHELL", "false"])),
    ]);
    let runner = LocalRunner::prepare(manifest, output, FakeRuntime::new(&[]), RunnerConfig::new())
        .await
        .unwrap();

    runner.start().await.unwrap();
    let err = within(runner.wait_for_ready()).await.unwrap_err();
    let report = match err {
        Error::HostExit(report) => report,
        other => panic!("unexpected error {other:?}"),
    };
    assert!(report.contains("command: /bin/sh -c echo boom; exit 4"));
    assert!(report.contains("boom"));

    runner.stop().await.unwrap();
}

#[smol_potat::test]
async fn test_force_kill() {
    let dir = tempfile::tempdir().unwrap();
    let output = Output::new(dir.path()).unwrap();
    let manifest = assemble(vec![
        Service::new("el").with_image("reth"),
        Service::new("sidecar").with_host_path("/bin/sh").with_args(["-c", "sleep 3600"]),
    ]);
    let runtime = FakeRuntime::new(&["reth"]);
    let runner = LocalRunner::prepare(manifest, output, runtime.clone(), RunnerConfig::new())
        .await
        .unwrap();

    runner.start().await.unwrap();
    runtime.emit("el", EventKind::Start);
    within(runner.wait_for_ready()).await.unwrap();

    runner.force_kill().await.unwrap();
    assert!(runtime.calls().contains(&"kill brave-otter".to_string()));
    within(async {
        while runner.state().query("sidecar").await.unwrap().status != TaskStatus::Die {
            smol::Timer::after(Duration::from_millis(20)).await;
        }
    })
    .await;
}
