//! Compose document emission.
//!
//! Container services become compose services on one session network so they
//! reach each other by service name. Host and lifecycle services are left
//! out; containers reach them through `host.docker.internal`.

use crate::config::{LINUX_HOST_GATEWAY, RunnerConfig};
use crate::runtime::{LABEL_PLAYGROUND, LABEL_PORT_PREFIX, LABEL_SERVICE, LABEL_SESSION};
use crate::Result;
use playground_manifest::template::HOST_DOCKER_INTERNAL;
use playground_manifest::{
    DependsOnCondition, Manifest, Output, Probe, Protocol, ReadyCheck, Service, VolumeKind, duration,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// File name of the compose document in the session directory
pub const COMPOSE_FILE: &str = "docker-compose.yaml";

/// Mount point of the session directory inside every container
pub const ARTIFACTS_MOUNT: &str = "/artifacts";

/// Directory under the session output holding local bind volumes
pub const VOLUMES_DIR: &str = "volumes";

/// Name of the session network
pub const NETWORK: &str = "playground";

/// Grace period before a stopping container is killed
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// A compose document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeFile {
    /// Services by name
    pub services: BTreeMap<String, ComposeService>,
    /// Networks by name
    pub networks: BTreeMap<String, ComposeNetwork>,
    /// Volumes by name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, ComposeVolume>,
}

/// A compose network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeNetwork {
    /// Driver name
    pub driver: String,
}

/// A compose volume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeVolume {
    /// Managed outside the project
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

/// One compose service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeService {
    /// `image:tag`
    pub image: String,
    /// Entrypoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    /// Resolved args
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Resolved environment
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// `source:target` mounts
    pub volumes: Vec<String>,
    /// `[ip:]host:container[/udp]` publications
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// Container labels
    pub labels: BTreeMap<String, String>,
    /// Healthcheck derived from the ready check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<Healthcheck>,
    /// Startup dependencies
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub depends_on: BTreeMap<String, ComposeDependsOn>,
    /// Networks joined
    pub networks: Vec<String>,
    /// Extra `/etc/hosts` entries
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,
    /// Image platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Privileged mode
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
    /// Time between SIGTERM and SIGKILL on stop
    pub stop_grace_period: String,
}

/// A compose healthcheck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Healthcheck {
    /// `CMD`/`CMD-SHELL` test
    pub test: Vec<String>,
    /// Probe interval
    pub interval: String,
    /// Probe timeout
    pub timeout: String,
    /// Failures before unhealthy
    pub retries: u32,
    /// Grace period
    pub start_period: String,
}

/// Condition of a compose dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeDependsOn {
    /// `service_healthy` or `service_started`
    pub condition: String,
}

/// Shell test for a ready check
pub fn healthcheck_test(check: &ReadyCheck) -> Vec<String> {
    let shell = |script: String| vec!["CMD-SHELL".to_string(), script];
    match &check.probe {
        Probe::Http { url, use_nc: true } => match check.port() {
            Some(port) => shell(format!("nc -z localhost {}", port)),
            None => shell(format!("nc -z {}", url)),
        },
        Probe::Http { url, use_nc: false } => shell(format!(
            "wget -q -O /dev/null '{url}' || curl -fsS -o /dev/null '{url}'"
        )),
        Probe::Tcp { port } => shell(format!("nc -z localhost {}", port)),
        Probe::Command { test } => test.clone(),
    }
}

fn healthcheck(check: &ReadyCheck) -> Healthcheck {
    Healthcheck {
        test: healthcheck_test(check),
        interval: duration::format(check.interval),
        timeout: duration::format(check.timeout),
        retries: check.retries,
        start_period: duration::format(check.start_period),
    }
}

/// Host directory backing a local bind volume
pub fn volume_dir(output: &Output, name: &str) -> PathBuf {
    output.path(VOLUMES_DIR).join(name)
}

fn port_spec(host_port: u16, container_port: u16, protocol: Protocol, bind_locally: bool) -> String {
    let mut spec = String::new();
    if bind_locally {
        spec.push_str("127.0.0.1:");
    }
    spec.push_str(&format!("{}:{}", host_port, container_port));
    if protocol == Protocol::Udp {
        spec.push_str("/udp");
    }
    spec
}

fn compose_service(
    manifest: &Manifest,
    service: &Service,
    output: &Output,
    config: &RunnerConfig,
    doc: &mut ComposeFile,
) -> Result<ComposeService> {
    let image = service.image_ref().unwrap_or_default();

    let mut volumes = vec![format!("{}:{}", output.dir().display(), ARTIFACTS_MOUNT)];
    for (container_path, artifact) in &service.files_mapped {
        volumes.push(format!("{}:{}", output.path(artifact).display(), container_path));
    }
    for (container_path, volume) in &service.volumes_mapped {
        let source = match volume.kind {
            VolumeKind::LocalBind => volume_dir(output, &volume.name).display().to_string(),
            VolumeKind::Shared => {
                doc.volumes.entry(volume.name.clone()).or_default();
                volume.name.clone()
            }
            VolumeKind::Named => {
                doc.volumes
                    .insert(volume.name.clone(), ComposeVolume { external: true });
                volume.name.clone()
            }
        };
        volumes.push(format!("{}:{}", source, container_path));
    }

    let mut labels = service.labels.clone();
    labels.insert(LABEL_PLAYGROUND.to_string(), "true".to_string());
    labels.insert(LABEL_SESSION.to_string(), manifest.id.clone());
    labels.insert(LABEL_SERVICE.to_string(), service.name.clone());

    let mut ports = Vec::new();
    for port in &service.ports {
        labels.insert(
            format!("{}{}", LABEL_PORT_PREFIX, port.name),
            port.container_port.to_string(),
        );
        if let Some(host_port) = port.host_port {
            ports.push(port_spec(host_port, port.container_port, port.protocol, config.bind_locally));
        }
    }

    let depends_on = service
        .depends_on
        .iter()
        .filter(|dep| manifest.service(&dep.name).is_some_and(|s| !s.runs_on_host()))
        .map(|dep| {
            let condition = match dep.condition {
                DependsOnCondition::Healthy => "service_healthy",
                DependsOnCondition::Started => "service_started",
            };
            (dep.name.clone(), ComposeDependsOn { condition: condition.to_string() })
        })
        .collect();

    let extra_hosts = if config.host_gateway {
        vec![format!("{}:{}", HOST_DOCKER_INTERNAL, LINUX_HOST_GATEWAY)]
    } else {
        Vec::new()
    };

    let grace = if service.ungraceful_shutdown { Duration::ZERO } else { STOP_GRACE_PERIOD };

    Ok(ComposeService {
        image,
        entrypoint: service.entrypoint.as_ref().map(|e| vec![e.clone()]),
        command: manifest.resolve_args(service)?,
        environment: manifest.resolve_env(service)?,
        volumes,
        ports,
        labels,
        healthcheck: service.ready_check.as_ref().map(healthcheck),
        depends_on,
        networks: vec![NETWORK.to_string()],
        extra_hosts,
        platform: config.platform.clone(),
        privileged: service.privileged,
        stop_grace_period: duration::format(grace),
    })
}

/// Build the compose document of a manifest whose ports are reserved
pub fn compose_document(manifest: &Manifest, output: &Output, config: &RunnerConfig) -> Result<ComposeFile> {
    let mut doc = ComposeFile::default();
    doc.networks
        .insert(NETWORK.to_string(), ComposeNetwork { driver: "bridge".to_string() });

    for service in manifest.container_services() {
        let entry = compose_service(manifest, service, output, config, &mut doc)?;
        doc.services.insert(service.name.clone(), entry);
    }
    Ok(doc)
}

/// Write `docker-compose.yaml`, creating local bind directories first
pub fn write_compose(manifest: &Manifest, output: &Output, config: &RunnerConfig) -> Result<PathBuf> {
    for service in &manifest.services {
        for volume in service.volumes_mapped.values() {
            if volume.kind == VolumeKind::LocalBind {
                std::fs::create_dir_all(volume_dir(output, &volume.name))?;
            }
        }
    }
    let doc = compose_document(manifest, output, config)?;
    Ok(output.write_yaml(COMPOSE_FILE, &doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use playground_manifest::{ComponentTree, ExContext, ReadyCheck, Volume};

    fn manifest() -> Manifest {
        let mut tree = ComponentTree::new("test");
        let root = tree.root();
        tree.add_service(
            root,
            Service::new("el")
                .with_image("reth")
                .with_tag("v1")
                .with_args(["node", "--http.port", r#"{{Port "http" 8545}}"#])
                .with_args(["--port", r#"{{Port "rlpx" 30303}}"#, "--discovery.port", r#"{{PortUDP "rlpx" 30303}}"#])
                .with_artifact("/data/genesis.json", "genesis.json")
                .with_volume("/data_reth", Volume::local_bind("el-data"))
                .with_ready_check(ReadyCheck::nc("http://localhost:8545")),
        );
        tree.add_service(
            root,
            Service::new("beacon")
                .with_image("lighthouse")
                .with_args(["--el", r#"{{Service "el" "http" "http" ""}}"#])
                .with_volume("/shared", Volume::shared("beacon-shared"))
                .depends_on_healthy("el")
                .with_ungraceful_shutdown(),
        );
        let mut manifest = Manifest::from_tree("brave-otter", "test", ExContext::default(), &tree).unwrap();
        for (i, port) in manifest.service_mut("el").unwrap().ports.iter_mut().enumerate() {
            port.host_port = Some(18545 + i as u16);
        }
        manifest
    }

    #[test]
    fn test_service_entry() {
        let dir = tempfile::tempdir().unwrap();
        let output = Output::new(dir.path()).unwrap();
        let config = RunnerConfig::new().with_bind_locally(true).with_host_gateway(true);
        let doc = compose_document(&manifest(), &output, &config).unwrap();

        let el = &doc.services["el"];
        assert_eq!(el.image, "reth:v1");
        assert_eq!(el.command, vec!["node", "--http.port", "8545", "--port", "30303", "--discovery.port", "30303"]);
        assert!(el.volumes.contains(&format!("{}:/artifacts", output.dir().display())));
        assert!(el.volumes.contains(&format!("{}:/data/genesis.json", output.path("genesis.json").display())));
        assert!(el.volumes.contains(&format!("{}:/data_reth", volume_dir(&output, "el-data").display())));
        assert!(el.ports.iter().all(|p| p.starts_with("127.0.0.1:")));
        assert!(el.ports.iter().any(|p| p.ends_with(":30303/udp")));
        assert_eq!(el.labels["playground"], "true");
        assert_eq!(el.labels["playground.session"], "brave-otter");
        assert_eq!(el.labels["service"], "el");
        assert_eq!(el.labels["port.http"], "8545");
        assert_eq!(el.extra_hosts, vec!["host.docker.internal:172.17.0.1"]);
        assert_eq!(el.stop_grace_period, "30s");

        let health = el.healthcheck.as_ref().unwrap();
        assert_eq!(health.test, vec!["CMD-SHELL", "nc -z localhost 8545"]);
        assert_eq!(health.interval, "1s");
        assert_eq!(health.retries, 10);

        let beacon = &doc.services["beacon"];
        assert_eq!(beacon.command, vec!["--el", "http://el:8545"]);
        assert_eq!(beacon.depends_on["el"].condition, "service_healthy");
        assert_eq!(beacon.stop_grace_period, "0s");
        assert!(beacon.volumes.contains(&"beacon-shared:/shared".to_string()));
        assert!(doc.volumes.contains_key("beacon-shared"));
    }

    #[test]
    fn test_http_healthcheck_script() {
        let test = healthcheck_test(&ReadyCheck::http("http://localhost:3500/eth/v1/node/syncing"));
        assert_eq!(test[0], "CMD-SHELL");
        assert!(test[1].contains("'http://localhost:3500/eth/v1/node/syncing'"));
    }

    #[test]
    fn test_write_creates_bind_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let output = Output::new(dir.path()).unwrap();
        let path = write_compose(&manifest(), &output, &RunnerConfig::new()).unwrap();
        assert!(path.ends_with(COMPOSE_FILE));
        assert!(volume_dir(&output, "el-data").is_dir());

        let yaml = std::fs::read_to_string(path).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed["services"]["el"]["healthcheck"].is_mapping());
        assert!(parsed["networks"]["playground"].is_mapping());
    }
}
