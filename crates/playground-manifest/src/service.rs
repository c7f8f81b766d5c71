//! Service data model.
//!
//! A [`Service`] is the atomic unit the runner launches: a container image,
//! a host binary, a downloadable release or a set of lifecycle shell hooks.

use crate::hooks::{ReadyHook, ServiceHooks, Watchdog};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Transport protocol of a port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP
    #[default]
    Tcp,
    /// UDP
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// A named port exposed by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port label, e.g. `http` or `authrpc`
    pub name: String,
    /// Port the process listens on inside its container
    pub container_port: u16,
    /// Transport protocol
    #[serde(default)]
    pub protocol: Protocol,
    /// Host port reserved by the runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
}

/// A reference from one service to a named port of another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    /// Target service
    pub service: String,
    /// Port label on the target
    pub port_label: String,
    /// URL scheme prefix, may be empty
    #[serde(default)]
    pub protocol: String,
    /// User prefix, may be empty
    #[serde(default)]
    pub user: String,
}

/// When a dependency counts as satisfied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependsOnCondition {
    /// The dependency's process has started
    Started,
    /// The dependency's ready check passes
    #[default]
    Healthy,
}

/// A startup dependency on another service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependsOn {
    /// Service depended on
    pub name: String,
    /// Condition to wait for
    #[serde(default)]
    pub condition: DependsOnCondition,
}

/// Archive format of a release asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseFormat {
    /// Gzipped tarball containing the binary
    #[serde(rename = "tar.gz")]
    TarGz,
    /// Zip archive containing the binary
    #[serde(rename = "zip")]
    Zip,
    /// The asset is the binary itself
    #[serde(rename = "binary")]
    Binary,
}

/// A binary published as a GitHub release asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Binary name
    pub name: String,
    /// GitHub organisation
    pub org: String,
    /// GitHub repository
    pub repo: String,
    /// Release tag
    pub version: String,
    /// `goos/goarch` (e.g. `linux/amd64`) to the arch triple used in asset names
    #[serde(default)]
    pub arch: BTreeMap<String, String>,
    /// Asset format
    pub format: ReleaseFormat,
}

impl Release {
    /// Key of the cache directory under the home directory
    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Arch triple for a `goos/goarch` platform
    pub fn arch_for(&self, platform: &str) -> Result<&str> {
        self.arch.get(platform).map(String::as_str).ok_or_else(|| {
            Error::Release(format!(
                "release {} has no asset for platform {}",
                self.name, platform
            ))
        })
    }

    /// Download URL of the asset for a `goos/goarch` platform
    pub fn download_url(&self, platform: &str) -> Result<String> {
        let base = format!(
            "https://github.com/{}/{}/releases/download/{}",
            self.org, self.repo, self.version
        );
        Ok(match self.format {
            ReleaseFormat::TarGz => format!(
                "{}/{}-{}-{}.tar.gz",
                base,
                self.name,
                self.version,
                self.arch_for(platform)?
            ),
            ReleaseFormat::Zip => format!(
                "{}/{}-{}-{}.zip",
                base,
                self.name,
                self.version,
                self.arch_for(platform)?
            ),
            ReleaseFormat::Binary => format!("{}/{}", base, self.name),
        })
    }
}

/// `goos/goarch` of the machine we run on
pub fn host_platform() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{}/{}", os, arch)
}

/// Kind of a mapped volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeKind {
    /// Compose volume scoped to the session and shared by name between services
    #[default]
    Shared,
    /// Directory under the session output bind-mounted into the container
    LocalBind,
    /// Pre-existing docker volume used as-is
    Named,
}

/// A volume mapped into a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume kind
    #[serde(default)]
    pub kind: VolumeKind,
    /// Volume name
    pub name: String,
}

impl Volume {
    /// Session-scoped shared volume
    pub fn shared(name: impl Into<String>) -> Self {
        Self { kind: VolumeKind::Shared, name: name.into() }
    }

    /// Bind mount of a directory under the session output
    pub fn local_bind(name: impl Into<String>) -> Self {
        Self { kind: VolumeKind::LocalBind, name: name.into() }
    }

    /// Externally managed docker volume
    pub fn named(name: impl Into<String>) -> Self {
        Self { kind: VolumeKind::Named, name: name.into() }
    }
}

/// What a ready check probes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Probe {
    /// HTTP GET of a URL as seen from inside the service's own network namespace
    Http {
        /// URL to query
        url: String,
        /// Only check the URL's port is open with `nc -z`
        #[serde(default)]
        use_nc: bool,
    },
    /// TCP connect to a local port
    Tcp {
        /// Port to connect to
        port: u16,
    },
    /// Shell test command in compose healthcheck notation
    Command {
        /// Test command, e.g. `["CMD-SHELL", "pg_isready"]`
        test: Vec<String>,
    },
}

/// Health probe gating dependents of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyCheck {
    /// What to probe
    pub probe: Probe,
    /// Time between probes
    #[serde(with = "crate::duration")]
    pub interval: Duration,
    /// Time a single probe may take
    #[serde(with = "crate::duration")]
    pub timeout: Duration,
    /// Consecutive failures before unhealthy
    pub retries: u32,
    /// Grace period before failures count
    #[serde(with = "crate::duration")]
    pub start_period: Duration,
}

impl ReadyCheck {
    fn with_probe(probe: Probe) -> Self {
        Self {
            probe,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            retries: 10,
            start_period: Duration::from_secs(1),
        }
    }

    /// HTTP GET check
    pub fn http(url: impl Into<String>) -> Self {
        Self::with_probe(Probe::Http { url: url.into(), use_nc: false })
    }

    /// Port-open check on the URL's port using `nc -z`
    pub fn nc(url: impl Into<String>) -> Self {
        Self::with_probe(Probe::Http { url: url.into(), use_nc: true })
    }

    /// TCP connect check
    pub fn tcp(port: u16) -> Self {
        Self::with_probe(Probe::Tcp { port })
    }

    /// Shell command check
    pub fn command<I, S>(test: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_probe(Probe::Command { test: test.into_iter().map(Into::into).collect() })
    }

    /// Set the probe interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the probe timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry count
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the start period
    pub fn with_start_period(mut self, start_period: Duration) -> Self {
        self.start_period = start_period;
        self
    }

    /// Port the probe targets, if it can be determined
    pub fn port(&self) -> Option<u16> {
        match &self.probe {
            Probe::Http { url, .. } => url_port(url),
            Probe::Tcp { port } => Some(*port),
            Probe::Command { .. } => None,
        }
    }
}

/// Port of an `http(s)://host:port/...` URL, defaulting by scheme
pub fn url_port(url: &str) -> Option<u16> {
    let (scheme, rest) = url.split_once("://").unwrap_or(("http", url));
    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    match authority.rsplit_once(':') {
        Some((_, port)) => port.parse().ok(),
        None => match scheme {
            "https" => Some(443),
            "http" => Some(80),
            _ => None,
        },
    }
}

/// Shell hooks run by the supervisor instead of a container entrypoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    /// Commands run sequentially before start; each must exit 0
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init: Vec<String>,
    /// Long-running command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Commands run on teardown, failures are logged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl Lifecycle {
    /// Whether no command is declared
    pub fn is_empty(&self) -> bool {
        self.init.is_empty() && self.start.is_none() && self.stop.is_empty()
    }
}

/// The atomic runnable unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    /// Unique name, lowercase and dash separated
    pub name: String,
    /// Kind of built-in component that produced this service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Container image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Container image tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Absolute path of a host binary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<PathBuf>,
    /// Release from which the host binary is downloaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<Release>,
    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// Arguments, possibly holding template directives
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment, values possibly holding template directives
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Named ports
    #[serde(default)]
    pub ports: Vec<Port>,
    /// References to other services' ports
    #[serde(default)]
    pub node_refs: Vec<NodeRef>,
    /// Container path to artifact name
    #[serde(default)]
    pub files_mapped: BTreeMap<String, String>,
    /// Container path to volume
    #[serde(default)]
    pub volumes_mapped: BTreeMap<String, Volume>,
    /// Startup dependencies
    #[serde(default)]
    pub depends_on: Vec<DependsOn>,
    /// Health probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_check: Option<ReadyCheck>,
    /// Run the lifecycle block instead of a binary
    #[serde(default)]
    pub lifecycle_hooks: bool,
    /// Lifecycle shell commands
    #[serde(default, skip_serializing_if = "Lifecycle::is_empty")]
    pub lifecycle: Lifecycle,
    /// Directory of the YAML recipe that declared this service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_dir: Option<PathBuf>,
    /// Extra container labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Run the container privileged
    #[serde(default)]
    pub privileged: bool,
    /// Stop without a grace period
    #[serde(default)]
    pub ungraceful_shutdown: bool,
    /// In-process callbacks, never serialized
    #[serde(skip)]
    pub hooks: ServiceHooks,
}

impl Service {
    /// Create an empty service
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Set the component kind
    pub fn with_component(mut self, kind: impl Into<String>) -> Self {
        self.component = Some(kind.into());
        self
    }

    /// Set the container image
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the container image tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Run a host binary instead of a container
    pub fn with_host_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_path = Some(path.into());
        self.image = None;
        self.tag = None;
        self
    }

    /// Run a binary downloaded from a release instead of a container
    pub fn with_release(mut self, release: Release) -> Self {
        self.release = Some(release);
        self.image = None;
        self.tag = None;
        self
    }

    /// Set the entrypoint
    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Append arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append arguments only when `cond` holds
    pub fn with_args_if<I, S>(self, cond: bool, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if cond { self.with_args(args) } else { self }
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Declare a port explicitly
    pub fn with_port(mut self, name: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        self.ports.push(Port {
            name: name.into(),
            container_port: port,
            protocol,
            host_port: None,
        });
        self
    }

    /// Map an artifact into the container
    pub fn with_artifact(mut self, container_path: impl Into<String>, artifact: impl Into<String>) -> Self {
        self.files_mapped.insert(container_path.into(), artifact.into());
        self
    }

    /// Map a volume into the container
    pub fn with_volume(mut self, container_path: impl Into<String>, volume: Volume) -> Self {
        self.volumes_mapped.insert(container_path.into(), volume);
        self
    }

    /// Wait for `name` to be healthy before starting
    pub fn depends_on_healthy(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(DependsOn { name: name.into(), condition: DependsOnCondition::Healthy });
        self
    }

    /// Wait for `name` to be started before starting
    pub fn depends_on_started(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(DependsOn { name: name.into(), condition: DependsOnCondition::Started });
        self
    }

    /// Set the ready check
    pub fn with_ready_check(mut self, check: ReadyCheck) -> Self {
        self.ready_check = Some(check);
        self
    }

    /// Add a container label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Run the container privileged
    pub fn with_privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Stop without a grace period
    pub fn with_ungraceful_shutdown(mut self) -> Self {
        self.ungraceful_shutdown = true;
        self
    }

    /// Attach a watchdog
    pub fn with_watchdog(mut self, watchdog: Arc<dyn Watchdog>) -> Self {
        self.hooks.watchdog = Some(watchdog);
        self
    }

    /// Attach a ready callback
    pub fn with_ready_hook(mut self, hook: Arc<dyn ReadyHook>) -> Self {
        self.hooks.ready = Some(hook);
        self
    }

    /// Full image reference `image:tag`
    pub fn image_ref(&self) -> Option<String> {
        let image = self.image.as_ref()?;
        Some(match &self.tag {
            Some(tag) => format!("{}:{}", image, tag),
            None => image.clone(),
        })
    }

    /// Whether the service runs a host binary
    pub fn is_host(&self) -> bool {
        self.host_path.is_some() || self.release.is_some()
    }

    /// Whether the service is driven by lifecycle hooks
    pub fn is_lifecycle(&self) -> bool {
        self.lifecycle_hooks
    }

    /// Whether the service runs on the supervisor host rather than in a container
    pub fn runs_on_host(&self) -> bool {
        self.is_host() || self.is_lifecycle()
    }

    /// Look up a port by label, preferring TCP when both protocols exist
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports
            .iter()
            .filter(|p| p.name == name)
            .min_by_key(|p| p.protocol)
    }

    /// Look up a port by label and protocol
    pub fn port_with_protocol(&self, name: &str, protocol: Protocol) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name && p.protocol == protocol)
    }

    /// Register a port, rejecting a second declaration with a different number
    pub fn declare_port(&mut self, name: &str, container_port: u16, protocol: Protocol) -> Result<()> {
        match self.port_with_protocol(name, protocol) {
            Some(existing) if existing.container_port != container_port => {
                Err(Error::Validation(format!(
                    "service '{}' declares port '{}'/{} as both {} and {}",
                    self.name, name, protocol, existing.container_port, container_port
                )))
            }
            Some(_) => Ok(()),
            None => {
                self.ports.push(Port {
                    name: name.to_string(),
                    container_port,
                    protocol,
                    host_port: None,
                });
                Ok(())
            }
        }
    }

    /// Register a reference to another service's port once; later references
    /// to the same port with another scheme or user are not recorded again
    pub fn add_node_ref(&mut self, node_ref: NodeRef) {
        let known = self
            .node_refs
            .iter()
            .any(|r| r.service == node_ref.service && r.port_label == node_ref.port_label);
        if !known {
            self.node_refs.push(node_ref);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_ref(service: &str, port_label: &str, protocol: &str) -> NodeRef {
        NodeRef {
            service: service.to_string(),
            port_label: port_label.to_string(),
            protocol: protocol.to_string(),
            user: String::new(),
        }
    }

    #[test]
    fn test_node_refs_are_keyed_by_target_port() {
        let mut service = Service::new("beacon");
        service.add_node_ref(node_ref("el", "http", "http"));
        service.add_node_ref(node_ref("el", "http", ""));
        service.add_node_ref(node_ref("el", "authrpc", "http"));
        assert_eq!(service.node_refs.len(), 2);
        assert_eq!(service.node_refs[0].protocol, "http");
    }

    fn reth_release() -> Release {
        Release {
            name: "reth".to_string(),
            org: "paradigmxyz".to_string(),
            repo: "reth".to_string(),
            version: "v1.4.8".to_string(),
            arch: BTreeMap::from([
                ("linux/amd64".to_string(), "x86_64-unknown-linux-gnu".to_string()),
                ("darwin/arm64".to_string(), "aarch64-apple-darwin".to_string()),
            ]),
            format: ReleaseFormat::TarGz,
        }
    }

    #[test]
    fn test_release_urls() {
        let release = reth_release();
        assert_eq!(
            release.download_url("linux/amd64").unwrap(),
            "https://github.com/paradigmxyz/reth/releases/download/v1.4.8/reth-v1.4.8-x86_64-unknown-linux-gnu.tar.gz"
        );
        assert!(release.download_url("windows/amd64").is_err());

        let binary = Release { format: ReleaseFormat::Binary, ..release };
        assert_eq!(
            binary.download_url("windows/amd64").unwrap(),
            "https://github.com/paradigmxyz/reth/releases/download/v1.4.8/reth"
        );
        assert_eq!(binary.cache_key(), "reth-v1.4.8");
    }

    #[test]
    fn test_declare_port_conflict() {
        let mut service = Service::new("el");
        service.declare_port("http", 8545, Protocol::Tcp).unwrap();
        service.declare_port("http", 8545, Protocol::Tcp).unwrap();
        service.declare_port("http", 9000, Protocol::Udp).unwrap();
        assert_eq!(service.ports.len(), 2);
        assert!(service.declare_port("http", 8546, Protocol::Tcp).is_err());
    }

    #[test]
    fn test_host_path_clears_image() {
        let service = Service::new("el")
            .with_image("ghcr.io/paradigmxyz/reth")
            .with_tag("latest")
            .with_host_path("/usr/local/bin/reth");
        assert!(service.image.is_none());
        assert!(service.is_host());
        assert!(service.runs_on_host());
    }

    #[test]
    fn test_url_port() {
        assert_eq!(url_port("http://localhost:8545"), Some(8545));
        assert_eq!(url_port("http://localhost:3500/eth/v1/node/health"), Some(3500));
        assert_eq!(url_port("https://example.com/x"), Some(443));
        assert_eq!(url_port("http://user@beacon:5052"), Some(5052));
        assert_eq!(url_port("localhost:1234"), Some(1234));
    }

    #[test]
    fn test_image_ref() {
        let service = Service::new("el").with_image("reth").with_tag("v1");
        assert_eq!(service.image_ref().as_deref(), Some("reth:v1"));
        assert_eq!(Service::new("x").with_image("busybox").image_ref().as_deref(), Some("busybox"));
    }
}
