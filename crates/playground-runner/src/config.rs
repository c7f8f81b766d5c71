//! Runner settings.

use std::time::Duration;

/// How long a service waits for each healthy-condition dependency
pub const DEFAULT_DEPENDENCY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Concurrent image pulls
pub const DEFAULT_PULL_PARALLELISM: usize = 4;

/// Address host services are reached at from containers on Linux
pub const LINUX_HOST_GATEWAY: &str = "172.17.0.1";

/// Settings of a [`LocalRunner`](crate::LocalRunner)
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Publish ports on 127.0.0.1 only
    pub bind_locally: bool,
    /// `--platform` passed to pulls and compose services
    pub platform: Option<String>,
    /// Keep compose volumes on teardown
    pub keep_volumes: bool,
    /// Concurrent image pulls
    pub pull_parallelism: usize,
    /// Per-dependency wait cap for host and lifecycle services
    pub dependency_timeout: Duration,
    /// Map `host.docker.internal` to the docker bridge gateway in every container
    pub host_gateway: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            bind_locally: false,
            platform: None,
            keep_volumes: false,
            pull_parallelism: DEFAULT_PULL_PARALLELISM,
            dependency_timeout: DEFAULT_DEPENDENCY_TIMEOUT,
            host_gateway: cfg!(target_os = "linux"),
        }
    }
}

impl RunnerConfig {
    /// Default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish ports on 127.0.0.1 only
    pub fn with_bind_locally(mut self, bind_locally: bool) -> Self {
        self.bind_locally = bind_locally;
        self
    }

    /// Pin the image platform
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Keep compose volumes on teardown
    pub fn with_keep_volumes(mut self, keep_volumes: bool) -> Self {
        self.keep_volumes = keep_volumes;
        self
    }

    /// Limit concurrent pulls, at least one
    pub fn with_pull_parallelism(mut self, parallelism: usize) -> Self {
        self.pull_parallelism = parallelism.max(1);
        self
    }

    /// Per-dependency wait cap
    pub fn with_dependency_timeout(mut self, timeout: Duration) -> Self {
        self.dependency_timeout = timeout;
        self
    }

    /// Toggle the `host.docker.internal` mapping
    pub fn with_host_gateway(mut self, host_gateway: bool) -> Self {
        self.host_gateway = host_gateway;
        self
    }
}
