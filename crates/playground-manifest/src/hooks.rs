//! In-process callbacks attached to built-in services.

use crate::Service;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Host-side view of a running service handed to callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Service name
    pub service: String,
    /// Port label to reserved host port
    pub host_ports: BTreeMap<String, u16>,
}

impl ServiceEndpoint {
    /// Build the endpoint from a service whose ports have been reserved
    pub fn from_service(service: &Service) -> Self {
        let host_ports = service
            .ports
            .iter()
            .filter_map(|p| p.host_port.map(|h| (p.name.clone(), h)))
            .collect();
        Self { service: service.name.clone(), host_ports }
    }

    /// `http://localhost:<host_port>` for a port label
    pub fn http_url(&self, port: &str) -> Option<String> {
        self.host_ports.get(port).map(|p| format!("http://localhost:{}", p))
    }
}

/// Liveness probe run for the lifetime of the session once everything is ready.
///
/// Returning an error ends the session.
#[async_trait]
pub trait Watchdog: Send + Sync {
    /// Watch the service until it misbehaves
    async fn watch(&self, endpoint: &ServiceEndpoint) -> anyhow::Result<()>;
}

/// Extra readiness condition evaluated once the ready checks pass
#[async_trait]
pub trait ReadyHook: Send + Sync {
    /// Resolve once the service is ready
    async fn ready(&self, endpoint: &ServiceEndpoint) -> anyhow::Result<()>;
}

/// Callbacks attached to a service
#[derive(Clone, Default)]
pub struct ServiceHooks {
    /// Post-start liveness probe
    pub watchdog: Option<Arc<dyn Watchdog>>,
    /// Extra readiness condition
    pub ready: Option<Arc<dyn ReadyHook>>,
}

impl ServiceHooks {
    /// Whether no callback is attached
    pub fn is_empty(&self) -> bool {
        self.watchdog.is_none() && self.ready.is_none()
    }
}

impl fmt::Debug for ServiceHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHooks")
            .field("watchdog", &self.watchdog.is_some())
            .field("ready", &self.ready.is_some())
            .finish()
    }
}
