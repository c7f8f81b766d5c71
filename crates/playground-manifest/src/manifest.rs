//! Flattened, validated service graph of a session.

use crate::template::{self, ResolveContext};
use crate::validate::{dependency_order, validate_services};
use crate::{ComponentTree, ExContext, Output, Result, Service};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the serialized manifest inside the session directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Session-scoped holder of services and execution context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Session id, also the compose project name
    pub id: String,
    /// Recipe that produced the manifest
    pub recipe: String,
    /// Execution context
    pub ctx: ExContext,
    /// Services in component walk order
    pub services: Vec<Service>,
}

impl Manifest {
    /// Flatten a component tree, record its templates and validate the result
    pub fn from_tree(
        id: impl Into<String>,
        recipe: impl Into<String>,
        ctx: ExContext,
        tree: &ComponentTree,
    ) -> Result<Self> {
        let mut services: Vec<Service> = tree.all_services().cloned().collect();
        for service in &mut services {
            template::record_service(service)?;
        }

        let manifest = Self { id: id.into(), recipe: recipe.into(), ctx, services };
        manifest.validate()?;
        info!(
            "Assembled manifest {} with {} services",
            manifest.id,
            manifest.services.len()
        );
        Ok(manifest)
    }

    /// Re-run validation
    pub fn validate(&self) -> Result<()> {
        validate_services(&self.services, self.ctx.bootnode.as_ref())
    }

    /// Look up a service
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Look up a service mutably
    pub fn service_mut(&mut self, name: &str) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.name == name)
    }

    /// Service names, dependencies first
    pub fn startup_order(&self) -> Result<Vec<&str>> {
        dependency_order(&self.services)
    }

    /// Services launched by the container runtime
    pub fn container_services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter().filter(|s| !s.runs_on_host())
    }

    /// Services running a host binary
    pub fn host_services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter().filter(|s| s.is_host() && !s.is_lifecycle())
    }

    /// Services driven by lifecycle hooks
    pub fn lifecycle_services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter().filter(|s| s.is_lifecycle())
    }

    /// Address book for the execution pass
    pub fn resolver(&self) -> ResolveContext<'_> {
        ResolveContext::new(&self.services).with_bootnode(self.ctx.bootnode.as_ref())
    }

    /// Resolved arguments of a service
    pub fn resolve_args(&self, service: &Service) -> Result<Vec<String>> {
        let ctx = self.resolver();
        service
            .args
            .iter()
            .map(|arg| template::resolve(service, arg, &ctx))
            .collect()
    }

    /// Resolved environment of a service
    pub fn resolve_env(&self, service: &Service) -> Result<BTreeMap<String, String>> {
        let ctx = self.resolver();
        service
            .env
            .iter()
            .map(|(k, v)| Ok((k.clone(), template::resolve(service, v, &ctx)?)))
            .collect()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rehydrate from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write `manifest.json` into the session directory
    pub fn save(&self, output: &Output) -> Result<PathBuf> {
        let path = output.write_json(MANIFEST_FILE, self)?;
        debug!("Wrote manifest to {}", path.display());
        Ok(path)
    }

    /// Load a manifest from a session directory or a `manifest.json` path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = if path.is_dir() { path.join(MANIFEST_FILE) } else { path.to_path_buf() };
        let json = std::fs::read_to_string(&file)?;
        Self::from_json(&json)
    }
}
