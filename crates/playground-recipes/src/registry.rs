//! Explicit registry of built-in component kinds.

use crate::components;
use crate::{Error, RecipeContext, Result};
use playground_manifest::{Manifest, Service, ServiceHooks};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Constructor of a built-in service
pub trait ComponentFactory: Send + Sync {
    /// Kind name, recorded on the services it builds
    fn kind(&self) -> &'static str;

    /// Build a service called `name`
    fn build(&self, name: &str, ctx: &mut RecipeContext<'_>) -> Result<Service>;

    /// In-process callbacks for a service of this kind
    fn hooks(&self, _service: &Service) -> ServiceHooks {
        ServiceHooks::default()
    }
}

/// Component kinds by name
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ComponentFactory>>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in component with default settings
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for factory in components::builtin() {
            registry.register(factory);
        }
        registry
    }

    /// Register a kind, replacing any previous one of the same name
    pub fn register(&mut self, factory: Arc<dyn ComponentFactory>) {
        self.factories.insert(factory.kind(), factory);
    }

    /// Look up a kind
    pub fn get(&self, kind: &str) -> Result<&Arc<dyn ComponentFactory>> {
        self.factories
            .get(kind)
            .ok_or_else(|| Error::UnknownComponent(kind.to_string()))
    }

    /// Registered kind names
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().copied()
    }

    /// Re-attach callbacks to the services of a rehydrated manifest
    pub fn attach_hooks(&self, manifest: &mut Manifest) {
        for service in &mut manifest.services {
            let Some(kind) = service.component.as_deref() else {
                continue;
            };
            if let Some(factory) = self.factories.get(kind) {
                service.hooks = factory.hooks(service);
                debug!("Attached {} hooks to {}", kind, service.name);
            }
        }
    }
}
