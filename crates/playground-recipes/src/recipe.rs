//! The recipe abstraction and the pipeline that turns a recipe into a
//! manifest.

use crate::{ComponentRegistry, FlagSet, Result};
use playground_artifacts::{Artifacts, ArtifactsBuilder};
use playground_manifest::{ComponentTree, ExContext, Manifest, Output, session};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Everything a recipe can draw on while building its component tree
pub struct RecipeContext<'a> {
    /// Execution context; recipes may designate a bootnode
    pub ex: &'a mut ExContext,
    /// Generated genesis material
    pub artifacts: &'a mut Artifacts,
    /// Flag values
    pub flags: &'a FlagSet,
    /// Registered component kinds
    pub registry: &'a ComponentRegistry,
}

/// A named generator of a component tree and its genesis configuration
pub trait Recipe: Send + Sync {
    /// Unique name
    fn name(&self) -> &str;

    /// One-line description
    fn description(&self) -> &str;

    /// Declared flags with their defaults
    fn flags(&self) -> FlagSet;

    /// Configure genesis generation
    fn artifacts(&self, builder: ArtifactsBuilder, flags: &FlagSet) -> Result<ArtifactsBuilder>;

    /// Build the component tree
    fn apply(&self, ctx: &mut RecipeContext<'_>) -> Result<ComponentTree>;

    /// User-facing endpoints of a running session
    fn output(&self, manifest: &Manifest) -> BTreeMap<String, String>;
}

/// `http://localhost:<host_port>` of a service port, once reserved
pub fn host_endpoint(manifest: &Manifest, service: &str, port: &str) -> Option<String> {
    let port = manifest.service(service)?.port(port)?;
    port.host_port.map(|p| format!("http://localhost:{}", p))
}

/// Collect the endpoints that exist out of `(label, service, port)` triples
pub fn endpoints(manifest: &Manifest, wanted: &[(&str, &str, &str)]) -> BTreeMap<String, String> {
    wanted
        .iter()
        .filter_map(|(label, service, port)| {
            host_endpoint(manifest, service, port).map(|url| (label.to_string(), url))
        })
        .collect()
}

/// Result of preparing a session
pub struct Prepared {
    /// Validated manifest, already saved to the session directory
    pub manifest: Manifest,
    /// Genesis material
    pub artifacts: Artifacts,
}

/// Generate artifacts, apply the recipe and assemble the manifest
pub fn prepare(
    recipe: &Arc<dyn Recipe>,
    flags: &FlagSet,
    builder: ArtifactsBuilder,
    mut ex: ExContext,
    output: &Output,
    registry: &ComponentRegistry,
) -> Result<Prepared> {
    let builder = recipe.artifacts(builder, flags)?;
    let mut artifacts = builder.build(output)?;
    ex.output = output.dir().to_path_buf();

    let tree = {
        let mut ctx = RecipeContext {
            ex: &mut ex,
            artifacts: &mut artifacts,
            flags,
            registry,
        };
        recipe.apply(&mut ctx)?
    };

    let manifest = Manifest::from_tree(session::new_id(), recipe.name(), ex, &tree)?;
    manifest.save(output)?;
    info!(
        "Prepared session {} from recipe {}",
        manifest.id,
        recipe.name()
    );
    Ok(Prepared { manifest, artifacts })
}
