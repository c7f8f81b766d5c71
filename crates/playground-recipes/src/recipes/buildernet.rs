use super::l1::{L1_ENDPOINTS, L1Options, add_l1};
use crate::components::{BuilderHub, BuilderHubDb, Rbuilder};
use crate::recipe::endpoints;
use crate::{ComponentFactory, FlagSet, Recipe, RecipeContext, Result};
use playground_artifacts::ArtifactsBuilder;
use playground_manifest::{ComponentTree, Manifest};
use std::collections::BTreeMap;

/// The L1 stack plus rbuilder and a builder hub
#[derive(Debug, Clone, Copy, Default)]
pub struct BuilderNetRecipe;

impl Recipe for BuilderNetRecipe {
    fn name(&self) -> &str {
        "buildernet"
    }

    fn description(&self) -> &str {
        "Deploy the l1 recipe with rbuilder submitting to the relay and a builder hub"
    }

    fn flags(&self) -> FlagSet {
        FlagSet::new().bool("latest-fork", false, "Activate the latest fork at genesis")
    }

    fn artifacts(&self, builder: ArtifactsBuilder, flags: &FlagSet) -> Result<ArtifactsBuilder> {
        Ok(if flags.get_bool("latest-fork") { builder.with_latest_fork(true) } else { builder })
    }

    fn apply(&self, ctx: &mut RecipeContext<'_>) -> Result<ComponentTree> {
        let mut tree = ComponentTree::new(self.name());
        let root = tree.root();
        add_l1(&mut tree, root, ctx, L1Options::default())?;

        let rbuilder = Rbuilder::default().build("rbuilder", ctx)?;
        let component = tree.add_component(root, "rbuilder");
        tree.add_service(component, rbuilder);

        let hub = tree.add_component(root, "builder-hub");
        let db = BuilderHubDb.build("builder-hub-db", ctx)?;
        tree.add_service(hub, db);
        let api = BuilderHub::default().build("builder-hub", ctx)?;
        tree.add_service(hub, api);

        Ok(tree)
    }

    fn output(&self, manifest: &Manifest) -> BTreeMap<String, String> {
        let mut out = endpoints(manifest, L1_ENDPOINTS);
        out.extend(endpoints(
            manifest,
            &[
                ("rbuilder-rpc", "rbuilder", "rpc"),
                ("builder-hub", "builder-hub", "http"),
                ("builder-hub-admin", "builder-hub", "admin"),
            ],
        ));
        out
    }
}
