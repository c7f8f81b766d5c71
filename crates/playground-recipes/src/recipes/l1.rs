use crate::components::{Contender, LighthouseBeacon, LighthouseValidator, MevBoostRelay, Reth};
use crate::recipe::endpoints;
use crate::{ComponentFactory, FlagSet, Recipe, RecipeContext, Result};
use playground_artifacts::ArtifactsBuilder;
use playground_manifest::{BootnodeRef, ComponentId, ComponentTree, Manifest};
use std::collections::BTreeMap;
use tracing::debug;

/// How the L1 part of a recipe is laid out
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct L1Options {
    pub native_reth: bool,
    pub secondary_el: bool,
}

fn add_service(
    tree: &mut ComponentTree,
    parent: ComponentId,
    name: &str,
    factory: &dyn ComponentFactory,
    ctx: &mut RecipeContext<'_>,
) -> Result<()> {
    let service = factory.build(name, ctx)?;
    let component = tree.add_component(parent, name);
    tree.add_service(component, service);
    Ok(())
}

/// Add the L1 services under `parent`, one component per service
pub(crate) fn add_l1(
    tree: &mut ComponentTree,
    parent: ComponentId,
    ctx: &mut RecipeContext<'_>,
    options: L1Options,
) -> Result<()> {
    let reth = Reth {
        native: options.native_reth,
        use_bootnode: false,
        block_time: ctx.artifacts.block_time,
    };
    add_service(tree, parent, "el", &reth, ctx)?;

    if options.secondary_el {
        if let Some(enode) = ctx.artifacts.enodes.issued().last() {
            debug!("Designating el ({}) as bootnode", enode.id);
            ctx.ex.bootnode = Some(BootnodeRef { service: "el".to_string(), id: enode.id.clone() });
        }
        let peer = Reth { use_bootnode: true, ..reth };
        add_service(tree, parent, "el-2", &peer, ctx)?;
    }

    add_service(tree, parent, "beacon", &LighthouseBeacon::default(), ctx)?;
    add_service(tree, parent, "validator", &LighthouseValidator::default(), ctx)?;
    add_service(tree, parent, "mev-boost-relay", &MevBoostRelay::default(), ctx)?;

    if ctx.ex.contender.enabled {
        add_service(tree, parent, "contender", &Contender::default(), ctx)?;
    }
    Ok(())
}

/// Endpoints every recipe built on the L1 stack reports
pub(crate) const L1_ENDPOINTS: &[(&str, &str, &str)] = &[
    ("el-http", "el", "http"),
    ("el-authrpc", "el", "authrpc"),
    ("beacon-http", "beacon", "http"),
    ("mev-boost-relay", "mev-boost-relay", "http"),
];

/// Reth, Lighthouse and a local relay
#[derive(Debug, Clone, Copy, Default)]
pub struct L1Recipe;

impl Recipe for L1Recipe {
    fn name(&self) -> &str {
        "l1"
    }

    fn description(&self) -> &str {
        "Deploy an L1 chain with reth, lighthouse and a local mev-boost relay"
    }

    fn flags(&self) -> FlagSet {
        FlagSet::new()
            .bool("latest-fork", false, "Activate the latest fork at genesis")
            .bool("use-native-reth", false, "Run el from the reth release on the host")
            .bool("secondary-el", false, "Add a second reth peered with el")
    }

    fn artifacts(&self, builder: ArtifactsBuilder, flags: &FlagSet) -> Result<ArtifactsBuilder> {
        Ok(if flags.get_bool("latest-fork") { builder.with_latest_fork(true) } else { builder })
    }

    fn apply(&self, ctx: &mut RecipeContext<'_>) -> Result<ComponentTree> {
        let options = L1Options {
            native_reth: ctx.flags.get_bool("use-native-reth"),
            secondary_el: ctx.flags.get_bool("secondary-el"),
        };
        let mut tree = ComponentTree::new(self.name());
        let root = tree.root();
        add_l1(&mut tree, root, ctx, options)?;
        Ok(tree)
    }

    fn output(&self, manifest: &Manifest) -> BTreeMap<String, String> {
        endpoints(manifest, L1_ENDPOINTS)
    }
}
