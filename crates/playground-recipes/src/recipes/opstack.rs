use super::l1::{L1_ENDPOINTS, L1Options, add_l1};
use crate::components::{OpBatcher, OpGeth, OpNode, RollupBoost};
use crate::recipe::endpoints;
use crate::{ComponentFactory, FlagSet, Recipe, RecipeContext, Result};
use playground_artifacts::l2::DEFAULT_L2_BLOCK_TIME;
use playground_artifacts::{ArtifactsBuilder, L2Config};
use playground_manifest::{ComponentTree, Manifest};
use std::collections::BTreeMap;

/// The L1 stack plus an OP-stack L2
#[derive(Debug, Clone, Copy, Default)]
pub struct OpStackRecipe;

impl Recipe for OpStackRecipe {
    fn name(&self) -> &str {
        "opstack"
    }

    fn description(&self) -> &str {
        "Deploy an OP stack L2 on top of the l1 recipe"
    }

    fn flags(&self) -> FlagSet {
        FlagSet::new()
            .int("block-time", DEFAULT_L2_BLOCK_TIME, "L2 block time in seconds")
            .optional_int(
                "latest-fork",
                "Unset for Isthmus, 0 for Jovian at genesis, n for Jovian after n blocks",
            )
            .string("external-builder", "", "Engine API URL of an external block builder")
    }

    fn artifacts(&self, builder: ArtifactsBuilder, flags: &FlagSet) -> Result<ArtifactsBuilder> {
        let l2 = L2Config::default()
            .with_block_time(flags.get_int("block-time").unwrap_or(DEFAULT_L2_BLOCK_TIME))
            .with_latest_fork(flags.get_int("latest-fork"));
        Ok(builder.with_l2(l2))
    }

    fn apply(&self, ctx: &mut RecipeContext<'_>) -> Result<ComponentTree> {
        let mut tree = ComponentTree::new(self.name());
        let root = tree.root();
        add_l1(&mut tree, root, ctx, L1Options::default())?;

        let block_time = ctx.flags.get_int("block-time").unwrap_or(DEFAULT_L2_BLOCK_TIME);
        let external = ctx.flags.get_string("external-builder").map(str::to_string);

        let op_geth = OpGeth { block_time }.build("op-geth", ctx)?;
        let component = tree.add_component(root, "op-geth");
        tree.add_service(component, op_geth);

        let l2_engine = match external {
            Some(builder_url) => {
                let boost = RollupBoost { l2: "op-geth".to_string(), builder_url }
                    .build("rollup-boost", ctx)?;
                let component = tree.add_component(root, "rollup-boost");
                tree.add_service(component, boost);
                "rollup-boost"
            }
            None => "op-geth",
        };

        let op_node = OpNode { l2_engine: l2_engine.to_string(), ..OpNode::default() }
            .build("op-node", ctx)?;
        let component = tree.add_component(root, "op-node");
        tree.add_service(component, op_node);

        let batcher = OpBatcher::default().build("op-batcher", ctx)?;
        let component = tree.add_component(root, "op-batcher");
        tree.add_service(component, batcher);

        Ok(tree)
    }

    fn output(&self, manifest: &Manifest) -> BTreeMap<String, String> {
        let mut out = endpoints(manifest, L1_ENDPOINTS);
        out.extend(endpoints(
            manifest,
            &[
                ("op-geth-http", "op-geth", "http"),
                ("op-geth-ws", "op-geth", "ws"),
                ("op-node-http", "op-node", "http"),
                ("rollup-boost", "rollup-boost", "authrpc"),
            ],
        ));
        out
    }
}
