//! Built-in component kinds.

mod buildernet;
pub mod hooks;
mod l1;
mod opstack;

pub use buildernet::{BuilderHub, BuilderHubDb, RBUILDER_CONFIG, Rbuilder};
pub use l1::{Contender, LighthouseBeacon, LighthouseValidator, MevBoostRelay, Reth, reth_release};
pub use opstack::{OpBatcher, OpGeth, OpNode, RollupBoost};

use crate::ComponentFactory;
use std::sync::Arc;

/// Every built-in kind with its default wiring
pub fn builtin() -> Vec<Arc<dyn ComponentFactory>> {
    vec![
        Arc::new(Reth::default()),
        Arc::new(LighthouseBeacon::default()),
        Arc::new(LighthouseValidator::default()),
        Arc::new(MevBoostRelay::default()),
        Arc::new(Contender::default()),
        Arc::new(OpGeth::default()),
        Arc::new(OpNode::default()),
        Arc::new(OpBatcher::default()),
        Arc::new(RollupBoost::default()),
        Arc::new(Rbuilder::default()),
        Arc::new(BuilderHubDb),
        Arc::new(BuilderHub::default()),
    ]
}
