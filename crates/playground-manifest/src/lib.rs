//! # Playground manifest
//!
//! The declarative service graph of a playground session.
//!
//! A recipe builds a [`ComponentTree`] of [`Service`]s. The tree is flattened
//! into a [`Manifest`], which records the template directives found in
//! service args and env, validates the graph and can be written to and
//! rehydrated from `manifest.json`.
//!
//! ## Example
//!
//! ```rust
//! use playground_manifest::{ComponentTree, ExContext, Manifest, ReadyCheck, Service};
//!
//! # fn example() -> playground_manifest::Result<()> {
//! let mut tree = ComponentTree::new("l1");
//! let root = tree.root();
//! let el = tree.add_component(root, "el");
//! tree.add_service(
//!     el,
//!     Service::new("el")
//!         .with_image("ghcr.io/paradigmxyz/reth")
//!         .with_tag("v1.4.8")
//!         .with_args(["node", "--http.port", r#"{{Port "http" 8545}}"#])
//!         .with_ready_check(ReadyCheck::http("http://localhost:8545")),
//! );
//!
//! let manifest = Manifest::from_tree("brave-otter", "l1", ExContext::default(), &tree)?;
//! assert_eq!(manifest.service("el").unwrap().ports[0].container_port, 8545);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod component;
mod context;
pub mod duration;
mod error;
mod hooks;
mod manifest;
mod output;
mod service;
pub mod session;
pub mod template;
mod validate;

pub use component::{ComponentId, ComponentShape, ComponentTree};
pub use context::{BootnodeRef, ContenderConfig, ExContext, LogLevel};
pub use error::{Error, Result};
pub use hooks::{ReadyHook, ServiceEndpoint, ServiceHooks, Watchdog};
pub use manifest::{MANIFEST_FILE, Manifest};
pub use output::{LOGS_DIR, Output, home_dir};
pub use service::{
    DependsOn, DependsOnCondition, Lifecycle, NodeRef, Port, Probe, Protocol, ReadyCheck,
    Release, ReleaseFormat, Service, Volume, VolumeKind, host_platform, url_port,
};
pub use template::{Directive, ResolveContext, Template};
pub use validate::{dependency_order, validate_services};
