//! # Playground recipes
//!
//! Recipes turn flags and generated artifacts into a component tree:
//!
//! - [`Recipe`] is the trait every built-in recipe implements
//! - [`ComponentRegistry`] holds the built-in service kinds recipes and YAML
//!   overrides instantiate
//! - [`YamlRecipe`] patches a built-in recipe with a YAML document
//! - [`prepare`] runs the whole pipeline and writes `manifest.json`
//!
//! ## Example
//!
//! ```rust,no_run
//! use playground_artifacts::ArtifactsBuilder;
//! use playground_manifest::{ExContext, Output};
//! use playground_recipes::{ComponentRegistry, load_recipe, prepare};
//!
//! # fn example() -> playground_recipes::Result<()> {
//! let recipe = load_recipe("l1")?;
//! let mut flags = recipe.flags();
//! flags.set("latest-fork")?;
//!
//! let output = Output::new("/tmp/playground")?;
//! let prepared = prepare(
//!     &recipe,
//!     &flags,
//!     ArtifactsBuilder::new(),
//!     ExContext::default(),
//!     &output,
//!     &ComponentRegistry::builtin(),
//! )?;
//! println!("session {}", prepared.manifest.id);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod components;
mod error;
mod flags;
mod recipe;
pub mod recipes;
mod registry;
pub mod yaml;

pub use error::{Error, Result};
pub use flags::{Flag, FlagSet, FlagValue};
pub use recipe::{Prepared, Recipe, RecipeContext, endpoints, host_endpoint, prepare};
pub use recipes::{builtin_recipes, find_recipe, load_recipe};
pub use registry::{ComponentFactory, ComponentRegistry};
pub use yaml::YamlRecipe;
