use super::recipe_with_flags;
use crate::tables;
use anyhow::{Context, Result};
use playground_artifacts::ArtifactsBuilder;
use playground_manifest::{ExContext, Output};
use playground_recipes::{ComponentRegistry, prepare};

pub async fn run(recipe: &str, assignments: &[String]) -> Result<()> {
    println!("Validating {}...", recipe);
    let (recipe, flags) = recipe_with_flags(recipe, assignments)?;

    // Artifacts are generated into a scratch directory that is dropped afterwards
    let scratch = tempfile::tempdir()?;
    let output = Output::new(scratch.path())?;
    let prepared = smol::unblock(move || {
        prepare(
            &recipe,
            &flags,
            ArtifactsBuilder::new(),
            ExContext::default(),
            &output,
            &ComponentRegistry::builtin(),
        )
    })
    .await
    .context("Recipe is invalid")?;

    println!("✓ Recipe valid");
    println!("  Recipe: {}", prepared.manifest.recipe);
    println!("  Services: {}", prepared.manifest.services.len());
    println!("{}", tables::services(&prepared.manifest));
    Ok(())
}
