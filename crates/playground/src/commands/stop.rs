use anyhow::{Context, Result};
use playground_manifest::{Manifest, Output};
use playground_runner::{DockerCli, teardown};
use std::path::Path;

pub async fn run(dir: &Path, keep_volumes: bool) -> Result<()> {
    let manifest = Manifest::load(dir)
        .with_context(|| format!("Failed to load the session manifest in {}", dir.display()))?;
    let output = Output::new(dir)?;

    println!("Stopping session {}...", manifest.id);
    teardown(&manifest, &output, &DockerCli::new(), keep_volumes)
        .await
        .with_context(|| format!("Failed to stop session {}", manifest.id))?;
    println!("✓ Session {} stopped", manifest.id);
    Ok(())
}
