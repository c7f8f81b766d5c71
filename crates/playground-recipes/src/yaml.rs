//! YAML recipes: a built-in base recipe plus a declarative patch.
//!
//! ```yaml
//! base: l1
//! description: l1 without a validator and with a host reth
//! recipe:
//!   validator:
//!     remove: true
//!   el:
//!     services:
//!       el:
//!         host_path: /usr/local/bin/reth
//! ```
//!
//! Removals are applied first. Every surviving service is then scrubbed of
//! references to services that no longer exist: `depends_on` and `node_refs`
//! entries go, env values referencing them go, and an arg referencing one is
//! dropped together with the flag token right before it.

use crate::recipes::find_recipe;
use crate::{Error, FlagSet, Recipe, RecipeContext, Result};
use indexmap::IndexMap;
use playground_artifacts::ArtifactsBuilder;
use playground_manifest::template::references_service;
use playground_manifest::{
    ComponentTree, DependsOn, DependsOnCondition, Manifest, Output, Protocol, ReadyCheck, Release,
    Service, Volume, duration,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix of a `files` value naming a generated artifact
pub const ARTIFACT_PREFIX: &str = "artifact:";

/// Parsed YAML recipe document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeFile {
    /// Built-in recipe to patch
    pub base: String,
    /// Description shown instead of the base recipe's
    #[serde(default)]
    pub description: Option<String>,
    /// Component name to patch
    #[serde(default)]
    pub recipe: Option<IndexMap<String, ComponentPatch>>,
}

/// Patch of one component
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentPatch {
    /// Remove the component and everything below it
    #[serde(default)]
    pub remove: bool,
    /// Service name to patch
    #[serde(default)]
    pub services: Option<IndexMap<String, ServicePatch>>,
}

/// Port number, optionally suffixed with `/udp` or `/tcp`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    /// Bare TCP port
    Number(u16),
    /// `8545`, `30303/udp`
    Text(String),
}

impl PortSpec {
    fn parse(&self) -> Result<(u16, Protocol)> {
        match self {
            PortSpec::Number(n) => Ok((*n, Protocol::Tcp)),
            PortSpec::Text(s) => {
                let (num, protocol) = match s.split_once('/') {
                    Some((num, "udp")) => (num, Protocol::Udp),
                    Some((num, "tcp")) | Some((num, "")) => (num, Protocol::Tcp),
                    Some((_, other)) => {
                        return Err(Error::Override(format!("unknown protocol '{}' in port '{}'", other, s)));
                    }
                    None => (s.as_str(), Protocol::Tcp),
                };
                let port = num
                    .trim()
                    .parse()
                    .map_err(|_| Error::Override(format!("invalid port '{}'", s)))?;
                Ok((port, protocol))
            }
        }
    }
}

/// Ready check fields; unset ones keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadyCheckPatch {
    /// URL for an HTTP GET probe
    pub url: Option<String>,
    /// Only probe the URL's port with `nc -z`
    pub use_nc: Option<bool>,
    /// Port for a TCP probe
    pub port: Option<u16>,
    /// Test command for a shell probe
    pub test: Option<Vec<String>>,
    /// Probe interval
    pub interval: Option<String>,
    /// Probe timeout
    pub timeout: Option<String>,
    /// Retries before unhealthy
    pub retries: Option<u32>,
    /// Grace period
    pub start_period: Option<String>,
}

impl ReadyCheckPatch {
    fn probe(&self) -> Option<ReadyCheck> {
        if let Some(url) = &self.url {
            return Some(if self.use_nc.unwrap_or(false) {
                ReadyCheck::nc(url.clone())
            } else {
                ReadyCheck::http(url.clone())
            });
        }
        if let Some(port) = self.port {
            return Some(ReadyCheck::tcp(port));
        }
        self.test.as_ref().map(|test| ReadyCheck::command(test.iter().cloned()))
    }

    fn apply(&self, current: Option<ReadyCheck>, service: &str) -> Result<ReadyCheck> {
        let mut check = match (self.probe(), current) {
            (Some(new), _) => new,
            (None, Some(current)) => current,
            (None, None) => {
                return Err(Error::Override(format!(
                    "ready_check of '{}' needs one of url, port or test",
                    service
                )));
            }
        };

        let parse = |field: &str, raw: &Option<String>| -> Result<Option<std::time::Duration>> {
            raw.as_deref()
                .map(|s| {
                    duration::parse(s).ok_or_else(|| {
                        Error::Override(format!("invalid {} '{}' in ready_check of '{}'", field, s, service))
                    })
                })
                .transpose()
        };

        if let Some(interval) = parse("interval", &self.interval)? {
            check.interval = interval;
        }
        if let Some(timeout) = parse("timeout", &self.timeout)? {
            check.timeout = timeout;
        }
        if let Some(start_period) = parse("start_period", &self.start_period)? {
            check.start_period = start_period;
        }
        if let Some(retries) = self.retries {
            check.retries = retries;
        }
        Ok(check)
    }
}

/// Patch of one service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicePatch {
    /// Remove the service
    #[serde(default)]
    pub remove: bool,
    /// Built-in kind to instantiate when the service is new
    pub component: Option<String>,
    /// Container image
    pub image: Option<String>,
    /// Image tag
    pub tag: Option<String>,
    /// Entrypoint
    pub entrypoint: Option<String>,
    /// Replacement arguments
    pub args: Option<Vec<String>>,
    /// Flag values to replace within the current arguments
    pub replace_args: Option<Vec<String>>,
    /// Environment entries to add or overwrite
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Port label to port
    #[serde(default)]
    pub ports: BTreeMap<String, PortSpec>,
    /// Container path to `artifact:<name>` or a path relative to the recipe file
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    /// Container path to `[shared:|local:|named:]<name>`
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    /// `[component.]service[:healthy|running]` entries replacing the current ones
    pub depends_on: Option<Vec<String>>,
    /// Host binary, relative paths resolve against the recipe file
    pub host_path: Option<PathBuf>,
    /// Release to download the host binary from
    pub release: Option<Release>,
    /// Ready check changes
    pub ready_check: Option<ReadyCheckPatch>,
    /// Drive the service with lifecycle commands
    pub lifecycle_hooks: Option<bool>,
    /// Lifecycle init commands
    pub init: Option<Vec<String>>,
    /// Lifecycle start command
    pub start: Option<String>,
    /// Lifecycle stop commands
    pub stop: Option<Vec<String>>,
    /// Labels to add
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Run privileged
    pub privileged: Option<bool>,
    /// Stop without grace period
    pub ungraceful_shutdown: Option<bool>,
}

/// Parse a `[component.]service[:healthy|running|started]` dependency
fn parse_depends_on(raw: &str, tree: &ComponentTree) -> Result<DependsOn> {
    let (target, condition) = match raw.rsplit_once(':') {
        Some((target, "healthy")) => (target, DependsOnCondition::Healthy),
        Some((target, "running")) | Some((target, "started")) => (target, DependsOnCondition::Started),
        Some((_, other)) => {
            return Err(Error::Override(format!(
                "unknown condition '{}' in depends_on '{}'",
                other, raw
            )));
        }
        None => (raw, DependsOnCondition::Healthy),
    };

    let name = match target.split_once('.') {
        Some((component, service)) => {
            if tree.find(component).is_none() {
                return Err(Error::Override(format!(
                    "depends_on '{}' names unknown component '{}'",
                    raw, component
                )));
            }
            service
        }
        None => target,
    };
    Ok(DependsOn { name: name.to_string(), condition })
}

fn parse_volume(raw: &str) -> Volume {
    match raw.split_once(':') {
        Some(("shared", name)) => Volume::shared(name),
        Some(("local", name)) | Some(("bind", name)) => Volume::local_bind(name),
        Some(("named", name)) => Volume::named(name),
        _ => Volume::shared(raw),
    }
}

fn flag_name(arg: &str) -> Option<&str> {
    arg.starts_with('-').then(|| arg.split_once('=').map(|(flag, _)| flag).unwrap_or(arg))
}

/// Replace flag values in `args`, appending flags that are not present.
///
/// `replacements` reads like an argument list: `["--http.port", "9000",
/// "--debug", "--x=1"]`.
pub fn replace_args(args: &mut Vec<String>, replacements: &[String]) {
    let mut i = 0;
    while i < replacements.len() {
        let token = &replacements[i];
        let Some(flag) = flag_name(token) else {
            warn!("Ignoring positional '{}' in replace_args", token);
            i += 1;
            continue;
        };
        let inline = token.contains('=');
        let value = replacements
            .get(i + 1)
            .filter(|next| !inline && !next.starts_with('-'))
            .cloned();
        i += if value.is_some() { 2 } else { 1 };

        let existing = args.iter().position(|a| flag_name(a) == Some(flag));
        match existing {
            Some(pos) => {
                args[pos] = token.clone();
                let has_value = !args[pos].contains('=')
                    && args.get(pos + 1).is_some_and(|next| !next.starts_with('-'));
                match (value, has_value) {
                    (Some(value), true) => args[pos + 1] = value,
                    (Some(value), false) => args.insert(pos + 1, value),
                    (None, true) if !inline => {}
                    (None, true) => {
                        args.remove(pos + 1);
                    }
                    (None, false) => {}
                }
            }
            None => {
                args.push(token.clone());
                if let Some(value) = value {
                    args.push(value);
                }
            }
        }
    }
}

/// Drop every reference to `removed` from a surviving service
pub fn scrub_references(service: &mut Service, removed: &HashSet<String>) {
    let references = |s: &str| removed.iter().any(|r| references_service(s, r));

    service.depends_on.retain(|d| !removed.contains(&d.name));
    service.node_refs.retain(|r| !removed.contains(&r.service));
    service.env.retain(|key, value| {
        let keep = !references(value);
        if !keep {
            debug!("Dropping env {} of {}", key, service.name);
        }
        keep
    });

    let mut args: Vec<String> = Vec::with_capacity(service.args.len());
    for arg in std::mem::take(&mut service.args) {
        if !references(&arg) {
            args.push(arg);
            continue;
        }
        if let Some(flag) = args.last().filter(|prev| prev.starts_with('-')) {
            warn!(
                "Dropping '{}' of {} together with '{}' which references a removed service",
                flag, service.name, arg
            );
            args.pop();
            continue;
        }
        warn!("Dropping arg '{}' of {} which references a removed service", arg, service.name);
    }
    service.args = args;
}

/// A built-in recipe patched by a YAML document
pub struct YamlRecipe {
    name: String,
    file: RecipeFile,
    dir: PathBuf,
    base: Arc<dyn Recipe>,
}

impl std::fmt::Debug for YamlRecipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YamlRecipe")
            .field("name", &self.name)
            .field("base", &self.base.name())
            .field("dir", &self.dir)
            .finish()
    }
}

impl YamlRecipe {
    /// Load a recipe file; relative paths inside it resolve against its directory
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let dir = path
            .parent()
            .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
            .unwrap_or(Path::new("."));
        let dir = std::fs::canonicalize(dir)?;
        let mut recipe = Self::parse(&yaml, dir)?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            recipe.name = stem.to_string();
        }
        Ok(recipe)
    }

    /// Parse a recipe document
    pub fn parse(yaml: &str, dir: impl Into<PathBuf>) -> Result<Self> {
        let file: RecipeFile = serde_yaml::from_str(yaml)?;
        let base = find_recipe(&file.base)?;

        for (component, patch) in file.recipe.iter().flatten() {
            for (name, service) in patch.services.iter().flatten() {
                if service.args.is_some() && service.replace_args.is_some() {
                    return Err(Error::Override(format!(
                        "service '{}' in component '{}' sets both args and replace_args",
                        name, component
                    )));
                }
            }
        }

        Ok(Self { name: file.base.clone(), file, dir: dir.into(), base })
    }

    /// Recipe being patched
    pub fn base(&self) -> &Arc<dyn Recipe> {
        &self.base
    }

    /// Apply the patch to a tree produced by the base recipe
    pub fn patch(&self, tree: &mut ComponentTree, ctx: &mut RecipeContext<'_>) -> Result<()> {
        let Some(patches) = &self.file.recipe else {
            return Ok(());
        };

        let mut removed = Vec::new();
        for (component, patch) in patches {
            if patch.remove {
                match tree.find(component) {
                    Some(id) => {
                        let services = tree.remove(id);
                        info!("Removed component {} ({} services)", component, services.len());
                        removed.extend(services);
                    }
                    None => warn!("Component {} to remove does not exist", component),
                }
            }

            for (name, service) in patch.services.iter().flatten() {
                if !service.remove {
                    continue;
                }
                let Some(id) = tree.find(component) else {
                    return Err(Error::Override(format!(
                        "cannot remove service '{}' from unknown component '{}'",
                        name, component
                    )));
                };
                if tree.remove_service(id, name).is_none() {
                    return Err(Error::Override(format!(
                        "component '{}' has no service '{}' to remove",
                        component, name
                    )));
                }
                info!("Removed service {}", name);
                removed.push(name.clone());
            }
        }

        for (component, patch) in patches {
            let Some(services) = &patch.services else {
                continue;
            };
            let id = match tree.find(component) {
                Some(id) => id,
                None => {
                    debug!("Adding component {}", component);
                    let root = tree.root();
                    tree.add_component(root, component.clone())
                }
            };

            for (name, service_patch) in services {
                if service_patch.remove {
                    continue;
                }
                let depends_on = service_patch
                    .depends_on
                    .as_ref()
                    .map(|deps| deps.iter().map(|d| parse_depends_on(d, tree)).collect::<Result<Vec<_>>>())
                    .transpose()?;

                let existing = tree.services(id).iter().position(|s| &s.name == name);
                match existing {
                    Some(idx) => {
                        let service = &mut tree.services_mut(id)[idx];
                        self.apply_service(service, service_patch, depends_on, &ctx.artifacts.output)?;
                        debug!("Patched service {}", name);
                    }
                    None => {
                        let mut service = match &service_patch.component {
                            Some(kind) => ctx.registry.get(kind)?.clone().build(name, ctx)?,
                            None => Service::new(name.clone()),
                        };
                        self.apply_service(&mut service, service_patch, depends_on, &ctx.artifacts.output)?;
                        debug!("Added service {} to {}", name, component);
                        tree.add_service(id, service);
                    }
                }
            }
        }

        let alive: HashSet<&str> = tree.all_services().map(|s| s.name.as_str()).collect();
        let gone: HashSet<String> = removed
            .into_iter()
            .filter(|name| !alive.contains(name.as_str()))
            .collect();
        if !gone.is_empty() {
            tree.for_each_service_mut(|service| scrub_references(service, &gone));
        }
        Ok(())
    }

    fn apply_service(
        &self,
        service: &mut Service,
        patch: &ServicePatch,
        depends_on: Option<Vec<DependsOn>>,
        output: &Output,
    ) -> Result<()> {
        if let Some(image) = &patch.image {
            service.image = Some(image.clone());
            service.host_path = None;
            service.release = None;
        }
        if let Some(tag) = &patch.tag {
            service.tag = Some(tag.clone());
        }
        if let Some(host_path) = &patch.host_path {
            let path = if host_path.is_absolute() { host_path.clone() } else { self.dir.join(host_path) };
            service.host_path = Some(path);
            service.image = None;
            service.tag = None;
        }
        if let Some(release) = &patch.release {
            service.release = Some(release.clone());
            service.image = None;
            service.tag = None;
        }
        if let Some(entrypoint) = &patch.entrypoint {
            service.entrypoint = Some(entrypoint.clone());
        }
        if let Some(args) = &patch.args {
            service.args = args.clone();
        }
        if let Some(replacements) = &patch.replace_args {
            replace_args(&mut service.args, replacements);
        }
        service.env.extend(patch.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (label, spec) in &patch.ports {
            let (port, protocol) = spec.parse()?;
            service.declare_port(label, port, protocol)?;
        }

        for (container_path, source) in &patch.files {
            let artifact = match source.strip_prefix(ARTIFACT_PREFIX) {
                Some(artifact) => artifact.to_string(),
                None => {
                    let src = self.dir.join(source);
                    let file_name = src.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
                        Error::Override(format!("file '{}' of '{}' has no file name", source, service.name))
                    })?;
                    let artifact = format!("files/{}/{}", service.name, file_name);
                    output.copy_in(&src, &artifact)?;
                    artifact
                }
            };
            service.files_mapped.insert(container_path.clone(), artifact);
        }
        for (container_path, volume) in &patch.volumes {
            service.volumes_mapped.insert(container_path.clone(), parse_volume(volume));
        }

        if let Some(depends_on) = depends_on {
            service.depends_on = depends_on;
        }
        if let Some(check) = &patch.ready_check {
            service.ready_check = Some(check.apply(service.ready_check.take(), &service.name)?);
        }

        if let Some(enabled) = patch.lifecycle_hooks {
            service.lifecycle_hooks = enabled;
        }
        if let Some(init) = &patch.init {
            service.lifecycle.init = init.clone();
        }
        if let Some(start) = &patch.start {
            service.lifecycle.start = Some(start.clone());
        }
        if let Some(stop) = &patch.stop {
            service.lifecycle.stop = stop.clone();
        }

        service.labels.extend(patch.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(privileged) = patch.privileged {
            service.privileged = privileged;
        }
        if let Some(ungraceful) = patch.ungraceful_shutdown {
            service.ungraceful_shutdown = ungraceful;
        }
        service.recipe_dir = Some(self.dir.clone());
        Ok(())
    }
}

impl Recipe for YamlRecipe {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        self.file.description.as_deref().unwrap_or_else(|| self.base.description())
    }

    fn flags(&self) -> FlagSet {
        self.base.flags()
    }

    fn artifacts(&self, builder: ArtifactsBuilder, flags: &FlagSet) -> Result<ArtifactsBuilder> {
        self.base.artifacts(builder, flags)
    }

    fn apply(&self, ctx: &mut RecipeContext<'_>) -> Result<ComponentTree> {
        let mut tree = self.base.apply(ctx)?;
        self.patch(&mut tree, ctx)?;
        Ok(tree)
    }

    fn output(&self, manifest: &Manifest) -> BTreeMap<String, String> {
        self.base.output(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_replace_args() {
        let mut args = strings(&["node", "--http.port", "8545", "--debug", "--x=1"]);
        replace_args(&mut args, &strings(&["--http.port", "9000", "--x=2", "--new", "v"]));
        assert_eq!(args, strings(&["node", "--http.port", "9000", "--debug", "--x=2", "--new", "v"]));

        let mut args = strings(&["--debug", "--other"]);
        replace_args(&mut args, &strings(&["--debug", "trace"]));
        assert_eq!(args, strings(&["--debug", "trace", "--other"]));
    }

    #[test]
    fn test_scrub_drops_preceding_flag() {
        let mut service = Service::new("beacon").with_args([
            "bn",
            "--builder",
            r#"{{Service "mev-boost-relay" "http" "http" ""}}"#,
            r#"--inline={{Service "mev-boost-relay" "http"}}"#,
            "--http",
        ]);
        service = service
            .with_env("RELAY", r#"{{Service "mev-boost-relay" "http"}}"#)
            .with_env("KEEP", "1")
            .depends_on_healthy("mev-boost-relay")
            .depends_on_healthy("el");

        let removed: HashSet<String> = ["mev-boost-relay".to_string()].into();
        scrub_references(&mut service, &removed);

        assert_eq!(service.args, strings(&["bn", "--http"]));
        assert_eq!(service.env.keys().collect::<Vec<_>>(), vec!["KEEP"]);
        assert_eq!(service.depends_on.len(), 1);
        assert_eq!(service.depends_on[0].name, "el");
    }

    #[test]
    fn test_scrub_drops_flag_before_inline_reference() {
        let mut service = Service::new("beacon").with_args([
            "bn",
            "--builder",
            r#"--relay={{Service "x" "http"}}"#,
        ]);
        let removed: HashSet<String> = ["x".to_string()].into();
        scrub_references(&mut service, &removed);
        assert_eq!(service.args, strings(&["bn"]));
    }

    #[test]
    fn test_parse_depends_on() {
        let mut tree = ComponentTree::new("l1");
        let root = tree.root();
        tree.add_component(root, "cl");

        let dep = parse_depends_on("beacon", &tree).unwrap();
        assert_eq!(dep.condition, DependsOnCondition::Healthy);
        let dep = parse_depends_on("cl.beacon:running", &tree).unwrap();
        assert_eq!((dep.name.as_str(), dep.condition), ("beacon", DependsOnCondition::Started));
        assert!(parse_depends_on("nope.beacon", &tree).is_err());
        assert!(parse_depends_on("beacon:ready", &tree).is_err());
    }

    #[test]
    fn test_port_and_volume_specs() {
        assert_eq!(PortSpec::Number(8545).parse().unwrap(), (8545, Protocol::Tcp));
        assert_eq!(PortSpec::Text("30303/udp".into()).parse().unwrap(), (30303, Protocol::Udp));
        assert!(PortSpec::Text("x/sctp".into()).parse().is_err());

        assert_eq!(parse_volume("data"), Volume::shared("data"));
        assert_eq!(parse_volume("local:data"), Volume::local_bind("data"));
        assert_eq!(parse_volume("named:cache"), Volume::named("cache"));
    }

    #[test]
    fn test_args_and_replace_args_conflict() {
        let yaml = r#"
base: l1
recipe:
  el:
    services:
      el:
        args: ["node"]
        replace_args: ["--http.port", "1"]
"#;
        assert!(matches!(YamlRecipe::parse(yaml, "/tmp"), Err(Error::Override(_))));
    }

    #[test]
    fn test_unknown_base() {
        assert!(matches!(YamlRecipe::parse("base: l9", "/tmp"), Err(Error::UnknownRecipe(_))));
    }

    #[test]
    fn test_ready_check_patch_needs_probe() {
        let patch = ReadyCheckPatch { retries: Some(3), ..Default::default() };
        assert!(patch.apply(None, "x").is_err());

        let current = ReadyCheck::http("http://localhost:1");
        let patched = patch.apply(Some(current), "x").unwrap();
        assert_eq!(patched.retries, 3);

        let patch = ReadyCheckPatch {
            port: Some(5432),
            interval: Some("250ms".into()),
            ..Default::default()
        };
        let check = patch.apply(None, "x").unwrap();
        assert_eq!(check.port(), Some(5432));
        assert_eq!(check.interval, std::time::Duration::from_millis(250));
    }
}
