//! Table rendering for command output.

use comfy_table::{Cell, Color, Table};
use playground_manifest::{Manifest, Service};
use playground_recipes::Recipe;
use std::collections::BTreeMap;
use std::sync::Arc;

fn kind(service: &Service) -> (&'static str, Color) {
    if service.is_lifecycle() {
        ("lifecycle", Color::Magenta)
    } else if service.is_host() {
        ("host", Color::Yellow)
    } else {
        ("container", Color::Cyan)
    }
}

fn source(service: &Service) -> String {
    if let Some(image) = service.image_ref() {
        return image;
    }
    if let Some(path) = &service.host_path {
        return path.display().to_string();
    }
    if let Some(release) = &service.release {
        return release.cache_key();
    }
    "-".to_string()
}

fn ports(service: &Service) -> String {
    service
        .ports
        .iter()
        .map(|p| match p.host_port {
            Some(host) => format!("{}: {}->{}/{}", p.name, host, p.container_port, p.protocol),
            None => format!("{}: {}/{}", p.name, p.container_port, p.protocol),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Services of a manifest in startup order
pub fn services(manifest: &Manifest) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "KIND", "IMAGE/BINARY", "PORTS"]);

    let order = manifest.startup_order().unwrap_or_default();
    for name in order {
        let Some(service) = manifest.service(name) else {
            continue;
        };
        let (kind, color) = kind(service);
        table.add_row(vec![
            Cell::new(&service.name),
            Cell::new(kind).fg(color),
            Cell::new(source(service)),
            Cell::new(ports(service)),
        ]);
    }
    table
}

/// User-facing endpoints of a running session
pub fn endpoints(endpoints: &BTreeMap<String, String>) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ENDPOINT", "URL"]);
    for (name, url) in endpoints {
        table.add_row(vec![Cell::new(name), Cell::new(url).fg(Color::Green)]);
    }
    table
}

/// Built-in recipes with their flags
pub fn recipes(recipes: &[Arc<dyn Recipe>]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["RECIPE", "DESCRIPTION", "FLAGS"]);
    for recipe in recipes {
        let flags = recipe
            .flags()
            .describe()
            .into_iter()
            .map(|(name, kind, default, description)| {
                format!("--flag {}=<{}> (default {}) {}", name, kind, default, description)
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(recipe.name()).fg(Color::Green),
            Cell::new(recipe.description()),
            Cell::new(flags),
        ]);
    }
    table
}
