//! Structural validation of a flattened service list.

use crate::{BootnodeRef, DependsOnCondition, Error, Protocol, Result, Service};
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::LazyLock;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("name regex is valid"));

fn invalid(msg: String) -> Error {
    Error::Validation(msg)
}

/// Validate services as a manifest would hold them.
///
/// Expects templates to have been recorded so that ports and node
/// references are populated.
pub fn validate_services(services: &[Service], bootnode: Option<&BootnodeRef>) -> Result<()> {
    let mut by_name: HashMap<&str, &Service> = HashMap::new();
    for service in services {
        if !NAME_RE.is_match(&service.name) {
            return Err(invalid(format!(
                "service name '{}' must be lowercase and dash separated",
                service.name
            )));
        }
        if by_name.insert(service.name.as_str(), service).is_some() {
            return Err(invalid(format!("duplicate service name '{}'", service.name)));
        }
    }

    for service in services {
        validate_execution(service)?;
        validate_ports(service)?;
    }

    for service in services {
        for dep in &service.depends_on {
            let target = by_name.get(dep.name.as_str()).ok_or_else(|| {
                invalid(format!(
                    "service '{}' depends on unknown service '{}'",
                    service.name, dep.name
                ))
            })?;
            if dep.condition == DependsOnCondition::Healthy && target.ready_check.is_none() {
                return Err(invalid(format!(
                    "service '{}' waits for '{}' to be healthy but '{}' has no ready check",
                    service.name, dep.name, dep.name
                )));
            }
        }

        for node_ref in &service.node_refs {
            let target = by_name.get(node_ref.service.as_str()).ok_or_else(|| {
                invalid(format!(
                    "service '{}' references unknown service '{}'",
                    service.name, node_ref.service
                ))
            })?;
            if target.port(&node_ref.port_label).is_none() {
                return Err(invalid(format!(
                    "service '{}' references port '{}' which '{}' does not expose",
                    service.name, node_ref.port_label, node_ref.service
                )));
            }
        }
    }

    if let Some(bootnode) = bootnode {
        let target = by_name.get(bootnode.service.as_str()).ok_or_else(|| {
            invalid(format!("bootnode service '{}' does not exist", bootnode.service))
        })?;
        if target.port("rlpx").is_none() {
            return Err(invalid(format!(
                "bootnode service '{}' exposes no 'rlpx' port",
                bootnode.service
            )));
        }
    }

    dependency_order(services)?;
    Ok(())
}

fn validate_execution(service: &Service) -> Result<()> {
    let name = &service.name;

    if service.host_path.is_some() && service.image.is_some() {
        return Err(invalid(format!(
            "service '{}' declares both host_path and image",
            name
        )));
    }
    if service.release.is_some() && service.image.is_some() {
        return Err(invalid(format!("service '{}' declares both release and image", name)));
    }

    if service.lifecycle_hooks {
        if service.lifecycle.init.is_empty() && service.lifecycle.start.is_none() {
            return Err(invalid(format!(
                "service '{}' enables lifecycle hooks but sets neither init nor start",
                name
            )));
        }
        if service.release.is_some() || service.host_path.is_some() || !service.args.is_empty() {
            return Err(invalid(format!(
                "service '{}' mixes lifecycle hooks with release, host_path or args",
                name
            )));
        }
    } else {
        if !service.lifecycle.is_empty() {
            return Err(invalid(format!(
                "service '{}' declares lifecycle commands without lifecycle_hooks",
                name
            )));
        }
        if service.image.is_none() && service.host_path.is_none() && service.release.is_none() {
            return Err(invalid(format!(
                "service '{}' has no image, host_path, release or lifecycle hooks",
                name
            )));
        }
    }

    if let Some(path) = &service.host_path {
        if !path.is_absolute() {
            return Err(invalid(format!(
                "host_path '{}' of service '{}' is not absolute",
                path.display(),
                name
            )));
        }
        if !path.exists() {
            return Err(invalid(format!(
                "host_path '{}' of service '{}' does not exist",
                path.display(),
                name
            )));
        }
    }
    Ok(())
}

fn validate_ports(service: &Service) -> Result<()> {
    let mut seen: HashMap<(&str, Protocol), u16> = HashMap::new();
    for port in &service.ports {
        if let Some(previous) = seen.insert((port.name.as_str(), port.protocol), port.container_port) {
            if previous != port.container_port {
                return Err(invalid(format!(
                    "service '{}' declares port '{}'/{} as both {} and {}",
                    service.name, port.name, port.protocol, previous, port.container_port
                )));
            }
            return Err(invalid(format!(
                "service '{}' declares port '{}'/{} twice",
                service.name, port.name, port.protocol
            )));
        }
    }
    Ok(())
}

/// Services ordered so that every service comes after its dependencies
pub fn dependency_order(services: &[Service]) -> Result<Vec<&str>> {
    let names: HashSet<&str> = services.iter().map(|s| s.name.as_str()).collect();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for service in services {
        in_degree.entry(service.name.as_str()).or_insert(0);
        for dep in &service.depends_on {
            if !names.contains(dep.name.as_str()) {
                continue;
            }
            *in_degree.entry(service.name.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.name.as_str())
                .or_default()
                .push(service.name.as_str());
        }
    }

    // Seed in declaration order so the result is stable
    let mut queue: VecDeque<&str> = services
        .iter()
        .map(|s| s.name.as_str())
        .filter(|n| in_degree.get(n) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(services.len());

    while let Some(name) = queue.pop_front() {
        order.push(name);
        for &dependent in dependents.get(name).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if order.len() != in_degree.len() {
        let mut cycle: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(n, _)| *n)
            .collect();
        cycle.sort_unstable();
        return Err(invalid(format!(
            "circular dependency between services: {}",
            cycle.join(", ")
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Lifecycle, ReadyCheck, template};

    fn svc(name: &str) -> Service {
        Service::new(name).with_image("busybox")
    }

    fn recorded(mut service: Service) -> Service {
        template::record_service(&mut service).unwrap();
        service
    }

    fn err(services: &[Service]) -> String {
        validate_services(services, None).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_graph() {
        let services = vec![
            recorded(svc("el").with_args([r#"{{Port "http" 8545}}"#]).with_ready_check(ReadyCheck::http("http://localhost:8545"))),
            recorded(svc("beacon").depends_on_healthy("el").with_args([r#"{{Service "el" "http" "http" ""}}"#])),
        ];
        validate_services(&services, None).unwrap();
        assert_eq!(dependency_order(&services).unwrap(), vec!["el", "beacon"]);
    }

    #[test]
    fn test_duplicate_and_bad_names() {
        assert!(err(&[svc("el"), svc("el")]).contains("duplicate"));
        assert!(err(&[svc("El_1")]).contains("lowercase"));
    }

    #[test]
    fn test_dependency_rules() {
        assert!(err(&[svc("a").depends_on_healthy("ghost")]).contains("unknown service 'ghost'"));
        assert!(err(&[svc("a"), svc("b").depends_on_healthy("a")]).contains("no ready check"));
        validate_services(&[svc("a"), svc("b").depends_on_started("a")], None).unwrap();
    }

    #[test]
    fn test_node_ref_rules() {
        let caller = recorded(svc("b").with_args([r#"{{Service "a" "rpc"}}"#]));
        assert!(err(&[svc("a"), caller.clone()]).contains("does not expose"));
        assert!(err(&[caller]).contains("unknown service 'a'"));
    }

    #[test]
    fn test_execution_rules() {
        let mut both = svc("a");
        both.host_path = Some("/bin/sh".into());
        assert!(err(&[both]).contains("both host_path and image"));

        assert!(err(&[Service::new("a")]).contains("no image"));

        let missing = Service::new("a").with_host_path("/definitely/not/here");
        assert!(err(&[missing]).contains("does not exist"));

        let mut hooks = Service::new("a");
        hooks.lifecycle_hooks = true;
        assert!(err(&[hooks.clone()]).contains("neither init nor start"));

        hooks.lifecycle = Lifecycle { start: Some("sleep 1".into()), ..Default::default() };
        validate_services(&[hooks.clone()], None).unwrap();

        hooks.args = vec!["--x".into()];
        assert!(err(&[hooks]).contains("mixes lifecycle"));

        let mut stray = svc("a");
        stray.lifecycle.stop = vec!["true".into()];
        assert!(err(&[stray]).contains("without lifecycle_hooks"));
    }

    #[test]
    fn test_cycle_detection() {
        let services = vec![svc("a").depends_on_started("b"), svc("b").depends_on_started("a"), svc("c")];
        let msg = err(&services);
        assert!(msg.contains("circular"));
        assert!(msg.contains("a, b"));
    }

    #[test]
    fn test_bootnode_must_expose_rlpx() {
        let services = vec![recorded(svc("el").with_args([r#"{{Port "rlpx" 30303}}"#])), svc("x")];
        let ok = BootnodeRef { service: "el".into(), id: "00".into() };
        validate_services(&services, Some(&ok)).unwrap();
        let bad = BootnodeRef { service: "x".into(), id: "00".into() };
        assert!(validate_services(&services, Some(&bad)).is_err());
    }
}
