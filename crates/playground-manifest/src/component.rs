//! Component tree built by recipes.
//!
//! Nodes live in an arena and are addressed by [`ComponentId`], so YAML
//! overrides can remove or append components without invalidating handles
//! held elsewhere. Child order is insertion order.

use crate::Service;
use serde::Serialize;

/// Handle to a component in a [`ComponentTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(usize);

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<ComponentId>,
    inner: Vec<ComponentId>,
    services: Vec<Service>,
    removed: bool,
}

/// Arena-allocated tree of components
#[derive(Debug, Clone)]
pub struct ComponentTree {
    nodes: Vec<Node>,
}

/// Structural snapshot of a tree, used to compare trees
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentShape {
    /// Component name
    pub name: String,
    /// Services in JSON form
    pub services: Vec<serde_json::Value>,
    /// Child components
    pub inner: Vec<ComponentShape>,
}

impl ComponentTree {
    /// Create a tree with a root component
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node {
                name: name.into(),
                parent: None,
                inner: Vec::new(),
                services: Vec::new(),
                removed: false,
            }],
        }
    }

    /// Root component
    pub fn root(&self) -> ComponentId {
        ComponentId(0)
    }

    /// Append a child component
    pub fn add_component(&mut self, parent: ComponentId, name: impl Into<String>) -> ComponentId {
        let id = ComponentId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            parent: Some(parent),
            inner: Vec::new(),
            services: Vec::new(),
            removed: false,
        });
        self.nodes[parent.0].inner.push(id);
        id
    }

    /// Append a service to a component
    pub fn add_service(&mut self, id: ComponentId, service: Service) -> &mut Service {
        let services = &mut self.nodes[id.0].services;
        services.push(service);
        let last = services.len() - 1;
        &mut services[last]
    }

    /// Component name
    pub fn name(&self, id: ComponentId) -> &str {
        &self.nodes[id.0].name
    }

    /// Parent of a component, `None` for the root
    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.nodes[id.0].parent
    }

    /// Children in insertion order
    pub fn children(&self, id: ComponentId) -> &[ComponentId] {
        &self.nodes[id.0].inner
    }

    /// Direct services of a component
    pub fn services(&self, id: ComponentId) -> &[Service] {
        &self.nodes[id.0].services
    }

    /// Mutable direct services of a component
    pub fn services_mut(&mut self, id: ComponentId) -> &mut Vec<Service> {
        &mut self.nodes[id.0].services
    }

    /// Live components in depth-first pre-order, root first
    pub fn walk(&self) -> Vec<ComponentId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].inner.iter().rev().copied());
        }
        order
    }

    /// First live component with the given name, in walk order
    pub fn find(&self, name: &str) -> Option<ComponentId> {
        self.walk().into_iter().find(|id| self.name(*id) == name)
    }

    /// Component holding the service with the given name
    pub fn find_service(&self, name: &str) -> Option<(ComponentId, usize)> {
        self.walk().into_iter().find_map(|id| {
            self.nodes[id.0]
                .services
                .iter()
                .position(|s| s.name == name)
                .map(|idx| (id, idx))
        })
    }

    /// Detach a component and its subtree, returning the names of the
    /// services that went with it
    pub fn remove(&mut self, id: ComponentId) -> Vec<String> {
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].inner.retain(|child| *child != id);
        }

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            node.removed = true;
            removed.extend(node.services.drain(..).map(|s| s.name));
            stack.extend(node.inner.iter().copied());
        }
        removed
    }

    /// Remove a single service from a component
    pub fn remove_service(&mut self, id: ComponentId, name: &str) -> Option<Service> {
        let services = &mut self.nodes[id.0].services;
        let idx = services.iter().position(|s| s.name == name)?;
        Some(services.remove(idx))
    }

    /// Whether a handle still points at a live component
    pub fn is_live(&self, id: ComponentId) -> bool {
        !self.nodes[id.0].removed
    }

    /// All services in walk order
    pub fn all_services(&self) -> impl Iterator<Item = &Service> {
        self.walk()
            .into_iter()
            .flat_map(move |id| self.nodes[id.0].services.iter())
    }

    /// Apply `f` to every service in walk order
    pub fn for_each_service_mut(&mut self, mut f: impl FnMut(&mut Service)) {
        for id in self.walk() {
            for service in &mut self.nodes[id.0].services {
                f(service);
            }
        }
    }

    /// Structural snapshot starting at the root
    pub fn shape(&self) -> ComponentShape {
        self.shape_of(self.root())
    }

    fn shape_of(&self, id: ComponentId) -> ComponentShape {
        let node = &self.nodes[id.0];
        ComponentShape {
            name: node.name.clone(),
            services: node
                .services
                .iter()
                .map(|s| serde_json::to_value(s).unwrap_or(serde_json::Value::Null))
                .collect(),
            inner: node.inner.iter().map(|child| self.shape_of(*child)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ComponentTree {
        let mut tree = ComponentTree::new("l1");
        let root = tree.root();
        let el = tree.add_component(root, "el");
        tree.add_service(el, Service::new("el"));
        let cl = tree.add_component(root, "cl");
        let beacon = tree.add_component(cl, "beacon");
        tree.add_service(beacon, Service::new("beacon"));
        tree.add_service(cl, Service::new("validator"));
        tree
    }

    #[test]
    fn test_walk_is_depth_first_and_stable() {
        let tree = sample();
        let names: Vec<_> = tree.walk().into_iter().map(|id| tree.name(id).to_string()).collect();
        assert_eq!(names, vec!["l1", "el", "cl", "beacon"]);

        let services: Vec<_> = tree.all_services().map(|s| s.name.as_str()).collect();
        assert_eq!(services, vec!["el", "validator", "beacon"]);
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = sample();
        let cl = tree.find("cl").unwrap();
        let mut removed = tree.remove(cl);
        removed.sort();
        assert_eq!(removed, vec!["beacon", "validator"]);
        assert!(!tree.is_live(cl));
        assert!(tree.find("beacon").is_none());

        let again = tree.add_component(tree.root(), "cl");
        assert_ne!(again, cl);
        assert!(tree.services(again).is_empty());
        assert_eq!(tree.find("cl"), Some(again));
    }

    #[test]
    fn test_find_service() {
        let mut tree = sample();
        let (id, idx) = tree.find_service("beacon").unwrap();
        assert_eq!(tree.name(id), "beacon");
        assert_eq!(idx, 0);
        assert!(tree.remove_service(id, "beacon").is_some());
        assert!(tree.find_service("beacon").is_none());
    }

    #[test]
    fn test_shape_equality() {
        assert_eq!(sample().shape(), sample().shape());
        let mut other = sample();
        let root = other.root();
        other.add_component(root, "extra");
        assert_ne!(sample().shape(), other.shape());
    }
}
