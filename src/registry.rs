//! Service registry: descriptor bookkeeping, no resolution.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::descriptors::ServiceDescriptor;
use crate::error::DependencyValidationError;
use crate::key::ServiceId;
use crate::lifetime::Lifetime;
use crate::validation::{self, ValidationReport};

/// Descriptor store keyed by [`ServiceId`].
///
/// Holds at most one descriptor per identifier. Registering an identifier a
/// second time replaces the previous descriptor in place, so iteration order
/// stays the order in which identifiers were first seen.
///
/// # Examples
///
/// ```rust
/// use warden_di::{Lifetime, ServiceDescriptor, ServiceId, ServiceRegistry};
/// use std::sync::Arc;
///
/// let mut registry = ServiceRegistry::new();
/// registry.register(ServiceDescriptor::singleton("A", |_| Ok(Arc::new(1u8))));
/// registry.register(
///     ServiceDescriptor::transient("Auth", |_| Ok(Arc::new(2u8))).with_dependencies(["A", "B"]),
/// );
///
/// let errors = registry.validate_dependencies(&"Auth".into());
/// assert_eq!(errors.len(), 1);
/// assert_eq!(errors[0].missing(), &ServiceId::named("B"));
///
/// assert_eq!(registry.by_lifetime(Lifetime::Singleton).len(), 1);
/// ```
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    entries: Vec<ServiceDescriptor>,
    index: HashMap<ServiceId, usize>,
    next_revision: u64,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a descriptor. Returns the revision stamped on it.
    pub fn register(&mut self, mut descriptor: ServiceDescriptor) -> u64 {
        self.next_revision += 1;
        descriptor.revision = self.next_revision;

        match self.index.get(&descriptor.id).copied() {
            Some(pos) => self.entries[pos] = descriptor,
            None => {
                self.index.insert(descriptor.id.clone(), self.entries.len());
                self.entries.push(descriptor);
            }
        }
        self.next_revision
    }

    pub fn unregister(&mut self, id: &ServiceId) -> Option<ServiceDescriptor> {
        let pos = self.index.remove(id)?;
        let removed = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    #[inline]
    pub fn get(&self, id: &ServiceId) -> Option<&ServiceDescriptor> {
        self.index.get(id).map(|&pos| &self.entries[pos])
    }

    #[inline]
    pub fn has(&self, id: &ServiceId) -> bool {
        self.index.contains_key(id)
    }

    /// All descriptors in registration order.
    pub fn all(&self) -> Vec<&ServiceDescriptor> {
        self.entries.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn by_lifetime(&self, lifetime: Lifetime) -> Vec<&ServiceDescriptor> {
        self.entries.iter().filter(|d| d.lifetime == lifetime).collect()
    }

    /// Declared dependencies of every service, in registration order.
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph {
            nodes: self
                .entries
                .iter()
                .map(|d| (d.id.clone(), d.dependencies.clone()))
                .collect(),
        }
    }

    /// Reports every declared dependency of `id` that is not registered.
    ///
    /// Only direct dependencies are checked; cycles are caught at resolution
    /// time or by [`ServiceRegistry::validate_all`].
    pub fn validate_dependencies(&self, id: &ServiceId) -> Vec<DependencyValidationError> {
        let Some(descriptor) = self.get(id) else {
            return vec![DependencyValidationError::ServiceNotRegistered { service: id.clone() }];
        };

        descriptor
            .dependencies
            .iter()
            .filter(|dep| !self.has(dep))
            .map(|dep| DependencyValidationError::MissingDependency {
                service: id.clone(),
                dependency: dep.clone(),
            })
            .collect()
    }

    /// Whole-registry check: missing dependencies, declared cycles and
    /// lifetime mismatches.
    pub fn validate_all(&self) -> ValidationReport {
        validation::validate_registry(self)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

/// Snapshot of declared dependencies: `{id: [dependency ids]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: Vec<(ServiceId, Vec<ServiceId>)>,
}

impl DependencyGraph {
    pub fn dependencies_of(&self, id: &ServiceId) -> Option<&[ServiceId]> {
        self.nodes
            .iter()
            .find(|(node, _)| node == id)
            .map(|(_, deps)| deps.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServiceId, &[ServiceId])> {
        self.nodes.iter().map(|(id, deps)| (id, deps.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Services that declare `id` as a dependency.
    pub fn dependents_of(&self, id: &ServiceId) -> Vec<&ServiceId> {
        self.nodes
            .iter()
            .filter(|(_, deps)| deps.contains(id))
            .map(|(node, _)| node)
            .collect()
    }

    /// JSON object keyed by display name.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (id, deps) in &self.nodes {
            let deps = deps.iter().map(|d| Value::String(d.to_string())).collect();
            map.insert(id.to_string(), Value::Array(deps));
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn unit(id: &'static str) -> ServiceDescriptor {
        ServiceDescriptor::transient(id, |_| Ok(Arc::new(())))
    }

    #[test]
    fn overwrite_keeps_position_and_bumps_revision() {
        let mut registry = ServiceRegistry::new();
        let first = registry.register(unit("a"));
        registry.register(unit("b"));
        let second = registry.register(unit("a").depends_on("b"));

        assert!(second > first);
        let ids: Vec<_> = registry.iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(registry.get(&"a".into()).unwrap().dependencies.len(), 1);
    }

    #[test]
    fn unregister_reindexes_followers() {
        let mut registry = ServiceRegistry::new();
        registry.register(unit("a"));
        registry.register(unit("b"));
        registry.register(unit("c"));

        assert!(registry.unregister(&"a".into()).is_some());
        assert!(registry.unregister(&"a".into()).is_none());
        assert_eq!(registry.get(&"c".into()).unwrap().id, ServiceId::named("c"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn validate_unknown_service() {
        let registry = ServiceRegistry::new();
        let errors = registry.validate_dependencies(&"ghost".into());
        assert_eq!(
            errors,
            vec![DependencyValidationError::ServiceNotRegistered { service: "ghost".into() }]
        );
    }

    #[test]
    fn validation_is_one_level_deep() {
        let mut registry = ServiceRegistry::new();
        registry.register(unit("top").depends_on("mid"));
        registry.register(unit("mid").depends_on("missing"));

        assert!(registry.validate_dependencies(&"top".into()).is_empty());
        assert_eq!(registry.validate_dependencies(&"mid".into()).len(), 1);
    }

    #[test]
    fn graph_json_uses_display_names() {
        let mut registry = ServiceRegistry::new();
        registry.register(unit("a").depends_on(ServiceId::token("b")));
        let json = registry.dependency_graph().to_json();
        assert_eq!(json["a"][0], "@b");
    }

    #[test]
    fn clear_empties_everything() {
        let mut registry = ServiceRegistry::new();
        registry.register(unit("a"));
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.has(&"a".into()));
    }
}
