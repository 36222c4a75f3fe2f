//! Whole-registry validation of declared dependencies.
//!
//! Catches configuration errors before anything is resolved: dependencies
//! that are not registered, declared dependency cycles, and singletons that
//! would capture a scoped service.

use std::collections::HashMap;
use std::fmt;

use crate::error::DependencyValidationError;
use crate::key::ServiceId;
use crate::lifetime::Lifetime;
use crate::registry::ServiceRegistry;

/// Result of [`ServiceRegistry::validate_all`].
///
/// # Examples
///
/// ```rust
/// use warden_di::{ServiceDescriptor, ServiceRegistry, ValidationError};
/// use std::sync::Arc;
///
/// let mut registry = ServiceRegistry::new();
/// registry.register(ServiceDescriptor::singleton("X", |_| Ok(Arc::new(()))).depends_on("Y"));
/// registry.register(ServiceDescriptor::singleton("Y", |_| Ok(Arc::new(()))).depends_on("X"));
///
/// let report = registry.validate_all();
/// assert!(!report.is_valid());
/// assert!(matches!(report.errors[0], ValidationError::CircularDependency { .. }));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingDependency(DependencyValidationError),
    CircularDependency { cycle: Vec<ServiceId> },
    SingletonDependsOnScoped { singleton: ServiceId, scoped: ServiceId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    SingletonDependsOnTransient { singleton: ServiceId, transient: ServiceId },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingDependency(err) => fmt::Display::fmt(err, f),
            ValidationError::CircularDependency { cycle } => {
                let names: Vec<_> = cycle.iter().map(|id| id.display_name()).collect();
                write!(f, "Declared dependency cycle: {}", names.join(" -> "))
            }
            ValidationError::SingletonDependsOnScoped { singleton, scoped } => write!(
                f,
                "Singleton '{}' depends on scoped service '{}'",
                singleton, scoped
            ),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

pub(crate) fn validate_registry(registry: &ServiceRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();

    for descriptor in registry.iter() {
        report.errors.extend(
            registry
                .validate_dependencies(&descriptor.id)
                .into_iter()
                .map(ValidationError::MissingDependency),
        );

        if descriptor.lifetime != Lifetime::Singleton {
            continue;
        }
        for dep in &descriptor.dependencies {
            match registry.get(dep).map(|d| d.lifetime) {
                Some(Lifetime::Scoped) => {
                    report.errors.push(ValidationError::SingletonDependsOnScoped {
                        singleton: descriptor.id.clone(),
                        scoped: dep.clone(),
                    });
                }
                Some(Lifetime::Transient) => {
                    report.warnings.push(ValidationWarning::SingletonDependsOnTransient {
                        singleton: descriptor.id.clone(),
                        transient: dep.clone(),
                    });
                }
                _ => {}
            }
        }
    }

    let cycles = detect_cycles(registry);
    report
        .errors
        .extend(cycles.into_iter().map(|cycle| ValidationError::CircularDependency { cycle }));
    report
}

/// Depth-first search over declared dependencies. Each back edge yields one
/// cycle, reported from the first repeated node back to itself.
fn detect_cycles(registry: &ServiceRegistry) -> Vec<Vec<ServiceId>> {
    let mut marks: HashMap<&ServiceId, Mark> =
        registry.iter().map(|d| (&d.id, Mark::Unvisited)).collect();
    let mut cycles = Vec::new();
    let mut stack = Vec::new();

    for descriptor in registry.iter() {
        if marks.get(&descriptor.id) == Some(&Mark::Unvisited) {
            visit(registry, &descriptor.id, &mut marks, &mut stack, &mut cycles);
        }
    }
    cycles
}

fn visit<'r>(
    registry: &'r ServiceRegistry,
    id: &'r ServiceId,
    marks: &mut HashMap<&'r ServiceId, Mark>,
    stack: &mut Vec<&'r ServiceId>,
    cycles: &mut Vec<Vec<ServiceId>>,
) {
    marks.insert(id, Mark::InProgress);
    stack.push(id);

    if let Some(descriptor) = registry.get(id) {
        for dep in &descriptor.dependencies {
            match marks.get(dep).copied() {
                Some(Mark::Unvisited) => visit(registry, dep, marks, stack, cycles),
                Some(Mark::InProgress) => {
                    if let Some(start) = stack.iter().position(|s| *s == dep) {
                        let mut cycle: Vec<ServiceId> =
                            stack[start..].iter().map(|s| (*s).clone()).collect();
                        cycle.push(dep.clone());
                        cycles.push(cycle);
                    }
                }
                // Done, or not registered (reported as a missing dependency)
                _ => {}
            }
        }
    }

    stack.pop();
    marks.insert(id, Mark::Done);
}
