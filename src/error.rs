//! Error types for the container and the plugin host.

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use crate::key::ServiceId;

/// Dependency injection errors
///
/// Raised while resolving services. Resolution errors always reach the
/// caller; nothing is silently defaulted.
///
/// # Examples
///
/// ```rust
/// use warden_di::{Container, DiError, ServiceId};
/// use std::sync::Arc;
///
/// let container = Container::new();
/// match container.get_by_token::<String>("missing") {
///     Err(DiError::NotFound(id)) => assert_eq!(id, ServiceId::named("missing")),
///     _ => unreachable!(),
/// }
///
/// let circular = DiError::Circular(vec!["X".into(), "Y".into(), "X".into()]);
/// assert_eq!(circular.to_string(), "Circular dependency: X -> Y -> X");
/// ```
#[derive(Debug, Clone, Error)]
pub enum DiError {
    /// Service not registered
    #[error("Service not found: {0}")]
    NotFound(ServiceId),
    /// Registered instance is not of the requested type
    #[error("Type mismatch for {id}: expected {expected}")]
    TypeMismatch { id: ServiceId, expected: &'static str },
    /// Circular dependency detected (includes path)
    #[error("Circular dependency: {}", join_path(.0))]
    Circular(Vec<ServiceId>),
    /// Maximum recursion depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),
    /// Resolution attempted through a scope that was already disposed
    #[error("Scope {0} has been disposed")]
    ScopeDisposed(u64),
    /// A factory reported a failure of its own
    #[error("Failed to construct {id}: {reason}")]
    Construction { id: ServiceId, reason: String },
}

impl DiError {
    /// Wraps an arbitrary failure raised inside a factory.
    ///
    /// ```rust
    /// use warden_di::{Container, DiError};
    ///
    /// struct Pool;
    ///
    /// let container = Container::new();
    /// container.add_singleton_factory("pool", |_| -> Result<Pool, DiError> {
    ///     Err(DiError::construction("pool", "connection refused"))
    /// });
    /// let err = container.get_by_token::<Pool>("pool").err().unwrap();
    /// assert_eq!(err.to_string(), "Failed to construct pool: connection refused");
    /// ```
    pub fn construction(id: impl Into<ServiceId>, reason: impl Display) -> Self {
        DiError::Construction { id: id.into(), reason: reason.to_string() }
    }

    /// The cycle path for [`DiError::Circular`], `None` otherwise.
    pub fn cycle_path(&self) -> Option<&[ServiceId]> {
        match self {
            DiError::Circular(path) => Some(path),
            _ => None,
        }
    }
}

fn join_path(path: &[ServiceId]) -> String {
    path.iter()
        .map(|id| id.display_name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for DI operations
pub type DiResult<T> = Result<T, DiError>;

/// One problem found by
/// [`ServiceRegistry::validate_dependencies`](crate::ServiceRegistry::validate_dependencies).
///
/// These are returned as a list, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyValidationError {
    #[error("Service '{service}' is not registered")]
    ServiceNotRegistered { service: ServiceId },
    #[error("Service '{service}' depends on '{dependency}', which is not registered")]
    MissingDependency { service: ServiceId, dependency: ServiceId },
}

impl DependencyValidationError {
    /// The identifier that could not be found.
    pub fn missing(&self) -> &ServiceId {
        match self {
            DependencyValidationError::ServiceNotRegistered { service } => service,
            DependencyValidationError::MissingDependency { dependency, .. } => dependency,
        }
    }
}

/// Errors raised by the plugin host.
///
/// Attach errors (`DuplicateName`, `MissingDependency`, `CircularDependency`)
/// reject only the offending plugin. Lifecycle errors are collected per plugin
/// and never abort the other plugins.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PluginError {
    #[error("Plugin '{plugin}' is already attached")]
    DuplicateName { plugin: String },
    #[error("Plugin '{plugin}' depends on '{dependency}', which is not attached")]
    MissingDependency { plugin: String, dependency: String },
    #[error("Plugin '{plugin}' is part of a dependency cycle: {}", .cycle.join(" -> "))]
    CircularDependency { plugin: String, cycle: Vec<String> },
    #[error("Plugin '{plugin}' failed to initialize: {reason}")]
    Initialization { plugin: String, reason: String },
    #[error("Plugin '{plugin}' was not initialized because '{dependency}' is not active")]
    DependencyFailed { plugin: String, dependency: String },
    #[error("Plugin '{plugin}' failed while handling '{hook}': {reason}")]
    Execution { plugin: String, hook: String, reason: String },
    #[error("Plugin '{plugin}' failed to clean up: {reason}")]
    Cleanup { plugin: String, reason: String },
    #[error("Plugin '{plugin}' timed out during {operation} after {timeout:?}")]
    TimedOut { plugin: String, operation: &'static str, timeout: Duration },
    #[error("Plugin '{plugin}' was cancelled during {operation}")]
    Cancelled { plugin: String, operation: &'static str },
    #[error("Plugin '{plugin}' panicked during {operation}: {message}")]
    Panicked { plugin: String, operation: &'static str, message: String },
    #[error("Plugin '{plugin}' is required by {}", .dependents.join(", "))]
    HasDependents { plugin: String, dependents: Vec<String> },
    #[error("Plugin '{plugin}' is not attached")]
    NotFound { plugin: String },
}

impl PluginError {
    /// Name of the plugin the error belongs to.
    pub fn plugin(&self) -> &str {
        match self {
            PluginError::DuplicateName { plugin }
            | PluginError::MissingDependency { plugin, .. }
            | PluginError::CircularDependency { plugin, .. }
            | PluginError::Initialization { plugin, .. }
            | PluginError::DependencyFailed { plugin, .. }
            | PluginError::Execution { plugin, .. }
            | PluginError::Cleanup { plugin, .. }
            | PluginError::TimedOut { plugin, .. }
            | PluginError::Cancelled { plugin, .. }
            | PluginError::Panicked { plugin, .. }
            | PluginError::HasDependents { plugin, .. }
            | PluginError::NotFound { plugin } => plugin,
        }
    }

    /// True for errors raised while attaching a plugin.
    pub fn is_attach_error(&self) -> bool {
        matches!(
            self,
            PluginError::DuplicateName { .. }
                | PluginError::MissingDependency { .. }
                | PluginError::CircularDependency { .. }
        )
    }
}

pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_the_missing_dependency() {
        let err = DependencyValidationError::MissingDependency {
            service: "Auth".into(),
            dependency: "B".into(),
        };
        assert_eq!(err.missing(), &ServiceId::named("B"));
        assert!(err.to_string().contains("'B'"));
    }

    #[test]
    fn plugin_error_exposes_owner() {
        let err = PluginError::CircularDependency {
            plugin: "a".into(),
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.plugin(), "a");
        assert!(err.is_attach_error());
        assert_eq!(err.to_string(), "Plugin 'a' is part of a dependency cycle: a -> b -> a");
    }
}
