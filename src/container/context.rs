//! Resolver context handed to factories.

use std::sync::Arc;

use crate::container::{downcast, Container, Scope};
use crate::descriptors::Instance;
use crate::error::DiResult;
use crate::internal::ResolutionPath;
use crate::key::{ServiceId, ServiceKey};

/// Context passed to factory functions for resolving dependencies.
///
/// Lookups made through the context continue the resolution that invoked
/// the factory: they share its scope and its in-progress path, which is how
/// cycles like `X -> Y -> X` are detected instead of recursing forever.
///
/// # Examples
///
/// ```
/// use warden_di::{Container, DiError};
/// use std::sync::Arc;
///
/// struct X;
/// struct Y;
///
/// let container = Container::new();
/// container.add_transient_factory("X", |ctx| {
///     let _y: Arc<Y> = ctx.get("Y")?;
///     Ok(X)
/// });
/// container.add_transient_factory("Y", |ctx| {
///     let _x: Arc<X> = ctx.get("X")?;
///     Ok(Y)
/// });
///
/// match container.get::<X>("X") {
///     Err(DiError::Circular(path)) => assert_eq!(path.len(), 3),
///     _ => unreachable!(),
/// }
/// ```
pub struct ResolverContext<'a> {
    container: &'a Container,
    scope: Option<&'a Scope>,
    path: &'a ResolutionPath,
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new(
        container: &'a Container,
        scope: Option<&'a Scope>,
        path: &'a ResolutionPath,
    ) -> Self {
        Self { container, scope, path }
    }

    pub fn get<T>(&self, key: impl ServiceKey<T>) -> DiResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = key.service_id();
        let instance = self.resolve(&id)?;
        downcast(&id, instance)
    }

    /// `Ok(None)` when `key` is not registered.
    pub fn try_get<T>(&self, key: impl ServiceKey<T>) -> DiResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = key.service_id();
        if !self.container.has(id.clone()) {
            return Ok(None);
        }
        let instance = self.resolve(&id)?;
        downcast(&id, instance).map(Some)
    }

    pub fn resolve(&self, id: &ServiceId) -> DiResult<Instance> {
        self.container.resolve_in(id, self.scope, self.path)
    }

    pub fn container(&self) -> &'a Container {
        self.container
    }

    /// The scope this resolution runs in, if any. Singletons always see `None`.
    pub fn scope(&self) -> Option<&'a Scope> {
        self.scope
    }

    /// Identifiers under construction, outermost first. The last entry is
    /// the service whose factory received this context.
    pub fn resolution_path(&self) -> &[ServiceId] {
        self.path.as_slice()
    }
}
