//! Service container: turns identifiers into live instances.
//!
//! The container owns its registry, its singleton cache and its observers.
//! Nothing is process-global, so independent containers (one per test, one
//! per tenant) never interfere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::descriptors::{Instance, ServiceDescriptor};
use crate::error::{DependencyValidationError, DiError, DiResult};
use crate::internal::ResolutionPath;
use crate::key::{ServiceId, ServiceKey};
use crate::lifetime::Lifetime;
use crate::observer::{ContainerObserver, Observers};
use crate::registry::{DependencyGraph, ServiceRegistry};
use crate::validation::ValidationReport;

pub mod context;
pub mod scope;

pub use context::ResolverContext;
pub use scope::Scope;

#[derive(Clone)]
pub(crate) struct CachedInstance {
    pub(crate) revision: u64,
    pub(crate) value: Instance,
}

impl CachedInstance {
    /// Serves the cached value only if it was built from `descriptor`.
    #[inline]
    pub(crate) fn current_for(&self, descriptor: &ServiceDescriptor) -> Option<Instance> {
        (self.revision == descriptor.revision).then(|| self.value.clone())
    }
}

/// Stores `value` unless a newer registration already cached something, and
/// returns whichever instance callers should observe.
pub(crate) fn store_or_reuse(
    cache: &mut HashMap<ServiceId, CachedInstance>,
    descriptor: &ServiceDescriptor,
    value: Instance,
) -> Instance {
    match cache.get(&descriptor.id) {
        Some(existing) if existing.revision == descriptor.revision => existing.value.clone(),
        Some(existing) if existing.revision > descriptor.revision => value,
        _ => {
            cache.insert(
                descriptor.id.clone(),
                CachedInstance { revision: descriptor.revision, value: value.clone() },
            );
            value
        }
    }
}

pub(crate) fn downcast<T>(id: &ServiceId, instance: Instance) -> DiResult<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance
        .downcast::<Arc<T>>()
        .map(|outer| Arc::clone(&*outer))
        .map_err(|_| DiError::TypeMismatch { id: id.clone(), expected: std::any::type_name::<T>() })
}

/// Dependency injection container.
///
/// Resolves services according to their lifetimes:
///
/// - **Singleton**: built once, cached in the container
/// - **Scoped**: built once per [`Scope`]; without a scope, built per call
/// - **Transient**: built on every call
///
/// Cloning a `Container` is cheap and yields a handle to the same registry
/// and caches.
///
/// # Examples
///
/// ```
/// use warden_di::{Container, ServiceDescriptor};
/// use std::sync::Arc;
///
/// #[derive(Debug)]
/// struct Db;
///
/// let container = Container::new();
/// container.register(ServiceDescriptor::singleton("DB", |_| Ok(Arc::new(Db))));
///
/// let first: Arc<Db> = container.get_by_token("DB").unwrap();
/// let second: Arc<Db> = container.get_by_token("DB").unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
///
/// let custom = Arc::new(Db);
/// container.register_instance_by_token("DB", custom.clone());
/// let third: Arc<Db> = container.get_by_token("DB").unwrap();
/// assert!(Arc::ptr_eq(&third, &custom));
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    registry: RwLock<ServiceRegistry>,
    singletons: Mutex<HashMap<ServiceId, CachedInstance>>,
    observers: RwLock<Observers>,
    next_scope_id: AtomicU64,
}

impl Container {
    pub fn new() -> Self {
        Self::from_registry(ServiceRegistry::new())
    }

    /// Builds a container over descriptors collected elsewhere.
    pub fn from_registry(registry: ServiceRegistry) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                registry: RwLock::new(registry),
                singletons: Mutex::new(HashMap::new()),
                observers: RwLock::new(Observers::default()),
                next_scope_id: AtomicU64::new(1),
            }),
        }
    }

    /// Adds or replaces a descriptor.
    ///
    /// Replacing a descriptor drops the cached singleton built from the old
    /// one; scopes notice the new revision on their next lookup.
    pub fn register(&self, descriptor: ServiceDescriptor) -> &Self {
        let id = descriptor.id.clone();
        let lifetime = descriptor.lifetime;
        self.inner.registry.write().register(descriptor);
        self.inner.singletons.lock().remove(&id);
        tracing::trace!(service = %id, %lifetime, "service registered");
        self
    }

    pub fn unregister(&self, id: impl Into<ServiceId>) -> Option<ServiceDescriptor> {
        let id = id.into();
        let removed = self.inner.registry.write().unregister(&id);
        self.inner.singletons.lock().remove(&id);
        removed
    }

    pub fn has(&self, id: impl Into<ServiceId>) -> bool {
        self.inner.registry.read().has(&id.into())
    }

    pub fn descriptor(&self, id: impl Into<ServiceId>) -> Option<ServiceDescriptor> {
        self.inner.registry.read().get(&id.into()).cloned()
    }

    pub fn descriptors(&self) -> Vec<ServiceDescriptor> {
        self.inner.registry.read().iter().cloned().collect()
    }

    /// Runs `f` against the registry under a read lock.
    ///
    /// `f` must not resolve services through this container.
    pub fn with_registry<R>(&self, f: impl FnOnce(&ServiceRegistry) -> R) -> R {
        f(&self.inner.registry.read())
    }

    pub fn validate_dependencies(
        &self,
        id: impl Into<ServiceId>,
    ) -> Vec<DependencyValidationError> {
        self.inner.registry.read().validate_dependencies(&id.into())
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        self.inner.registry.read().dependency_graph()
    }

    pub fn validate(&self) -> ValidationReport {
        self.inner.registry.read().validate_all()
    }

    pub fn add_singleton<T>(&self, id: impl Into<ServiceId>, value: T) -> &Self
    where
        T: Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::instance(id, Arc::new(value)))
    }

    pub fn add_singleton_factory<T, F>(&self, id: impl Into<ServiceId>, factory: F) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolverContext<'_>) -> DiResult<T> + Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::singleton(id, move |ctx| factory(ctx).map(Arc::new)))
    }

    pub fn add_scoped_factory<T, F>(&self, id: impl Into<ServiceId>, factory: F) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolverContext<'_>) -> DiResult<T> + Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::scoped(id, move |ctx| factory(ctx).map(Arc::new)))
    }

    pub fn add_transient_factory<T, F>(&self, id: impl Into<ServiceId>, factory: F) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolverContext<'_>) -> DiResult<T> + Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::transient(id, move |ctx| factory(ctx).map(Arc::new)))
    }

    /// Registers a pre-built instance as a singleton, bypassing construction.
    ///
    /// The next resolution of `key` returns exactly `instance`.
    pub fn register_instance_by_token<T>(&self, key: impl ServiceKey<T>, instance: Arc<T>) -> &Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = key.service_id();
        let value = Arc::new(instance.clone()) as Instance;
        let revision = self
            .inner
            .registry
            .write()
            .register(ServiceDescriptor::instance(id.clone(), instance));
        self.inner.singletons.lock().insert(id.clone(), CachedInstance { revision, value });
        tracing::debug!(service = %id, "instance registered");
        self
    }

    /// Resolves `id` without a type, optionally inside `scope`.
    pub fn resolve(&self, id: &ServiceId, scope: Option<&Scope>) -> DiResult<Instance> {
        self.resolve_in(id, scope, &ResolutionPath::root())
    }

    pub fn get<T>(&self, key: impl ServiceKey<T>) -> DiResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_by_token(key)
    }

    pub fn get_by_token<T>(&self, key: impl ServiceKey<T>) -> DiResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = key.service_id();
        let instance = self.resolve(&id, None)?;
        downcast(&id, instance)
    }

    /// Like [`Container::get_by_token`], but an unregistered `key` yields
    /// `Ok(None)`. Failures while building a registered service still
    /// propagate.
    pub fn try_get_by_token<T>(&self, key: impl ServiceKey<T>) -> DiResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = key.service_id();
        if !self.inner.registry.read().has(&id) {
            return Ok(None);
        }
        let instance = self.resolve(&id, None)?;
        downcast(&id, instance).map(Some)
    }

    /// Opens a new scope. Scoped services resolved through it are cached
    /// until [`Scope::dispose`] is called or the scope is dropped.
    pub fn create_scope(&self) -> Scope {
        let id = self.inner.next_scope_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(scope = id, "scope created");
        Scope::new(id, self.clone())
    }

    pub fn add_observer(&self, observer: Arc<dyn ContainerObserver>) -> &Self {
        self.inner.observers.write().add(observer);
        self
    }

    /// Number of singletons currently cached.
    pub fn cached_singletons(&self) -> usize {
        self.inner.singletons.lock().len()
    }

    /// Releases every cached singleton. Returns how many were released.
    ///
    /// Registrations survive; singletons are rebuilt on their next
    /// resolution. Instances registered through
    /// [`Container::register_instance_by_token`] keep resolving to the same
    /// object since their factory hands it back.
    pub fn dispose(&self) -> usize {
        let released = std::mem::take(&mut *self.inner.singletons.lock());
        tracing::debug!(released = released.len(), "container disposed");
        released.len()
    }

    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        let registry = self.inner.registry.read();
        let singletons = self.inner.singletons.lock();
        let mut s = String::new();
        s.push_str("=== Container Debug ===\n");
        for d in registry.iter() {
            let cached = singletons.contains_key(&d.id);
            s.push_str(&format!(
                "  {} [{}] rev={} cached={} deps={:?}\n",
                d.id, d.lifetime, d.revision, cached, d.dependencies
            ));
        }
        s
    }

    pub(crate) fn resolve_in(
        &self,
        id: &ServiceId,
        scope: Option<&Scope>,
        path: &ResolutionPath,
    ) -> DiResult<Instance> {
        let observers = {
            let observers = self.inner.observers.read();
            observers.has_observers().then(|| observers.clone())
        };

        let Some(observers) = observers else {
            return self.resolve_uninstrumented(id, scope, path).map(|(value, _)| value);
        };

        observers.resolving(id);
        let start = Instant::now();
        match self.resolve_uninstrumented(id, scope, path) {
            Ok((value, lifetime)) => {
                observers.resolved(id, lifetime, start.elapsed());
                Ok(value)
            }
            Err(error) => {
                observers.failed(id, &error);
                Err(error)
            }
        }
    }

    fn resolve_uninstrumented(
        &self,
        id: &ServiceId,
        scope: Option<&Scope>,
        path: &ResolutionPath,
    ) -> DiResult<(Instance, Lifetime)> {
        if let Some(scope) = scope {
            scope.ensure_active()?;
        }

        let descriptor = self
            .inner
            .registry
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DiError::NotFound(id.clone()))?;
        let path = path.enter(id)?;

        let value = match descriptor.lifetime {
            Lifetime::Singleton => self.resolve_singleton(&descriptor, &path)?,
            Lifetime::Scoped => match scope {
                Some(scope) => scope.resolve_scoped(self, &descriptor, &path)?,
                None => self.construct(&descriptor, None, &path)?,
            },
            Lifetime::Transient => self.construct(&descriptor, scope, &path)?,
        };
        Ok((value, descriptor.lifetime))
    }

    /// Singletons are built outside any scope so they never capture scoped
    /// instances.
    fn resolve_singleton(
        &self,
        descriptor: &ServiceDescriptor,
        path: &ResolutionPath,
    ) -> DiResult<Instance> {
        if let Some(cached) = self
            .inner
            .singletons
            .lock()
            .get(&descriptor.id)
            .and_then(|c| c.current_for(descriptor))
        {
            return Ok(cached);
        }

        // Never hold the lock while the factory runs: it may resolve more
        // singletons. A failed factory leaves the cache untouched.
        let value = self.construct(descriptor, None, path)?;
        let mut cache = self.inner.singletons.lock();
        Ok(store_or_reuse(&mut cache, descriptor, value))
    }

    pub(crate) fn construct(
        &self,
        descriptor: &ServiceDescriptor,
        scope: Option<&Scope>,
        path: &ResolutionPath,
    ) -> DiResult<Instance> {
        let ctx = ResolverContext::new(self, scope, path);
        descriptor.construct(&ctx)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.inner.registry.read().len())
            .field("cached_singletons", &self.cached_singletons())
            .finish()
    }
}
