//! Scoped service resolution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::container::{downcast, store_or_reuse, CachedInstance, Container};
use crate::descriptors::{Instance, ServiceDescriptor};
use crate::error::{DiError, DiResult};
use crate::internal::ResolutionPath;
use crate::key::{ServiceId, ServiceKey};

/// Explicit boundary for scoped services, such as one login session.
///
/// A scope begins at [`Container::create_scope`] and ends at
/// [`Scope::dispose`] or when it is dropped. Within it, each scoped service
/// is built at most once; distinct scopes never share an instance.
/// Singletons still come from the container and transients are always new.
///
/// # Examples
///
/// ```
/// use warden_di::{Container, DiError};
/// use std::sync::Arc;
///
/// struct Session(u64);
///
/// let container = Container::new();
/// container.add_scoped_factory("session", |ctx| {
///     Ok(Session(ctx.scope().map(|s| s.id()).unwrap_or(0)))
/// });
///
/// let scope = container.create_scope();
/// let a = scope.get::<Session>("session").unwrap();
/// let b = scope.get::<Session>("session").unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// assert_eq!(a.0, scope.id());
///
/// scope.dispose();
/// assert!(matches!(scope.get::<Session>("session"), Err(DiError::ScopeDisposed(_))));
/// ```
pub struct Scope {
    id: u64,
    container: Container,
    cache: Mutex<HashMap<ServiceId, CachedInstance>>,
    disposed: AtomicBool,
}

impl Scope {
    pub(crate) fn new(id: u64, container: Container) -> Self {
        Self {
            id,
            container,
            cache: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn resolve(&self, id: &ServiceId) -> DiResult<Instance> {
        self.container.resolve(id, Some(self))
    }

    pub fn get<T>(&self, key: impl ServiceKey<T>) -> DiResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = key.service_id();
        let instance = self.resolve(&id)?;
        downcast(&id, instance)
    }

    /// Number of scoped instances currently held.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Ends the scope and releases its instances. Returns how many were
    /// released. Further resolution through the scope fails with
    /// [`DiError::ScopeDisposed`].
    pub fn dispose(&self) -> usize {
        self.disposed.store(true, Ordering::Release);
        let released = std::mem::take(&mut *self.cache.lock());
        tracing::trace!(scope = self.id, released = released.len(), "scope disposed");
        released.len()
    }

    pub(crate) fn ensure_active(&self) -> DiResult<()> {
        if self.is_disposed() {
            return Err(DiError::ScopeDisposed(self.id));
        }
        Ok(())
    }

    pub(crate) fn resolve_scoped(
        &self,
        container: &Container,
        descriptor: &ServiceDescriptor,
        path: &ResolutionPath,
    ) -> DiResult<Instance> {
        if let Some(cached) = self
            .cache
            .lock()
            .get(&descriptor.id)
            .and_then(|c| c.current_for(descriptor))
        {
            return Ok(cached);
        }

        let value = container.construct(descriptor, Some(self), path)?;

        let mut cache = self.cache.lock();
        if self.is_disposed() {
            return Err(DiError::ScopeDisposed(self.id));
        }
        Ok(store_or_reuse(&mut cache, descriptor, value))
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("cached", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
