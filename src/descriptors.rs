//! Service descriptors: how to build and scope one service.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::container::ResolverContext;
use crate::error::DiResult;
use crate::key::ServiceId;
use crate::lifetime::Lifetime;

/// Type-erased instance as stored in the container caches.
///
/// Every instance is stored as an `Arc<T>` inside the `Any`, which lets
/// trait objects and concrete types share one representation.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type Factory =
    Arc<dyn for<'a> Fn(&ResolverContext<'a>) -> DiResult<Instance> + Send + Sync>;

/// Metadata describing how to build and scope one service
///
/// `dependencies` is declared, not inferred: the container never injects
/// them. They feed
/// [`ServiceRegistry::validate_dependencies`](crate::ServiceRegistry::validate_dependencies)
/// and the dependency graph.
///
/// # Examples
///
/// ```rust
/// use warden_di::{Container, Lifetime, ServiceDescriptor, ServiceId};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserRepository { db: Arc<Database> }
///
/// let container = Container::new();
/// container.register(ServiceDescriptor::singleton("db", |_| {
///     Ok(Arc::new(Database { url: "postgres://localhost".to_string() }))
/// }));
/// container.register(
///     ServiceDescriptor::transient("users", |ctx| {
///         Ok(Arc::new(UserRepository { db: ctx.get("db")? }))
///     })
///     .depends_on("db"),
/// );
///
/// let users = container.get::<UserRepository>("users").unwrap();
/// assert_eq!(users.db.url, "postgres://localhost");
///
/// let descriptor = container.descriptor("users").unwrap();
/// assert_eq!(descriptor.lifetime, Lifetime::Transient);
/// assert_eq!(descriptor.dependencies, vec![ServiceId::named("db")]);
/// ```
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub id: ServiceId,
    pub lifetime: Lifetime,
    pub dependencies: Vec<ServiceId>,
    pub(crate) factory: Factory,
    pub(crate) type_name: &'static str,
    pub(crate) revision: u64,
}

impl ServiceDescriptor {
    /// Creates a descriptor from a factory producing `Arc<T>`.
    ///
    /// `T` may be unsized, so trait objects register the same way concrete
    /// types do.
    pub fn new<T, F>(id: impl Into<ServiceId>, lifetime: Lifetime, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolverContext<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |ctx: &ResolverContext<'_>| {
            factory(ctx).map(|value| Arc::new(value) as Instance)
        });
        Self {
            id: id.into(),
            lifetime,
            dependencies: Vec::new(),
            factory,
            type_name: std::any::type_name::<T>(),
            revision: 0,
        }
    }

    pub fn singleton<T, F>(id: impl Into<ServiceId>, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolverContext<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        Self::new(id, Lifetime::Singleton, factory)
    }

    pub fn scoped<T, F>(id: impl Into<ServiceId>, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolverContext<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        Self::new(id, Lifetime::Scoped, factory)
    }

    pub fn transient<T, F>(id: impl Into<ServiceId>, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolverContext<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        Self::new(id, Lifetime::Transient, factory)
    }

    /// Singleton descriptor wrapping an already-built instance.
    pub fn instance<T>(id: impl Into<ServiceId>, instance: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self::singleton(id, move |_| Ok(instance.clone()))
    }

    pub fn depends_on(mut self, dependency: impl Into<ServiceId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_dependencies<I, D>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<ServiceId>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Name of the type the factory produces.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Registration stamp; changes every time the identifier is re-registered.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn construct(&self, ctx: &ResolverContext<'_>) -> DiResult<Instance> {
        (self.factory)(ctx)
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("lifetime", &self.lifetime)
            .field("dependencies", &self.dependencies)
            .field("type_name", &self.type_name)
            .field("revision", &self.revision)
            .finish()
    }
}
