//! Service identifier types for the dependency injection container.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

/// Identifier naming one service within a registry.
///
/// Three kinds of identifier are supported and they never alias each other,
/// even when their labels are textually equal:
///
/// - [`ServiceId::Name`]: a free-form string chosen at runtime
/// - [`ServiceId::Token`]: a symbolic token, usually declared once as a
///   `const` [`Token<T>`]
/// - [`ServiceId::Type`]: a reference to a concrete Rust type
///
/// # Examples
///
/// ```rust
/// use warden_di::ServiceId;
///
/// struct Database;
///
/// let by_name = ServiceId::named("DB");
/// let by_token = ServiceId::token("DB");
/// let by_type = ServiceId::of::<Database>();
///
/// assert_eq!(by_name, ServiceId::named(String::from("DB")));
/// assert_ne!(by_name, by_token);
/// assert_ne!(by_token, by_type);
/// assert!(by_type.display_name().ends_with("Database"));
/// ```
#[derive(Debug, Clone)]
pub enum ServiceId {
    Name(Cow<'static, str>),
    Token(&'static str),
    Type(TypeId, &'static str),
}

impl ServiceId {
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        ServiceId::Name(name.into())
    }

    pub const fn token(label: &'static str) -> Self {
        ServiceId::Token(label)
    }

    pub fn of<T: ?Sized + 'static>() -> Self {
        ServiceId::Type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Human readable label used in errors, logs and dependency graphs.
    pub fn display_name(&self) -> &str {
        match self {
            ServiceId::Name(name) => name,
            ServiceId::Token(label) => label,
            ServiceId::Type(_, name) => name,
        }
    }
}

// Type ids compare by TypeId only; the name is diagnostic.
impl PartialEq for ServiceId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ServiceId::Type(a, _), ServiceId::Type(b, _)) => a == b,
            (ServiceId::Name(a), ServiceId::Name(b)) => a == b,
            (ServiceId::Token(a), ServiceId::Token(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ServiceId {}

impl std::hash::Hash for ServiceId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            ServiceId::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            ServiceId::Name(name) => {
                1u8.hash(state);
                name.hash(state);
            }
            ServiceId::Token(label) => {
                2u8.hash(state);
                label.hash(state);
            }
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceId::Token(label) => write!(f, "@{}", label),
            other => f.write_str(other.display_name()),
        }
    }
}

impl From<&'static str> for ServiceId {
    fn from(name: &'static str) -> Self {
        ServiceId::Name(Cow::Borrowed(name))
    }
}

impl From<String> for ServiceId {
    fn from(name: String) -> Self {
        ServiceId::Name(Cow::Owned(name))
    }
}

impl From<&ServiceId> for ServiceId {
    fn from(id: &ServiceId) -> Self {
        id.clone()
    }
}

/// Typed symbolic token.
///
/// A token pins the type a service resolves to, so lookups through it need no
/// turbofish and cannot be mistyped. Tokens are usually declared as constants
/// next to the trait they name.
///
/// ```rust
/// use warden_di::{Container, Token};
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync {
///     fn now(&self) -> u64;
/// }
///
/// struct FixedClock;
/// impl Clock for FixedClock {
///     fn now(&self) -> u64 { 42 }
/// }
///
/// const CLOCK: Token<dyn Clock> = Token::new("Clock");
///
/// let container = Container::new();
/// container.register_instance_by_token(CLOCK, Arc::new(FixedClock) as Arc<dyn Clock>);
/// assert_eq!(container.get_by_token(CLOCK).unwrap().now(), 42);
/// ```
pub struct Token<T: ?Sized> {
    label: &'static str,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> Token<T> {
    pub const fn new(label: &'static str) -> Self {
        Self { label, _marker: PhantomData }
    }

    pub const fn label(&self) -> &'static str {
        self.label
    }

    pub const fn id(&self) -> ServiceId {
        ServiceId::Token(self.label)
    }
}

impl<T: ?Sized> Clone for Token<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Token<T> {}

impl<T: ?Sized> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&self.label).finish()
    }
}

impl<T: ?Sized> From<Token<T>> for ServiceId {
    fn from(token: Token<T>) -> Self {
        token.id()
    }
}

/// Anything that names a service and fixes the type it resolves to.
///
/// Tokens carry the type themselves; plain identifiers leave it to the
/// caller's annotation:
///
/// ```rust
/// use warden_di::Container;
/// use std::sync::Arc;
///
/// struct Db;
///
/// let container = Container::new();
/// container.add_singleton("DB", Db);
/// let db: Arc<Db> = container.get_by_token("DB").unwrap();
/// # let _ = db;
/// ```
pub trait ServiceKey<T: ?Sized> {
    fn service_id(&self) -> ServiceId;
}

impl<T: ?Sized> ServiceKey<T> for Token<T> {
    fn service_id(&self) -> ServiceId {
        self.id()
    }
}

impl<T: ?Sized> ServiceKey<T> for ServiceId {
    fn service_id(&self) -> ServiceId {
        self.clone()
    }
}

impl<T: ?Sized> ServiceKey<T> for &ServiceId {
    fn service_id(&self) -> ServiceId {
        (*self).clone()
    }
}

impl<T: ?Sized> ServiceKey<T> for &'static str {
    fn service_id(&self) -> ServiceId {
        ServiceId::Name(Cow::Borrowed(*self))
    }
}

impl<T: ?Sized> ServiceKey<T> for String {
    fn service_id(&self) -> ServiceId {
        ServiceId::Name(Cow::Owned(self.clone()))
    }
}
