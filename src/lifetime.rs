//! Service lifetime definitions.

use std::fmt;

/// Service lifetimes controlling instance caching behavior
///
/// # Examples
///
/// ```rust
/// use warden_di::{Container, Lifetime};
/// use std::sync::Arc;
///
/// struct Connection;
///
/// let container = Container::new();
/// container.add_scoped_factory("conn", |_| Ok(Connection));
///
/// let scope_a = container.create_scope();
/// let scope_b = container.create_scope();
///
/// let a1 = scope_a.get::<Connection>("conn").unwrap();
/// let a2 = scope_a.get::<Connection>("conn").unwrap();
/// let b = scope_b.get::<Connection>("conn").unwrap();
///
/// assert!(Arc::ptr_eq(&a1, &a2));
/// assert!(!Arc::ptr_eq(&a1, &b));
/// assert_eq!(container.descriptor("conn").unwrap().lifetime, Lifetime::Scoped);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// New instance per resolution, never cached
    Transient,
    /// Single instance per container, cached until the container is disposed
    ///
    /// Singleton services are created once when first requested. A failed
    /// construction leaves the cache empty, so the next request retries.
    Singleton,
    /// Single instance per [`Scope`](crate::Scope), cached for the scope lifetime
    ///
    /// Resolving a scoped service without a scope behaves like
    /// [`Lifetime::Transient`].
    Scoped,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifetime::Transient => "transient",
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
        };
        f.write_str(s)
    }
}
