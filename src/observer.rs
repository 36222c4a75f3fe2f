//! Diagnostic observers for service resolution.
//!
//! Observers receive a callback before and after every resolution, which is
//! enough to build structured traces or simple counters without touching the
//! container internals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::DiError;
use crate::key::ServiceId;
use crate::lifetime::Lifetime;

/// Hook into the container's resolution pipeline.
///
/// # Examples
///
/// ```rust
/// use warden_di::{Container, CountingObserver};
/// use std::sync::Arc;
///
/// let counter = Arc::new(CountingObserver::new());
/// let container = Container::new();
/// container.add_observer(counter.clone());
/// container.add_singleton("answer", 42u32);
///
/// container.get::<u32>("answer").unwrap();
/// let _ = container.get::<u32>("missing");
///
/// assert_eq!(counter.resolved_count(), 1);
/// assert_eq!(counter.failed_count(), 1);
/// ```
pub trait ContainerObserver: Send + Sync {
    /// Called before the descriptor for `id` is looked up.
    fn resolving(&self, id: &ServiceId) {
        let _ = id;
    }

    /// Called after an instance was produced or served from cache.
    fn resolved(&self, id: &ServiceId, lifetime: Lifetime, duration: Duration);

    /// Called when resolution of `id` failed.
    fn failed(&self, id: &ServiceId, error: &DiError) {
        let _ = (id, error);
    }
}

#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn ContainerObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn ContainerObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub(crate) fn resolving(&self, id: &ServiceId) {
        for observer in &self.observers {
            observer.resolving(id);
        }
    }

    pub(crate) fn resolved(&self, id: &ServiceId, lifetime: Lifetime, duration: Duration) {
        for observer in &self.observers {
            observer.resolved(id, lifetime, duration);
        }
    }

    pub(crate) fn failed(&self, id: &ServiceId, error: &DiError) {
        for observer in &self.observers {
            observer.failed(id, error);
        }
    }
}

/// Emits `tracing` events for every resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl ContainerObserver for TracingObserver {
    fn resolving(&self, id: &ServiceId) {
        tracing::trace!(service = %id, "resolving");
    }

    fn resolved(&self, id: &ServiceId, lifetime: Lifetime, duration: Duration) {
        tracing::debug!(service = %id, %lifetime, ?duration, "resolved");
    }

    fn failed(&self, id: &ServiceId, error: &DiError) {
        tracing::debug!(service = %id, %error, "resolution failed");
    }
}

/// Counts resolutions and failures.
#[derive(Debug, Default)]
pub struct CountingObserver {
    resolved: AtomicU64,
    failed: AtomicU64,
}

impl CountingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolved_count(&self) -> u64 {
        self.resolved.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl ContainerObserver for CountingObserver {
    fn resolved(&self, _id: &ServiceId, _lifetime: Lifetime, _duration: Duration) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
    }

    fn failed(&self, _id: &ServiceId, _error: &DiError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}
