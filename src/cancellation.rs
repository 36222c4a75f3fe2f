//! Cancellation tokens for plugin lifecycle calls.
//!
//! A token is handed to [`PluginManager`](crate::PluginManager) calls that
//! may run for a long time. Cancelling it stops waiting on the plugin; the
//! plugin sees the call as abandoned and the manager records
//! [`PluginError::Cancelled`](crate::PluginError::Cancelled).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A token that can be used to signal cancellation across async operations.
///
/// Tokens form a tree: cancelling a token cancels every child created from
/// it, never the parent.
///
/// # Examples
///
/// ```rust
/// use warden_di::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let token = CancellationToken::new();
/// let child = token.child_token();
///
/// let waiter = tokio::spawn({
///     let child = child.clone();
///     async move { child.cancelled().await }
/// });
///
/// token.cancel();
/// waiter.await.unwrap();
/// assert!(child.is_cancelled());
/// # }
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationTokenInner>,
}

struct CancellationTokenInner {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
    notify: Notify,
    created_at: Instant,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Creates a child token that is cancelled when either it or any of its
    /// ancestors is cancelled.
    pub fn child_token(&self) -> Self {
        Self::build(Some(self.clone()), None)
    }

    /// Creates a token that counts as cancelled once `timeout` has elapsed.
    ///
    /// No background task is spawned; the deadline is checked by
    /// [`is_cancelled`](Self::is_cancelled) and raced by
    /// [`cancelled`](Self::cancelled).
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(None, Some(Instant::now() + timeout))
    }

    /// Child token with its own deadline on top of the parent's.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        Self::build(Some(self.clone()), Some(Instant::now() + timeout))
    }

    fn build(parent: Option<CancellationToken>, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner {
                cancelled: AtomicBool::new(false),
                parent,
                notify: Notify::new(),
                created_at: Instant::now(),
                deadline,
            }),
        }
    }

    /// Cancels the token and wakes every task waiting on it or on a child.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if cancellation has been requested here or on an
    /// ancestor, or a deadline in the chain has passed.
    pub fn is_cancelled(&self) -> bool {
        let now = Instant::now();
        self.chain().any(|token| {
            token.inner.cancelled.load(Ordering::Acquire)
                || token.inner.deadline.is_some_and(|deadline| deadline <= now)
        })
    }

    /// # Errors
    ///
    /// Returns [`CancellationError`] if the token is cancelled.
    pub fn error_if_cancelled(&self) -> Result<(), CancellationError> {
        if self.is_cancelled() {
            Err(CancellationError::new("Operation was cancelled"))
        } else {
            Ok(())
        }
    }

    /// Completes when cancellation is requested.
    ///
    /// Waits on a [`Notify`] per token in the ancestor chain rather than
    /// polling, and races the earliest deadline in the chain.
    pub async fn cancelled(&self) {
        loop {
            let chain: Vec<CancellationToken> = self.chain().collect();
            let mut waits: Vec<_> = chain
                .iter()
                .map(|token| Box::pin(token.inner.notify.notified()))
                .collect();
            // Register before checking the flag so a concurrent cancel is not missed.
            for wait in waits.iter_mut() {
                wait.as_mut().enable();
            }
            if self.is_cancelled() {
                return;
            }

            match self.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = select_all(waits) => {}
                        _ = tokio::time::sleep_until(deadline) => return,
                    }
                }
                None => {
                    select_all(waits).await;
                }
            }
        }
    }

    /// Runs `fut` to completion unless the token is cancelled first.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Result<F::Output, CancellationError>
    where
        F: std::future::Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(CancellationError::new("Operation was cancelled")),
            output = fut => Ok(output),
        }
    }

    /// Returns the elapsed time since this token was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.created_at.elapsed()
    }

    /// Earliest deadline across this token and its ancestors.
    pub fn deadline(&self) -> Option<Instant> {
        self.chain().filter_map(|token| token.inner.deadline).min()
    }

    fn chain(&self) -> impl Iterator<Item = CancellationToken> {
        std::iter::successors(Some(self.clone()), |token| token.inner.parent.clone())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Error type for cancellation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cancellation error: {message}")]
pub struct CancellationError {
    message: String,
}

impl CancellationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_basic() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_child_token_cancellation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let grandchild = child.child_token();

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_token_independent_cancellation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_error_if_cancelled() {
        let token = CancellationToken::new();
        assert!(token.error_if_cancelled().is_ok());

        token.cancel();
        assert!(token.error_if_cancelled().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancellation() {
        let token = CancellationToken::with_timeout(Duration::from_millis(10));
        assert!(!token.is_cancelled());

        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_future_resolves_at_deadline() {
        let token = CancellationToken::with_timeout(Duration::from_secs(5));
        let child = token.child_token();
        child.cancelled().await;
        assert!(token.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancelled_future_wakes_child() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        let waiter = tokio::spawn({
            let child = child.clone();
            async move { child.cancelled().await }
        });
        tokio::task::yield_now().await;

        parent.cancel();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let token = CancellationToken::new();
        assert_eq!(token.run_until_cancelled(async { 7 }).await, Ok(7));

        token.cancel();
        let pending = futures::future::pending::<()>();
        assert!(token.run_until_cancelled(pending).await.is_err());
    }
}
