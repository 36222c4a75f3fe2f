//! Plugin-aware authentication facade.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{
    AuthError, AuthFailure, AuthOperation, AuthService, AuthSession, Credentials, AUTH_SERVICE,
    PLUGIN_MANAGER,
};
use crate::cancellation::CancellationToken;
use crate::container::{Container, ResolverContext};
use crate::error::DiResult;
use crate::plugin::{CleanupReport, Hook, HookPayload, HookResults, InitReport, PluginManager};

/// Plugin-aware authentication facade.
///
/// Every call is forwarded to the low-level [`AuthService`] and its outcome
/// dispatched as exactly one hook. Plugin failures never change what the
/// caller gets back; they are logged and kept in
/// [`last_hook_results`](Self::last_hook_results).
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use chrono::Utc;
/// use warden_di::{
///     AuthError, AuthService, AuthSession, Container, Credentials, FeatureAuthService, User,
///     AUTH_SERVICE,
/// };
///
/// struct AlwaysDenied;
///
/// #[async_trait]
/// impl AuthService for AlwaysDenied {
///     async fn login(&self, _c: &Credentials) -> Result<AuthSession, AuthError> {
///         Err(AuthError::InvalidCredentials)
///     }
///     async fn register(&self, c: &Credentials) -> Result<AuthSession, AuthError> {
///         Err(AuthError::AlreadyRegistered { identifier: c.identifier.clone() })
///     }
///     async fn logout(&self, _session_id: &str) -> Result<(), AuthError> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let container = Container::new();
/// let backend: Arc<dyn AuthService> = Arc::new(AlwaysDenied);
/// container.register_instance_by_token(AUTH_SERVICE, backend);
///
/// let auth = FeatureAuthService::from_container(&container).unwrap();
/// let err = auth.login(&Credentials::new("ada", "wrong")).await.unwrap_err();
/// assert_eq!(err, AuthError::InvalidCredentials);
/// # }
/// ```
pub struct FeatureAuthService {
    auth: Arc<dyn AuthService>,
    plugins: Arc<PluginManager>,
    last_results: Mutex<Option<HookResults>>,
}

impl FeatureAuthService {
    pub fn new(auth: Arc<dyn AuthService>, plugins: Arc<PluginManager>) -> Self {
        Self { auth, plugins, last_results: Mutex::new(None) }
    }

    /// Resolves [`AUTH_SERVICE`] and, if registered, [`PLUGIN_MANAGER`];
    /// otherwise starts with an empty plugin host.
    pub fn from_container(container: &Container) -> DiResult<Self> {
        let auth = container.get_by_token(AUTH_SERVICE)?;
        let plugins = container
            .try_get_by_token(PLUGIN_MANAGER)?
            .unwrap_or_else(|| Arc::new(PluginManager::new()));
        Ok(Self::new(auth, plugins))
    }

    /// Same as [`from_container`](Self::from_container), from inside a
    /// factory.
    pub fn from_context(ctx: &ResolverContext<'_>) -> DiResult<Self> {
        let auth = ctx.get(AUTH_SERVICE)?;
        let plugins = ctx
            .try_get(PLUGIN_MANAGER)?
            .unwrap_or_else(|| Arc::new(PluginManager::new()));
        Ok(Self::new(auth, plugins))
    }

    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.auth
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    /// Initializes attached plugins against the wrapped service.
    pub async fn initialize_plugins(&self) -> InitReport {
        self.plugins.initialize(Arc::clone(&self.auth)).await
    }

    pub async fn initialize_plugins_with_cancel(&self, cancel: &CancellationToken) -> InitReport {
        self.plugins.initialize_with_cancel(Arc::clone(&self.auth), cancel).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        let outcome = self.auth.login(credentials).await;
        self.report(AuthOperation::Login, Some(&credentials.identifier), &outcome).await;
        outcome
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        let outcome = self.auth.register(credentials).await;
        self.report(AuthOperation::Register, Some(&credentials.identifier), &outcome).await;
        outcome
    }

    /// Ends the session; `auth:logout` is dispatched on success,
    /// `auth:failure` otherwise.
    pub async fn logout(&self, session_id: &str) -> Result<(), AuthError> {
        let outcome = self.auth.logout(session_id).await;
        match &outcome {
            Ok(()) => {
                let payload = HookPayload::Logout { session_id: session_id.to_string() };
                self.dispatch(Hook::AuthLogout, payload).await;
            }
            Err(error) => {
                self.dispatch_failure(AuthOperation::Logout, None, error.clone()).await;
            }
        }
        outcome
    }

    /// Dispatches an application-defined hook through the same plugin host.
    pub async fn emit(&self, hook: impl Into<Hook>, payload: HookPayload) -> HookResults {
        self.dispatch(hook.into(), payload).await
    }

    /// Per-plugin results of the most recent dispatch.
    pub fn last_hook_results(&self) -> Option<HookResults> {
        self.last_results.lock().clone()
    }

    /// Cleans up and detaches every plugin.
    pub async fn shutdown(&self) -> CleanupReport {
        self.plugins.cleanup().await
    }

    async fn report(
        &self,
        operation: AuthOperation,
        identifier: Option<&str>,
        outcome: &Result<AuthSession, AuthError>,
    ) {
        match outcome {
            Ok(session) => {
                debug!(%operation, session = %session.session_id, "authentication succeeded");
                self.dispatch(Hook::AuthSuccess, HookPayload::Session(session.clone())).await;
            }
            Err(error) => {
                self.dispatch_failure(operation, identifier, error.clone()).await;
            }
        }
    }

    async fn dispatch_failure(
        &self,
        operation: AuthOperation,
        identifier: Option<&str>,
        error: AuthError,
    ) {
        debug!(%operation, %error, "authentication failed");
        let payload = HookPayload::Failure(AuthFailure {
            operation,
            identifier: identifier.map(str::to_string),
            error,
        });
        self.dispatch(Hook::AuthFailure, payload).await;
    }

    async fn dispatch(&self, hook: Hook, payload: HookPayload) -> HookResults {
        let results = self.plugins.execute(&hook, &payload).await;
        let failed = results.failures().len();
        if failed > 0 {
            warn!(%hook, failed, invoked = results.len(), "plugins failed while handling hook");
        }
        *self.last_results.lock() = Some(results.clone());
        results
    }
}

impl fmt::Debug for FeatureAuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureAuthService")
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}
