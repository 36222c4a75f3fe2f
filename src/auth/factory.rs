//! Construction helpers for the authentication module.

use std::sync::Arc;

use tracing::{info, warn};

use super::{FeatureAuthService, AUTH_SERVICE, FEATURE_AUTH_SERVICE, PLUGIN_MANAGER};
use crate::config::AuthModuleConfig;
use crate::container::Container;
use crate::descriptors::ServiceDescriptor;
use crate::error::DiResult;
use crate::plugin::{
    AnalyticsPlugin, AttachReport, AuthPlugin, InitReport, PluginManager, SecurityPlugin,
};

/// A freshly composed module and what happened to its plugins.
#[derive(Debug)]
pub struct AuthModule {
    pub service: Arc<FeatureAuthService>,
    pub attach: AttachReport,
    pub init: InitReport,
}

impl AuthModule {
    /// True when every plugin was attached and initialized.
    pub fn is_healthy(&self) -> bool {
        self.attach.is_ok() && self.init.is_ok()
    }
}

/// Builds [`FeatureAuthService`] instances against a [`Container`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// # use async_trait::async_trait;
/// # use warden_di::{AuthError, AuthSession, Credentials};
/// use warden_di::{AuthModuleFactory, AuthService, Container, AUTH_SERVICE};
/// # struct Backend;
/// # #[async_trait]
/// # impl AuthService for Backend {
/// #     async fn login(&self, _c: &Credentials) -> Result<AuthSession, AuthError> {
/// #         Err(AuthError::InvalidCredentials)
/// #     }
/// #     async fn register(&self, _c: &Credentials) -> Result<AuthSession, AuthError> {
/// #         Err(AuthError::InvalidCredentials)
/// #     }
/// #     async fn logout(&self, _s: &str) -> Result<(), AuthError> { Ok(()) }
/// # }
///
/// let container = Container::new();
/// container.register_instance_by_token(AUTH_SERVICE, Arc::new(Backend) as Arc<dyn AuthService>);
///
/// let first = AuthModuleFactory::create_singleton(&container).unwrap();
/// let second = AuthModuleFactory::create_from_di(&container).unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
pub struct AuthModuleFactory;

impl AuthModuleFactory {
    /// Composes a service with an explicit plugin list.
    ///
    /// Plugins are batch-attached in dependency order and initialized.
    /// Rejected or failing plugins are reported, not raised; only failing to
    /// resolve [`AUTH_SERVICE`] is an error.
    pub async fn create_with_plugins(
        container: &Container,
        plugins: Vec<Arc<dyn AuthPlugin>>,
    ) -> DiResult<AuthModule> {
        let manager = container
            .try_get_by_token(PLUGIN_MANAGER)?
            .unwrap_or_else(|| Arc::new(PluginManager::new()));
        Self::compose(container, manager, plugins).await
    }

    /// Composes a service with the built-in analytics and security plugins,
    /// configured from `config`, followed by `extra` plugins.
    pub async fn create_with_config(
        container: &Container,
        config: &AuthModuleConfig,
        extra: Vec<Arc<dyn AuthPlugin>>,
    ) -> DiResult<AuthModule> {
        let manager = Arc::new(PluginManager::with_config(config.plugins.clone()));
        let mut plugins: Vec<Arc<dyn AuthPlugin>> = vec![
            Arc::new(AnalyticsPlugin::new(config.analytics.clone())),
            Arc::new(SecurityPlugin::new(config.security.clone())),
        ];
        plugins.extend(extra);
        Self::compose(container, manager, plugins).await
    }

    async fn compose(
        container: &Container,
        manager: Arc<PluginManager>,
        plugins: Vec<Arc<dyn AuthPlugin>>,
    ) -> DiResult<AuthModule> {
        let auth = container.get_by_token(AUTH_SERVICE)?;
        let attach = manager.attach_all(plugins);
        let service = Arc::new(FeatureAuthService::new(auth, manager));
        let init = service.initialize_plugins().await;

        if attach.is_ok() && init.is_ok() {
            info!(plugins = attach.attached.len(), "auth module ready");
        } else {
            warn!(
                rejected = attach.rejected.len(),
                failed = init.failures().len(),
                "auth module ready with degraded plugins"
            );
        }
        Ok(AuthModule { service, attach, init })
    }

    /// Returns the registered [`FEATURE_AUTH_SERVICE`] if there is one,
    /// otherwise builds a fresh instance without registering it.
    pub fn create_from_di(container: &Container) -> DiResult<Arc<FeatureAuthService>> {
        if let Some(service) = container.try_get_by_token(FEATURE_AUTH_SERVICE)? {
            return Ok(service);
        }
        FeatureAuthService::from_container(container).map(Arc::new)
    }

    /// Like [`create_from_di`](Self::create_from_di), but a freshly built
    /// instance is registered so later lookups return the same one.
    pub fn create_singleton(container: &Container) -> DiResult<Arc<FeatureAuthService>> {
        if let Some(service) = container.try_get_by_token(FEATURE_AUTH_SERVICE)? {
            return Ok(service);
        }
        let service = Arc::new(FeatureAuthService::from_container(container)?);
        container.register_instance_by_token(FEATURE_AUTH_SERVICE, Arc::clone(&service));
        Ok(service)
    }

    /// Registers a lazily built singleton [`FEATURE_AUTH_SERVICE`] that
    /// declares its dependency on [`AUTH_SERVICE`].
    pub fn register(container: &Container) -> &Container {
        container.register(
            ServiceDescriptor::singleton(FEATURE_AUTH_SERVICE, |ctx| {
                FeatureAuthService::from_context(ctx).map(Arc::new)
            })
            .depends_on(AUTH_SERVICE),
        )
    }
}
