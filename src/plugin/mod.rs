//! Authentication plugins and the host that runs them.
//!
//! A plugin is any type implementing [`AuthPlugin`]. Plugins are attached to
//! a [`PluginManager`], initialized once against the low-level
//! [`AuthService`], and then receive the hooks they subscribe to through
//! [`PluginMetadata::hooks`].

pub mod analytics;
pub mod manager;
pub mod security;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{AuthFailure, AuthService, AuthSession};

pub use analytics::AnalyticsPlugin;
pub use manager::{AttachReport, CleanupReport, HookResults, InitReport, PluginManager};
pub use security::SecurityPlugin;

/// Named lifecycle event dispatched to plugins.
///
/// Known names parse to their variants; anything else becomes
/// [`Hook::Custom`] and is dispatched like any other hook.
///
/// ```rust
/// use warden_di::Hook;
///
/// assert_eq!(Hook::from("auth:failure"), Hook::AuthFailure);
/// assert_eq!(Hook::from("audit:export").as_str(), "audit:export");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Hook {
    /// `auth:success`, payload [`HookPayload::Session`]
    AuthSuccess,
    /// `auth:failure`, payload [`HookPayload::Failure`]
    AuthFailure,
    /// `auth:logout`, payload [`HookPayload::Logout`]
    AuthLogout,
    Custom(String),
}

impl Hook {
    pub fn as_str(&self) -> &str {
        match self {
            Hook::AuthSuccess => "auth:success",
            Hook::AuthFailure => "auth:failure",
            Hook::AuthLogout => "auth:logout",
            Hook::Custom(name) => name,
        }
    }
}

impl From<&str> for Hook {
    fn from(name: &str) -> Self {
        match name {
            "auth:success" => Hook::AuthSuccess,
            "auth:failure" => Hook::AuthFailure,
            "auth:logout" => Hook::AuthLogout,
            other => Hook::Custom(other.to_string()),
        }
    }
}

impl From<String> for Hook {
    fn from(name: String) -> Self {
        Hook::from(name.as_str())
    }
}

impl From<Hook> for String {
    fn from(hook: Hook) -> Self {
        hook.as_str().to_string()
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data handed to [`AuthPlugin::execute`] alongside the hook.
#[derive(Debug, Clone, PartialEq)]
pub enum HookPayload {
    Session(AuthSession),
    Failure(AuthFailure),
    Logout { session_id: String },
    Custom(Value),
}

impl HookPayload {
    /// Account identifier the event concerns, if the payload carries one.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            HookPayload::Session(session) => Some(&session.user.identifier),
            HookPayload::Failure(failure) => failure.identifier.as_deref(),
            HookPayload::Custom(value) => value.get("identifier").and_then(Value::as_str),
            HookPayload::Logout { .. } => None,
        }
    }
}

/// Plugin metadata for discovery and dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub dependencies: Vec<String>,
    /// Hooks this plugin is invoked for.
    pub hooks: Vec<Hook>,
}

/// Lifecycle state of an attached plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginState {
    Attached,
    Initializing,
    Active,
    /// Initialization failed, timed out, or was skipped because a
    /// dependency is not active.
    Failed,
    CleaningUp,
    Detached,
}

impl PluginState {
    pub fn is_active(self) -> bool {
        self == PluginState::Active
    }
}

/// Extension point of the authentication module.
///
/// `name` must be unique within one [`PluginManager`]; `dependencies` lists
/// names of plugins that must be attached (and later active) first.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use warden_di::{AuthPlugin, AuthService, Hook, HookPayload};
///
/// struct Greeter;
///
/// #[async_trait]
/// impl AuthPlugin for Greeter {
///     fn name(&self) -> &str { "greeter" }
///     fn version(&self) -> &str { "0.1.0" }
///
///     fn hooks(&self) -> Vec<Hook> {
///         vec![Hook::AuthSuccess]
///     }
///
///     async fn initialize(&self, _auth: Arc<dyn AuthService>) -> anyhow::Result<()> {
///         Ok(())
///     }
///
///     async fn execute(&self, _hook: &Hook, payload: &HookPayload) -> anyhow::Result<Value> {
///         Ok(json!({ "greeted": payload.identifier() }))
///     }
/// }
/// ```
#[async_trait]
pub trait AuthPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn description(&self) -> &str {
        ""
    }

    /// Hooks to subscribe to; defaults to success and failure.
    fn hooks(&self) -> Vec<Hook> {
        vec![Hook::AuthSuccess, Hook::AuthFailure]
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: self.name().to_string(),
            version: self.version().to_string(),
            description: self.description().to_string(),
            dependencies: self.dependencies(),
            hooks: self.hooks(),
        }
    }

    /// Called once, after every dependency is active.
    async fn initialize(&self, auth: Arc<dyn AuthService>) -> anyhow::Result<()>;

    async fn execute(&self, hook: &Hook, payload: &HookPayload) -> anyhow::Result<Value>;

    /// Called once when the plugin is detached, whether or not
    /// initialization succeeded.
    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
