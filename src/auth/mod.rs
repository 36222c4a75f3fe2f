//! Authentication facade and the low-level service it wraps.
//!
//! [`AuthService`] is the primitive an application registers in the
//! container under [`AUTH_SERVICE`]. [`FeatureAuthService`] resolves it,
//! forwards every call, and reports the outcome to the attached plugins.

pub mod factory;
pub mod feature;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::Token;
use crate::plugin::PluginManager;

pub use factory::{AuthModule, AuthModuleFactory};
pub use feature::FeatureAuthService;

/// Container token of the low-level authentication primitive.
pub const AUTH_SERVICE: Token<dyn AuthService> = Token::new("AuthService");

/// Container token of the plugin-aware facade.
pub const FEATURE_AUTH_SERVICE: Token<FeatureAuthService> = Token::new("FeatureAuthService");

/// Optional container token for a preconfigured plugin host.
pub const PLUGIN_MANAGER: Token<PluginManager> = Token::new("PluginManager");

/// The authentication primitive wrapped by [`FeatureAuthService`].
///
/// Implementations own credential checking and session storage; this crate
/// never inspects secrets.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError>;

    async fn register(&self, credentials: &Credentials) -> Result<AuthSession, AuthError>;

    async fn logout(&self, session_id: &str) -> Result<(), AuthError>;
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), secret: secret.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub session_id: String,
    pub user: User,
    pub issued_at: DateTime<Utc>,
}

/// Failure of the low-level authentication primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account '{identifier}' already exists")]
    AlreadyRegistered { identifier: String },
    #[error("Account '{identifier}' is locked")]
    Locked { identifier: String },
    #[error("Session '{session_id}' not found")]
    SessionNotFound { session_id: String },
    #[error("Authentication backend unavailable: {reason}")]
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthOperation {
    Login,
    Register,
    Logout,
}

impl fmt::Display for AuthOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthOperation::Login => "login",
            AuthOperation::Register => "register",
            AuthOperation::Logout => "logout",
        })
    }
}

/// Payload of the `auth:failure` hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFailure {
    pub operation: AuthOperation,
    /// Account the attempt was made for, when known.
    pub identifier: Option<String>,
    pub error: AuthError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_secret() {
        let rendered = format!("{:?}", Credentials::new("ada", "hunter2"));
        assert!(rendered.contains("ada"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn failure_serializes_camel_case() {
        let failure = AuthFailure {
            operation: AuthOperation::Login,
            identifier: Some("ada".into()),
            error: AuthError::InvalidCredentials,
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["operation"], "login");
        assert_eq!(json["error"]["kind"], "invalidCredentials");
    }
}
