//! Auth Flow Demo - an authentication backend wired through the container
//!
//! This example demonstrates:
//! - Registering an `AuthService` implementation under a token
//! - Building the feature service with the built-in analytics and security plugins
//! - Configuration from JSON with `WARDEN_*` environment overrides
//! - Hook dispatch on login, failed login and logout
//! - Lockout after repeated failures and ordered plugin shutdown
//!
//! Run with `RUST_LOG=debug cargo run --example auth_flow` to see plugin logs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_di::{
    AuthError, AuthModuleConfig, AuthModuleFactory, AuthService, AuthSession, Container,
    Credentials, EnvironmentConfigSource, HookPayload, SecurityPlugin, User, AUTH_SERVICE,
};

/// Accounts kept in memory; secrets compared verbatim.
#[derive(Default)]
struct InMemoryBackend {
    accounts: Mutex<HashMap<String, String>>,
    sessions: Mutex<HashMap<String, AuthSession>>,
    next_session: AtomicU64,
}

impl InMemoryBackend {
    fn open_session(&self, identifier: &str) -> AuthSession {
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        let session = AuthSession {
            session_id: format!("sess-{n:04}"),
            user: User { id: format!("u-{identifier}"), identifier: identifier.to_string() },
            issued_at: Utc::now(),
        };
        self.sessions.lock().insert(session.session_id.clone(), session.clone());
        session
    }
}

#[async_trait]
impl AuthService for InMemoryBackend {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        let known = self
            .accounts
            .lock()
            .get(&credentials.identifier)
            .is_some_and(|secret| *secret == credentials.secret);
        if known {
            Ok(self.open_session(&credentials.identifier))
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    async fn register(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&credentials.identifier) {
                return Err(AuthError::AlreadyRegistered {
                    identifier: credentials.identifier.clone(),
                });
            }
            accounts.insert(credentials.identifier.clone(), credentials.secret.clone());
        }
        Ok(self.open_session(&credentials.identifier))
    }

    async fn logout(&self, session_id: &str) -> Result<(), AuthError> {
        match self.sessions.lock().remove(session_id) {
            Some(_) => Ok(()),
            None => Err(AuthError::SessionNotFound { session_id: session_id.to_string() }),
        }
    }
}

const CONFIG: &str = r#"{
    "analytics": { "logLevel": "info" },
    "security": { "maxAttempts": 3, "lockoutDuration": 60000 },
    "plugins": { "hookTimeoutMs": 500 }
}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let env = EnvironmentConfigSource::with_prefix("warden");
    let config = AuthModuleConfig::load(Some(CONFIG), &[&env])?;
    info!(max_attempts = config.security.max_attempts, "configuration loaded");

    let container = Container::new();
    container.register_instance_by_token(
        AUTH_SERVICE,
        Arc::new(InMemoryBackend::default()) as Arc<dyn AuthService>,
    );

    let module = AuthModuleFactory::create_with_config(&container, &config, Vec::new()).await?;
    println!("Plugins attached in order: {:?}", module.attach.attached);
    let auth = module.service;

    println!("\n=== Register and log in ===");
    let session = auth.register(&Credentials::new("grace", "hopper")).await?;
    println!("Registered {} with session {}", session.user.identifier, session.session_id);
    let session = auth.login(&Credentials::new("grace", "hopper")).await?;
    println!("Logged in again: {}", session.session_id);

    println!("\n=== Repeated failures ===");
    for attempt in 1..=config.security.max_attempts {
        let err = auth.login(&Credentials::new("grace", "wrong")).await.unwrap_err();
        println!("Attempt {attempt}: {err}");
    }
    let check = auth
        .emit(
            SecurityPlugin::CHECK_HOOK,
            HookPayload::Custom(serde_json::json!({ "identifier": "grace" })),
        )
        .await;
    if let Some(Ok(status)) = check.get(SecurityPlugin::NAME) {
        println!("Security status for grace: {status}");
    }

    println!("\n=== Logout ===");
    auth.logout(&session.session_id).await?;
    if let Some(results) = auth.last_hook_results() {
        for (plugin, outcome) in results.iter() {
            let status = if outcome.is_ok() { "ok" } else { "failed" };
            println!("{} -> {plugin}: {status}", results.hook());
        }
    }

    let report = auth.shutdown().await;
    println!("\nDetached (reverse order): {:?}", report.detached);
    Ok(())
}
