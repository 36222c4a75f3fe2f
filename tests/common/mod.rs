//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use warden_di::{
    AuthError, AuthPlugin, AuthService, AuthSession, Credentials, Hook, HookPayload, User,
};

/// In-memory account store. Secrets are compared verbatim.
#[derive(Default)]
pub struct MemoryAuthService {
    accounts: Mutex<HashMap<String, String>>,
    sessions: Mutex<HashMap<String, AuthSession>>,
    next_id: AtomicU64,
}

impl MemoryAuthService {
    pub fn with_account(identifier: &str, secret: &str) -> Self {
        let service = Self::default();
        service.accounts.lock().insert(identifier.to_string(), secret.to_string());
        service
    }

    pub fn shared(identifier: &str, secret: &str) -> Arc<dyn AuthService> {
        Arc::new(Self::with_account(identifier, secret))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn open_session(&self, identifier: &str) -> AuthSession {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = AuthSession {
            session_id: format!("session-{n}"),
            user: User { id: format!("user-{identifier}"), identifier: identifier.to_string() },
            issued_at: Utc::now(),
        };
        self.sessions.lock().insert(session.session_id.clone(), session.clone());
        session
    }
}

#[async_trait]
impl AuthService for MemoryAuthService {
    async fn login(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        let valid = self
            .accounts
            .lock()
            .get(&credentials.identifier)
            .is_some_and(|secret| *secret == credentials.secret);
        if !valid {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(self.open_session(&credentials.identifier))
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
        self.sessions
            .lock()
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| AuthError::SessionNotFound { session_id: session_id.to_string() })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Hang,
}

/// Journal shared between recording plugins: `"<plugin>:<event>"` entries in
/// call order.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Plugin whose every lifecycle call is journaled and whose outcome is
/// configurable per phase.
pub struct RecordingPlugin {
    name: String,
    dependencies: Vec<String>,
    hooks: Vec<Hook>,
    on_initialize: Behavior,
    on_execute: Behavior,
    on_cleanup: Behavior,
    journal: Journal,
}

impl RecordingPlugin {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            dependencies: Vec::new(),
            hooks: vec![Hook::AuthSuccess, Hook::AuthFailure, Hook::AuthLogout],
            on_initialize: Behavior::Succeed,
            on_execute: Behavior::Succeed,
            on_cleanup: Behavior::Succeed,
            journal: Arc::clone(journal),
        }
    }

    pub fn depends_on(mut self, dependency: &str) -> Self {
        self.dependencies.push(dependency.to_string());
        self
    }

    pub fn hooks(mut self, hooks: &[&str]) -> Self {
        self.hooks = hooks.iter().map(|h| Hook::from(*h)).collect();
        self
    }

    pub fn on_initialize(mut self, behavior: Behavior) -> Self {
        self.on_initialize = behavior;
        self
    }

    pub fn on_execute(mut self, behavior: Behavior) -> Self {
        self.on_execute = behavior;
        self
    }

    pub fn on_cleanup(mut self, behavior: Behavior) -> Self {
        self.on_cleanup = behavior;
        self
    }

    pub fn shared(self) -> Arc<dyn AuthPlugin> {
        Arc::new(self)
    }

    fn record(&self, event: &str) {
        self.journal.lock().push(format!("{}:{}", self.name, event));
    }

    async fn behave(&self, behavior: Behavior, phase: &str) -> anyhow::Result<()> {
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => anyhow::bail!("{} refused to {}", self.name, phase),
            Behavior::Panic => panic!("{} exploded during {}", self.name, phase),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl AuthPlugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "0.0.1"
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn hooks(&self) -> Vec<Hook> {
        self.hooks.clone()
    }

    async fn initialize(&self, _auth: Arc<dyn AuthService>) -> anyhow::Result<()> {
        self.record("initialize");
        self.behave(self.on_initialize, "initialize").await
    }

    async fn execute(&self, hook: &Hook, payload: &HookPayload) -> anyhow::Result<Value> {
        self.record(hook.as_str());
        self.behave(self.on_execute, "execute").await?;
        Ok(json!({ "plugin": self.name, "identifier": payload.identifier() }))
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        self.record("cleanup");
        self.behave(self.on_cleanup, "cleanup").await
    }
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().clone()
}
