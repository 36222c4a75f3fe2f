//! Failed-attempt rate limiting, lockout and audit trail.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;

use super::{AuthPlugin, Hook, HookPayload};
use crate::auth::AuthService;
use crate::config::SecurityConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub hook: Hook,
    pub identifier: Option<String>,
    pub detail: String,
}

#[derive(Debug, Default)]
struct AttemptRecord {
    failures: u32,
    locked_until: Option<Instant>,
}

/// Counts consecutive failures per identifier and locks the identifier out
/// once `maxAttempts` is reached.
///
/// Besides the auth hooks it answers the custom hook `security:check`,
/// whose payload is `{"identifier": ...}`, with `{"locked": bool}`.
pub struct SecurityPlugin {
    config: SecurityConfig,
    attempts: Mutex<HashMap<String, AttemptRecord>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl SecurityPlugin {
    pub const NAME: &'static str = "security";
    pub const CHECK_HOOK: &'static str = "security:check";

    pub fn new(config: SecurityConfig) -> Self {
        Self { config, attempts: Mutex::new(HashMap::new()), audit: Mutex::new(Vec::new()) }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// True while `identifier` is inside a lockout window.
    pub fn is_locked_out(&self, identifier: &str) -> bool {
        self.attempts
            .lock()
            .get(identifier)
            .and_then(|record| record.locked_until)
            .is_some_and(|until| until > Instant::now())
    }

    /// Consecutive failures recorded since the last success or lockout.
    pub fn failed_attempts(&self, identifier: &str) -> u32 {
        self.attempts.lock().get(identifier).map_or(0, |r| r.failures)
    }

    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.lock().clone()
    }

    fn record_failure(&self, identifier: &str) -> Value {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        let record = attempts.entry(identifier.to_string()).or_default();

        if record.locked_until.is_some_and(|until| until > now) {
            return json!({ "identifier": identifier, "locked": true, "attempts": record.failures });
        }
        record.locked_until = None;
        record.failures += 1;
        let count = record.failures;

        let locked = count >= self.config.max_attempts;
        if locked {
            record.locked_until = Some(now + self.config.lockout_duration);
            record.failures = 0;
            tracing::warn!(
                identifier,
                lockout_ms = self.config.lockout_duration.as_millis() as u64,
                "identifier locked out"
            );
        }

        json!({
            "identifier": identifier,
            "locked": locked,
            "attempts": count,
            "remainingAttempts": self.config.max_attempts.saturating_sub(count),
        })
    }

    fn audit(&self, hook: &Hook, identifier: Option<&str>, detail: String) {
        if !self.config.enable_audit_logging {
            return;
        }
        tracing::info!(target: "warden_di::audit", %hook, identifier, %detail, "audit");
        self.audit.lock().push(AuditEntry {
            at: Utc::now(),
            hook: hook.clone(),
            identifier: identifier.map(str::to_string),
            detail,
        });
    }
}

#[async_trait]
impl AuthPlugin for SecurityPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Rate limits failed logins and keeps an audit trail"
    }

    fn hooks(&self) -> Vec<Hook> {
        vec![
            Hook::AuthSuccess,
            Hook::AuthFailure,
            Hook::AuthLogout,
            Hook::from(Self::CHECK_HOOK),
        ]
    }

    async fn initialize(&self, _auth: Arc<dyn AuthService>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&self, hook: &Hook, payload: &HookPayload) -> anyhow::Result<Value> {
        let identifier = payload.identifier();

        match (hook, payload) {
            (Hook::AuthFailure, HookPayload::Failure(failure)) => {
                let detail = format!("{} failed: {}", failure.operation, failure.error);
                self.audit(hook, identifier, detail);
                match (identifier, self.config.enable_rate_limiting) {
                    (Some(identifier), true) => Ok(self.record_failure(identifier)),
                    _ => Ok(json!({ "locked": false })),
                }
            }
            (Hook::AuthSuccess, HookPayload::Session(session)) => {
                self.audit(hook, identifier, format!("session {} issued", session.session_id));
                if let Some(identifier) = identifier {
                    self.attempts.lock().remove(identifier);
                }
                Ok(json!({ "locked": false }))
            }
            (Hook::AuthLogout, HookPayload::Logout { session_id }) => {
                self.audit(hook, None, format!("session {session_id} ended"));
                Ok(Value::Null)
            }
            (Hook::Custom(name), _) if name == Self::CHECK_HOOK => {
                let identifier = identifier
                    .ok_or_else(|| anyhow::anyhow!("{} requires an identifier", Self::CHECK_HOOK))?;
                Ok(json!({ "identifier": identifier, "locked": self.is_locked_out(identifier) }))
            }
            _ => anyhow::bail!("unexpected payload for {hook}"),
        }
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        self.attempts.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::{AuthError, AuthFailure, AuthOperation};

    fn failure(identifier: &str) -> HookPayload {
        HookPayload::Failure(AuthFailure {
            operation: AuthOperation::Login,
            identifier: Some(identifier.to_string()),
            error: AuthError::InvalidCredentials,
        })
    }

    fn plugin(max_attempts: u32) -> SecurityPlugin {
        SecurityPlugin::new(SecurityConfig {
            max_attempts,
            lockout_duration: Duration::from_secs(60),
            ..SecurityConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn locks_out_after_max_attempts_then_expires() {
        let security = plugin(2);
        security.execute(&Hook::AuthFailure, &failure("ada")).await.unwrap();
        assert!(!security.is_locked_out("ada"));

        let out = security.execute(&Hook::AuthFailure, &failure("ada")).await.unwrap();
        assert_eq!(out["locked"], true);
        assert!(security.is_locked_out("ada"));
        assert!(!security.is_locked_out("bob"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!security.is_locked_out("ada"));
    }

    #[tokio::test]
    async fn success_resets_counter() {
        let security = plugin(3);
        security.execute(&Hook::AuthFailure, &failure("ada")).await.unwrap();
        assert_eq!(security.failed_attempts("ada"), 1);

        let session = crate::auth::AuthSession {
            session_id: "s1".into(),
            user: crate::auth::User { id: "u1".into(), identifier: "ada".into() },
            issued_at: Utc::now(),
        };
        security.execute(&Hook::AuthSuccess, &HookPayload::Session(session)).await.unwrap();
        assert_eq!(security.failed_attempts("ada"), 0);
        assert_eq!(security.audit_log().len(), 2);
    }

    #[tokio::test]
    async fn check_hook_reports_lock_state() {
        let security = plugin(1);
        security.execute(&Hook::AuthFailure, &failure("ada")).await.unwrap();

        let check = Hook::from(SecurityPlugin::CHECK_HOOK);
        let payload = HookPayload::Custom(json!({ "identifier": "ada" }));
        let out = security.execute(&check, &payload).await.unwrap();
        assert_eq!(out["locked"], true);

        let err = security.execute(&check, &HookPayload::Custom(json!({}))).await.unwrap_err();
        assert!(err.to_string().contains("requires an identifier"));
    }

    #[tokio::test]
    async fn audit_can_be_disabled() {
        let security = SecurityPlugin::new(SecurityConfig {
            enable_audit_logging: false,
            ..SecurityConfig::default()
        });
        security.execute(&Hook::AuthFailure, &failure("ada")).await.unwrap();
        assert!(security.audit_log().is_empty());
    }
}
