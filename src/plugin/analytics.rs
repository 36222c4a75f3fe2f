//! Event tracking and counters for authentication outcomes.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use super::{AuthPlugin, Hook, HookPayload};
use crate::auth::AuthService;
use crate::config::{AnalyticsConfig, LogLevel};

/// Tracked events kept in memory; older events are dropped first.
pub const MAX_TRACKED_EVENTS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub hook: Hook,
    pub identifier: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuthMetrics {
    pub successes: u64,
    pub failures: u64,
    pub logouts: u64,
    pub other: u64,
}

#[derive(Default)]
struct AnalyticsState {
    events: VecDeque<AnalyticsEvent>,
    metrics: AuthMetrics,
}

/// Records authentication events and keeps success/failure counters.
///
/// Subscribes to `auth:success`, `auth:failure` and `auth:logout`.
pub struct AnalyticsPlugin {
    config: AnalyticsConfig,
    state: Mutex<AnalyticsState>,
}

impl AnalyticsPlugin {
    pub const NAME: &'static str = "analytics";

    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config, state: Mutex::new(AnalyticsState::default()) }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.state.lock().events.iter().cloned().collect()
    }

    pub fn metrics(&self) -> AuthMetrics {
        self.state.lock().metrics
    }

    fn log(&self, hook: &Hook, identifier: Option<&str>) {
        let level = match hook {
            Hook::AuthFailure => LogLevel::Warn,
            _ => LogLevel::Info,
        };
        if level < self.config.log_level {
            return;
        }
        match level {
            LogLevel::Warn => tracing::warn!(%hook, identifier, "authentication event"),
            _ => tracing::info!(%hook, identifier, "authentication event"),
        }
    }
}

#[async_trait]
impl AuthPlugin for AnalyticsPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Tracks authentication events and outcome counters"
    }

    fn hooks(&self) -> Vec<Hook> {
        vec![Hook::AuthSuccess, Hook::AuthFailure, Hook::AuthLogout]
    }

    async fn initialize(&self, _auth: Arc<dyn AuthService>) -> anyhow::Result<()> {
        tracing::debug!(
            track_events = self.config.track_events,
            enable_metrics = self.config.enable_metrics,
            "analytics ready"
        );
        Ok(())
    }

    async fn execute(&self, hook: &Hook, payload: &HookPayload) -> anyhow::Result<Value> {
        let identifier = payload.identifier();
        self.log(hook, identifier);

        let mut state = self.state.lock();
        if self.config.track_events {
            if state.events.len() == MAX_TRACKED_EVENTS {
                state.events.pop_front();
            }
            state.events.push_back(AnalyticsEvent {
                hook: hook.clone(),
                identifier: identifier.map(str::to_string),
                at: Utc::now(),
            });
        }
        if self.config.enable_metrics {
            let counter = match hook {
                Hook::AuthSuccess => &mut state.metrics.successes,
                Hook::AuthFailure => &mut state.metrics.failures,
                Hook::AuthLogout => &mut state.metrics.logouts,
                Hook::Custom(_) => &mut state.metrics.other,
            };
            *counter += 1;
        }

        Ok(json!({
            "tracked": self.config.track_events,
            "metrics": state.metrics,
        }))
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        tracing::debug!(events = state.events.len(), "discarding tracked events");
        state.events.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, AuthFailure, AuthOperation};

    fn failure(identifier: &str) -> HookPayload {
        HookPayload::Failure(AuthFailure {
            operation: AuthOperation::Login,
            identifier: Some(identifier.to_string()),
            error: AuthError::InvalidCredentials,
        })
    }

    #[tokio::test]
    async fn counts_and_tracks_failures() {
        let plugin = AnalyticsPlugin::new(AnalyticsConfig::default());
        plugin.execute(&Hook::AuthFailure, &failure("ada")).await.unwrap();
        let out = plugin.execute(&Hook::AuthFailure, &failure("bob")).await.unwrap();

        assert_eq!(out["metrics"]["failures"], 2);
        let events = plugin.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].identifier.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn disabled_tracking_keeps_no_events() {
        let plugin = AnalyticsPlugin::new(AnalyticsConfig {
            track_events: false,
            enable_metrics: false,
            ..AnalyticsConfig::default()
        });
        plugin.execute(&Hook::AuthFailure, &failure("ada")).await.unwrap();
        assert!(plugin.events().is_empty());
        assert_eq!(plugin.metrics(), AuthMetrics::default());
    }

    #[tokio::test]
    async fn cleanup_discards_events() {
        let plugin = AnalyticsPlugin::new(AnalyticsConfig::default());
        plugin.execute(&Hook::AuthFailure, &failure("ada")).await.unwrap();
        plugin.cleanup().await.unwrap();
        assert!(plugin.events().is_empty());
        assert_eq!(plugin.metrics().failures, 1);
    }
}
