//! Configuration for the authentication module and its built-in plugins.
//!
//! [`AuthModuleConfig`] is read from JSON (camelCase keys, every field
//! optional) and then patched by any number of [`ConfigSource`]s, usually
//! the process environment:
//!
//! ```text
//! WARDEN_SECURITY_MAX_ATTEMPTS=3
//! WARDEN_PLUGINS_HOOK_TIMEOUT_MS=500
//! ```

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(String),
    #[error("Invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// A configuration value that can be various types
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl ConfigValue {
    /// Parses raw text the way environment variables are read.
    pub fn parse(raw: &str) -> Self {
        if let Ok(int_val) = raw.parse::<i64>() {
            ConfigValue::Integer(int_val)
        } else if let Ok(float_val) = raw.parse::<f64>() {
            ConfigValue::Float(float_val)
        } else if let Ok(bool_val) = raw.parse::<bool>() {
            ConfigValue::Boolean(bool_val)
        } else {
            ConfigValue::String(raw.to_string())
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(ConfigValue::String(s.clone())),
            Value::Bool(b) => Some(ConfigValue::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(ConfigValue::Integer)
                .or_else(|| n.as_f64().map(ConfigValue::Float)),
            _ => None,
        }
    }

    pub fn as_str(&self, key: &str) -> ConfigResult<&str> {
        match self {
            ConfigValue::String(s) => Ok(s),
            _ => Err(invalid(key, "expected a string")),
        }
    }

    pub fn as_i64(&self, key: &str) -> ConfigResult<i64> {
        match self {
            ConfigValue::Integer(i) => Ok(*i),
            _ => Err(invalid(key, "expected an integer")),
        }
    }

    pub fn as_bool(&self, key: &str) -> ConfigResult<bool> {
        match self {
            ConfigValue::Boolean(b) => Ok(*b),
            _ => Err(invalid(key, "expected a boolean")),
        }
    }

    pub fn as_u32(&self, key: &str) -> ConfigResult<u32> {
        let value = self.as_i64(key)?;
        u32::try_from(value).map_err(|_| invalid(key, "out of range"))
    }

    /// Interprets the value as a non-negative number of milliseconds.
    pub fn as_duration_ms(&self, key: &str) -> ConfigResult<Duration> {
        let ms = self.as_i64(key)?;
        if ms < 0 {
            return Err(invalid(key, "duration cannot be negative"));
        }
        Ok(Duration::from_millis(ms as u64))
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key: key.to_string(), reason: reason.into() }
}

/// Trait for configuration sources
pub trait ConfigSource: Send + Sync + std::fmt::Debug {
    /// Get a configuration value by key
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// List all available keys
    fn keys(&self) -> Vec<String>;
}

/// Environment variable configuration source
///
/// Keys are upper-cased and joined to the prefix with `_`, so
/// `security_max_attempts` with prefix `warden` reads
/// `WARDEN_SECURITY_MAX_ATTEMPTS`.
#[derive(Debug, Default)]
pub struct EnvironmentConfigSource {
    prefix: Option<String>,
}

impl EnvironmentConfigSource {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: Some(prefix.into()) }
    }

    fn env_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }
}

impl ConfigSource for EnvironmentConfigSource {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        env::var(self.env_key(key)).ok().map(|value| ConfigValue::parse(&value))
    }

    fn keys(&self) -> Vec<String> {
        env::vars()
            .filter_map(|(key, _)| match &self.prefix {
                Some(prefix) => {
                    let prefix = format!("{}_", prefix.to_uppercase());
                    key.strip_prefix(&prefix).map(str::to_lowercase)
                }
                None => Some(key.to_lowercase()),
            })
            .collect()
    }
}

/// Flat JSON object used as an override source.
///
/// ```rust
/// use warden_di::{ConfigSource, ConfigValue, JsonConfigSource};
///
/// let source = JsonConfigSource::from_str(r#"{"security_max_attempts": 3}"#).unwrap();
/// assert_eq!(source.get("security_max_attempts"), Some(ConfigValue::Integer(3)));
/// ```
#[derive(Debug, Default, Clone)]
pub struct JsonConfigSource {
    values: HashMap<String, ConfigValue>,
}

impl JsonConfigSource {
    /// Nested objects and arrays are ignored; only scalar top-level fields
    /// become keys.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> ConfigResult<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> ConfigResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::Parse("expected a JSON object".to_string()))?;
        let values = object
            .iter()
            .filter_map(|(key, value)| ConfigValue::from_json(value).map(|v| (key.clone(), v)))
            .collect();
        Ok(Self { values })
    }
}

impl ConfigSource for JsonConfigSource {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Settings for [`AnalyticsPlugin`](crate::plugin::analytics::AnalyticsPlugin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsConfig {
    pub track_events: bool,
    pub enable_metrics: bool,
    /// Lowest level of event the plugin logs.
    pub log_level: LogLevel,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { track_events: true, enable_metrics: true, log_level: LogLevel::Info }
    }
}

/// Settings for [`SecurityPlugin`](crate::plugin::security::SecurityPlugin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    pub enable_rate_limiting: bool,
    /// Consecutive failures before an identifier is locked out.
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub lockout_duration: Duration,
    pub enable_audit_logging: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            max_attempts: 5,
            lockout_duration: Duration::from_secs(15 * 60),
            enable_audit_logging: true,
        }
    }
}

/// Per-plugin time limits applied by [`PluginManager`](crate::PluginManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginManagerConfig {
    #[serde(rename = "initTimeoutMs", with = "duration_ms")]
    pub init_timeout: Duration,
    #[serde(rename = "hookTimeoutMs", with = "duration_ms")]
    pub hook_timeout: Duration,
    #[serde(rename = "cleanupTimeoutMs", with = "duration_ms")]
    pub cleanup_timeout: Duration,
}

impl Default for PluginManagerConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(5),
            hook_timeout: Duration::from_secs(2),
            cleanup_timeout: Duration::from_secs(5),
        }
    }
}

/// Complete configuration of the authentication module.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use warden_di::{AuthModuleConfig, JsonConfigSource};
///
/// let overrides = JsonConfigSource::from_str(r#"{"security_max_attempts": 3}"#).unwrap();
/// let config = AuthModuleConfig::load(
///     Some(r#"{"security": {"lockoutDuration": 60000}, "analytics": {"logLevel": "warn"}}"#),
///     &[&overrides],
/// )
/// .unwrap();
///
/// assert_eq!(config.security.max_attempts, 3);
/// assert_eq!(config.security.lockout_duration, Duration::from_secs(60));
/// assert!(config.analytics.track_events);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthModuleConfig {
    pub analytics: AnalyticsConfig,
    pub security: SecurityConfig,
    pub plugins: PluginManagerConfig,
}

impl AuthModuleConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parses `json` (defaults when `None`), applies `sources` in order, then
    /// validates.
    pub fn load(json: Option<&str>, sources: &[&dyn ConfigSource]) -> ConfigResult<Self> {
        let mut config = match json {
            Some(json) => Self::from_json_str(json)?,
            None => Self::default(),
        };
        for source in sources {
            config.apply(*source)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Defaults patched by `WARDEN_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::load(None, &[&EnvironmentConfigSource::with_prefix("warden")])
    }

    /// Overrides every field the source has a value for.
    pub fn apply(&mut self, source: &dyn ConfigSource) -> ConfigResult<()> {
        macro_rules! set {
            ($key:literal, $field:expr, $conv:ident) => {
                if let Some(value) = source.get($key) {
                    $field = value.$conv($key)?;
                }
            };
        }

        set!("analytics_track_events", self.analytics.track_events, as_bool);
        set!("analytics_enable_metrics", self.analytics.enable_metrics, as_bool);
        if let Some(value) = source.get("analytics_log_level") {
            self.analytics.log_level = value
                .as_str("analytics_log_level")?
                .parse()
                .map_err(|reason: String| invalid("analytics_log_level", reason))?;
        }

        set!("security_enable_rate_limiting", self.security.enable_rate_limiting, as_bool);
        set!("security_max_attempts", self.security.max_attempts, as_u32);
        set!("security_lockout_duration_ms", self.security.lockout_duration, as_duration_ms);
        set!("security_enable_audit_logging", self.security.enable_audit_logging, as_bool);

        set!("plugins_init_timeout_ms", self.plugins.init_timeout, as_duration_ms);
        set!("plugins_hook_timeout_ms", self.plugins.hook_timeout, as_duration_ms);
        set!("plugins_cleanup_timeout_ms", self.plugins.cleanup_timeout, as_duration_ms);
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.security.max_attempts == 0 {
            return Err(invalid("security.maxAttempts", "must be at least 1"));
        }
        let timeouts = [
            ("plugins.initTimeoutMs", self.plugins.init_timeout),
            ("plugins.hookTimeoutMs", self.plugins.hook_timeout),
            ("plugins.cleanupTimeoutMs", self.plugins.cleanup_timeout),
        ];
        for (key, timeout) in timeouts {
            if timeout.is_zero() {
                return Err(invalid(key, "must be greater than zero"));
            }
        }
        Ok(())
    }
}
