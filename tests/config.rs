use std::env;
use std::time::Duration;

use serial_test::serial;
use warden_di::{
    AuthModuleConfig, ConfigError, EnvironmentConfigSource, JsonConfigSource, LogLevel,
};

const OVERRIDES: [&str; 4] = [
    "WARDEN_SECURITY_MAX_ATTEMPTS",
    "WARDEN_ANALYTICS_LOG_LEVEL",
    "WARDEN_PLUGINS_HOOK_TIMEOUT_MS",
    "WARDEN_SECURITY_ENABLE_AUDIT_LOGGING",
];

fn clear_overrides() {
    for key in OVERRIDES {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    clear_overrides();
    env::set_var("WARDEN_SECURITY_MAX_ATTEMPTS", "3");
    env::set_var("WARDEN_ANALYTICS_LOG_LEVEL", "ERROR");
    env::set_var("WARDEN_PLUGINS_HOOK_TIMEOUT_MS", "250");
    env::set_var("WARDEN_SECURITY_ENABLE_AUDIT_LOGGING", "false");

    let config = AuthModuleConfig::from_env();
    clear_overrides();
    let config = config.unwrap();

    assert_eq!(config.security.max_attempts, 3);
    assert_eq!(config.analytics.log_level, LogLevel::Error);
    assert_eq!(config.plugins.hook_timeout, Duration::from_millis(250));
    assert!(!config.security.enable_audit_logging);
    assert_eq!(config.plugins.init_timeout, Duration::from_secs(5));
}

#[test]
#[serial]
fn malformed_environment_value_names_the_key() {
    clear_overrides();
    env::set_var("WARDEN_SECURITY_MAX_ATTEMPTS", "many");

    let result = AuthModuleConfig::from_env();
    clear_overrides();

    match result {
        Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "security_max_attempts"),
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[test]
#[serial]
fn environment_is_applied_after_json() {
    clear_overrides();
    env::set_var("WARDEN_SECURITY_MAX_ATTEMPTS", "9");

    let env_source = EnvironmentConfigSource::with_prefix("warden");
    let result = AuthModuleConfig::load(
        Some(r#"{"security": {"maxAttempts": 2, "enableRateLimiting": false}}"#),
        &[&env_source],
    );
    clear_overrides();
    let config = result.unwrap();

    assert_eq!(config.security.max_attempts, 9);
    assert!(!config.security.enable_rate_limiting);
}

#[test]
fn partial_json_keeps_defaults() {
    let config =
        AuthModuleConfig::from_json_str(r#"{"analytics": {"trackEvents": false}}"#).unwrap();
    assert!(!config.analytics.track_events);
    assert!(config.analytics.enable_metrics);
    assert_eq!(config.security, Default::default());
    assert_eq!(config.plugins, Default::default());
}

#[test]
fn later_sources_win() {
    let first = JsonConfigSource::from_str(r#"{"security_max_attempts": 4}"#).unwrap();
    let second = JsonConfigSource::from_str(r#"{"security_max_attempts": 7}"#).unwrap();
    let config = AuthModuleConfig::load(None, &[&first, &second]).unwrap();
    assert_eq!(config.security.max_attempts, 7);
}

#[test]
fn invalid_settings_are_rejected() {
    let zero_attempts = AuthModuleConfig::load(Some(r#"{"security": {"maxAttempts": 0}}"#), &[]);
    assert_eq!(
        zero_attempts.unwrap_err(),
        ConfigError::Invalid {
            key: "security.maxAttempts".into(),
            reason: "must be at least 1".into()
        }
    );

    let overrides = JsonConfigSource::from_str(r#"{"plugins_init_timeout_ms": 0}"#).unwrap();
    let zero_timeout = AuthModuleConfig::load(None, &[&overrides]).unwrap_err();
    assert!(zero_timeout.to_string().contains("plugins.initTimeoutMs"));

    let negative = JsonConfigSource::from_str(r#"{"security_lockout_duration_ms": -1}"#).unwrap();
    assert!(AuthModuleConfig::load(None, &[&negative]).is_err());
}

#[test]
fn unparseable_json_is_a_parse_error() {
    assert!(matches!(
        AuthModuleConfig::from_json_str("{ not json"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(JsonConfigSource::from_str("[1, 2]"), Err(ConfigError::Parse(_))));
}

#[test]
fn unknown_log_level_is_rejected() {
    let overrides = JsonConfigSource::from_str(r#"{"analytics_log_level": "verbose"}"#).unwrap();
    let err = AuthModuleConfig::load(None, &[&overrides]).unwrap_err();
    assert!(err.to_string().contains("verbose"));
}
