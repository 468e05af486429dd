use gate_config::{AppConfig, ConfigError, RateLimitSettings};
use std::collections::HashMap;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

const REQUIRED: [(&str, &str); 2] = [
    ("GATE_JWT_SECRET", "secret"),
    ("GATE_DEVICE_API_KEY", "device-key"),
];

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("GATE_JWT_SECRET", "secret");
        std::env::set_var("GATE_DEVICE_API_KEY", "device-key");
        std::env::set_var("GATE_HTTP_ADDR", "127.0.0.1:8081");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.device_api_key, "device-key");
}

#[test]
fn defaults_follow_heartbeat_interval() {
    let config = AppConfig::from_lookup(lookup(&REQUIRED)).expect("config");
    assert_eq!(config.heartbeat_interval_ms, 30_000);
    assert_eq!(config.online_threshold_ms, 90_000);
    assert_eq!(config.actuation_timeout_ms, 5000);
    assert!(config.database_url.is_none());
    assert!(config.emergency_code.is_none());
    assert_eq!(config.rate_limit, RateLimitSettings::default());
}

#[test]
fn custom_interval_scales_threshold() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("GATE_HEARTBEAT_INTERVAL_MS", "10000"));
    let config = AppConfig::from_lookup(lookup(&pairs)).expect("config");
    assert_eq!(config.online_threshold_ms, 30_000);
}

#[test]
fn missing_device_key_is_reported() {
    let err = AppConfig::from_lookup(lookup(&[("GATE_JWT_SECRET", "secret")]))
        .expect_err("missing key");
    assert!(matches!(err, ConfigError::Missing(key) if key == "GATE_DEVICE_API_KEY"));
}

#[test]
fn invalid_number_is_reported() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("GATE_RATE_LIMIT_VERIFY_MAX", "many"));
    let err = AppConfig::from_lookup(lookup(&pairs)).expect_err("invalid");
    assert!(matches!(err, ConfigError::Invalid(key, _) if key == "GATE_RATE_LIMIT_VERIFY_MAX"));
}

#[test]
fn blank_emergency_code_counts_as_unset() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("GATE_EMERGENCY_CODE", "  "));
    let config = AppConfig::from_lookup(lookup(&pairs)).expect("config");
    assert!(config.emergency_code.is_none());
}
