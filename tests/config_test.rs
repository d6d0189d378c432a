//! 配置加载测试

use flare_discovery::{Config, DiscoveryError, HealthConfig, RegistryConfig};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[test]
fn minimal_config_uses_defaults() {
    let config = assert_ok!(Config::from_toml_str(
        r#"
        [service]
        name = "orders"
        host = "10.0.0.5"
        port = 9000
        "#,
    ));

    assert_eq!(config.service.name, "orders");
    assert!(config.service.tags.is_empty());
    assert_eq!(config.registry, RegistryConfig::default());
    assert_eq!(config.registry.address(), "localhost:8500");
    assert_eq!(config.health, HealthConfig::default());
    assert_eq!(config.health.interval(), Duration::from_secs(1));
    assert_eq!(config.health.max_attempts, 0);
    assert!(config.health.deregister_on_shutdown);
}

#[test]
fn full_config_overrides_defaults() {
    let config = assert_ok!(Config::from_toml_str(
        r#"
        [service]
        name = "orders"
        host = "10.0.0.5"
        port = 9000
        tags = ["grpc", "v2"]

        [registry]
        host = "consul.internal"
        port = 8501
        user = "svc"
        pass = "secret"
        scheme = "https"

        [health]
        interval_ms = 250
        max_attempts = 5
        deregister_on_shutdown = false
        "#,
    ));

    assert_eq!(config.service.tags, vec!["grpc", "v2"]);
    assert_eq!(config.registry.base_url(), "https://consul.internal:8501");
    assert_eq!(config.registry.credentials(), Some(("svc", "secret")));
    assert_eq!(config.health.interval(), Duration::from_millis(250));
    assert_eq!(config.health.max_attempts, 5);
    assert!(!config.health.deregister_on_shutdown);
}

#[test]
fn missing_service_section_is_a_config_error() {
    let err = assert_err!(Config::from_toml_str("[registry]\nport = 8500\n"));
    assert!(matches!(err, DiscoveryError::Config(_)));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = assert_err!(Config::load_from_file("/nonexistent/discovery.toml"));
    assert!(matches!(err, DiscoveryError::Config(_)));
}

#[test]
fn credentials_require_both_parts() {
    let config = RegistryConfig {
        user: Some("svc".to_string()),
        pass: Some(String::new()),
        ..RegistryConfig::default()
    };
    assert_eq!(config.credentials(), None);
}

#[test]
fn health_interval_must_stay_inside_check_ttl() {
    for interval_ms in [0u64, 5000, 60_000] {
        let content = format!(
            "[service]\nname = \"orders\"\nhost = \"10.0.0.5\"\nport = 9000\n\n[health]\ninterval_ms = {}\n",
            interval_ms
        );
        let err = assert_err!(Config::from_toml_str(&content));
        assert!(matches!(err, DiscoveryError::Config(_)), "{}: {:?}", interval_ms, err);
    }

    let health = HealthConfig {
        interval_ms: 4999,
        ..HealthConfig::default()
    };
    assert_ok!(health.validate());
}

#[test]
fn empty_service_name_is_rejected() {
    let err = assert_err!(Config::from_toml_str(
        "[service]\nname = \"\"\nhost = \"10.0.0.5\"\nport = 9000\n"
    ));
    assert!(matches!(err, DiscoveryError::Config(_)));
}
