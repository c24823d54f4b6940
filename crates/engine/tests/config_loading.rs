use std::io::Write;
use std::time::Duration;

use engine::{ConfigError, ExecutionMode, ExecutorConfig};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
mode = "sequential"
max_concurrency = 4
max_retries = 5
retry_base_delay_ms = 250
retry_max_delay_ms = 2000
default_timeout_ms = 15000

[node_types.webhook_call]
timeout_ms = 5000
max_retries = 2

[node_types.send_email]
critical = true
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = ExecutorConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.mode, ExecutionMode::Sequential);
    assert_eq!(config.max_concurrency, 4);
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.default_timeout_ms, Some(15_000));
    assert_eq!(config.backoff(1), Duration::from_millis(250));
    assert_eq!(config.backoff(5), Duration::from_millis(2000));

    let webhook = config.policy("webhook_call").expect("webhook policy");
    assert_eq!(webhook.timeout_ms, Some(5000));
    assert_eq!(webhook.max_retries, Some(2));
    assert_eq!(config.policy("send_email").and_then(|p| p.critical), Some(true));
    assert!(config.policy("wait").is_none());
}

#[test]
fn test_load_minimal_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"max_retries = 0\n").expect("write toml");

    let config = ExecutorConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.mode, ExecutionMode::Parallel);
    assert_eq!(config.max_concurrency, 8);
    assert_eq!(config.max_retries, 0);
    assert!(config.node_types.is_empty());
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("absent.toml");

    let err = ExecutorConfig::load(&path).unwrap_err();

    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"retry_base_delay_ms = 500\nretry_max_delay_ms = 100\n").expect("write toml");

    assert!(matches!(ExecutorConfig::load(tmp.path()), Err(ConfigError::Invalid(_))));
}
