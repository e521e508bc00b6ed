//! Tests for configuration loading

use super::*;

#[test]
fn test_empty_config_uses_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config, Config::default());

    let broker = config.broker_config();
    assert_eq!(broker.port, pond_protocol::DEFAULT_PORT);
    assert_eq!(broker.capacity, BrokerConfig::default().capacity);
}

#[test]
fn test_partial_config_keeps_other_defaults() {
    let config: Config = toml::from_str(
        r#"
[database]
capacity = 128
"#,
    )
    .unwrap();

    assert_eq!(config.database.capacity, 128);
    assert_eq!(config.listen, ListenConfig::default());
    assert_eq!(config.log.level, LogLevel::Info);
}

#[test]
fn test_full_config() {
    let config: Config = toml::from_str(
        r#"
[listen]
address = "127.0.0.1"
port = 6000

[database]
capacity = 1024

[connection]
high_water = 4096
heartbeat_interval_secs = 0
max_queries = 8

[log]
level = "debug"
"#,
    )
    .unwrap();

    let broker = config.broker_config();
    assert_eq!(broker.address, "127.0.0.1");
    assert_eq!(broker.port, 6000);
    assert_eq!(broker.capacity, 1024);
    assert_eq!(broker.high_water, 4096);
    assert_eq!(broker.heartbeat_interval_secs, 0);
    assert_eq!(broker.max_queries_per_connection, 8);
    assert_eq!(config.log.level.as_str(), "debug");
}

#[test]
fn test_from_file_missing_path_fails() {
    assert!(Config::from_file("/nonexistent/pond.toml").is_err());
}

#[test]
fn test_from_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pond.toml");
    std::fs::write(&path, "[listen]\nport = 7000\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.listen.port, 7000);
}
