//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.
//! We test observable outcomes, not implementation details of TOML parsing.

use mqtt_resubscriber::config::{ClientConfig, ConfigError, Overrides};
use rumqttc::QoS;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{contents}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[session]
server_uri = "tcp://broker.local:1883"
client_id = "basement-sensor-reader"
topics = ["/home/temp/int/raw", "/home/pressure/raw"]
qos = 2
clean_session = true

[retry]
max_attempts = 3
delay_ms = 1000

[mqtt]
keep_alive_secs = 60
username_env = "MQTT_USER"
password_env = "MQTT_PASS"
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.session.server_uri, "tcp://broker.local:1883");
    assert_eq!(config.session.client_id, "basement-sensor-reader");
    assert_eq!(config.session.topics.len(), 2);
    assert!(config.session.clean_session);
    assert_eq!(config.mqtt.keep_alive_secs, 60);
    assert_eq!(config.mqtt.username_env, Some("MQTT_USER".to_string()));

    let session = config.session_config().unwrap();
    assert_eq!(session.qos, QoS::ExactlyOnce);
    assert_eq!(session.max_retry_attempts, 3);
    assert_eq!(session.retry_delay, Duration::from_millis(1000));
}

#[test]
fn test_missing_tables_fall_back_to_defaults() {
    let temp_file = write_config(
        r#"
[session]
server_uri = "mqtt://other-host"
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();
    let session = config.session_config().unwrap();

    assert_eq!(session.server_uri, "mqtt://other-host");
    assert_eq!(session.client_id, "async_subscribe");
    assert_eq!(
        session.topics,
        vec!["/home/temp/int/raw", "/home/pressure/raw", "/home/temp/ext/raw"]
    );
    assert_eq!(session.qos, QoS::AtLeastOnce);
    assert!(!session.clean_session);
    assert_eq!(session.max_retry_attempts, 5);
    assert_eq!(session.retry_delay, Duration::from_millis(2500));
}

#[test]
fn test_missing_file_is_read_error() {
    let result = ClientConfig::load_from_file(std::path::Path::new("/nonexistent/subscriber.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[session\nserver_uri = ");
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_invalid_qos_rejected_on_load() {
    let temp_file = write_config(
        r#"
[session]
qos = 3
"#,
    );

    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidQos(3))));
}

#[test]
fn test_unsupported_scheme_rejected_on_load() {
    let temp_file = write_config(
        r#"
[session]
server_uri = "http://localhost:1883"
"#,
    );

    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidServerUri(_))));
}

#[test]
fn test_empty_topic_list_rejected_on_load() {
    let temp_file = write_config(
        r#"
[session]
topics = []
"#,
    );

    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_zero_retries_rejected_on_load() {
    let temp_file = write_config(
        r#"
[retry]
max_attempts = 0
"#,
    );

    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_overrides_win_over_file_values() {
    let temp_file = write_config(
        r#"
[session]
server_uri = "tcp://from-file:1883"
topics = ["/from/file"]
"#,
    );
    let mut config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    config.apply_overrides(Overrides {
        server_uri: Some("ssl://from-cli:8883".to_string()),
        topics: vec!["/a".to_string(), "/b".to_string()],
        max_attempts: Some(2),
        ..Default::default()
    });
    let session = config.session_config().unwrap();

    assert_eq!(session.server_uri, "ssl://from-cli:8883");
    assert_eq!(session.topics, vec!["/a", "/b"]);
    assert_eq!(session.max_retry_attempts, 2);
    // Untouched values keep the file's or default value
    assert_eq!(session.client_id, "async_subscribe");
}

#[test]
fn test_effective_config_round_trips_through_toml() {
    let config = ClientConfig::default();

    let rendered = toml::to_string_pretty(&config).unwrap();
    let temp_file = write_config(&rendered);
    let reloaded = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(reloaded, config);
}
