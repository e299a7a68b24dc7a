//! Session configuration
//!
//! The session is described by a single immutable [`SessionConfig`] built once
//! at startup, either from a TOML file or from built-in defaults, optionally
//! overridden from the command line. Transport-only knobs (keep alive,
//! credentials) live in [`MqttSection`].

use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Top-level configuration file layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub mqtt: MqttSection,
}

/// `[session]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Broker URI, e.g. `tcp://localhost:1883`
    #[serde(default = "default_server_uri")]
    pub server_uri: String,
    /// Client identity presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Topics to subscribe to, in order
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    /// QoS level used for every subscription (0, 1 or 2)
    #[serde(default = "default_qos")]
    pub qos: u8,
    /// Discard prior session state on connect
    #[serde(default)]
    pub clean_session: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            server_uri: default_server_uri(),
            client_id: default_client_id(),
            topics: default_topics(),
            qos: default_qos(),
            clean_session: false,
        }
    }
}

/// `[retry]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Connect failures tolerated before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed pause before each reconnect attempt
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

/// `[mqtt]` table - transport options that the session core never reads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Keep alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive(),
            username_env: None,
            password_env: None,
        }
    }
}

fn default_server_uri() -> String {
    "tcp://localhost:1883".to_string()
}

fn default_client_id() -> String {
    "async_subscribe".to_string()
}

fn default_topics() -> Vec<String> {
    vec![
        "/home/temp/int/raw".to_string(),
        "/home/pressure/raw".to_string(),
        "/home/temp/ext/raw".to_string(),
    ]
}

fn default_qos() -> u8 {
    1
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    2500
}

fn default_keep_alive() -> u64 {
    20
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid server URI: {0}")]
    InvalidServerUri(String),
    #[error("Invalid QoS level {0}: must be 0, 1 or 2")]
    InvalidQos(u8),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Values supplied on the command line that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_uri: Option<String>,
    pub client_id: Option<String>,
    pub topics: Vec<String>,
    pub qos: Option<u8>,
    pub max_attempts: Option<u32>,
}

impl ClientConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides; repeated `--topic` flags replace the topic list
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(server_uri) = overrides.server_uri {
            self.session.server_uri = server_uri;
        }
        if let Some(client_id) = overrides.client_id {
            self.session.client_id = client_id;
        }
        if !overrides.topics.is_empty() {
            self.session.topics = overrides.topics;
        }
        if let Some(qos) = overrides.qos {
            self.session.qos = qos;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.retry.max_attempts = max_attempts;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if session.client_id.is_empty() || session.client_id.starts_with(char::is_whitespace) {
            return Err(ConfigError::InvalidConfig(
                "client_id must not be empty or start with whitespace".to_string(),
            ));
        }
        if session.topics.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one topic is required".to_string(),
            ));
        }
        if let Some(index) = session.topics.iter().position(|t| t.is_empty()) {
            return Err(ConfigError::InvalidConfig(format!(
                "topic #{index} is empty"
            )));
        }
        qos_from_level(session.qos)?;
        validate_server_uri(&session.server_uri)?;

        // rumqttc asserts on short non-zero keep alive intervals
        if (1..5).contains(&self.mqtt.keep_alive_secs) {
            return Err(ConfigError::InvalidConfig(
                "mqtt.keep_alive_secs must be 0 or at least 5".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the immutable session record shared by the supervisor and controller
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        self.validate()?;
        Ok(SessionConfig {
            server_uri: self.session.server_uri.clone(),
            client_id: self.session.client_id.clone(),
            topics: self.session.topics.clone(),
            qos: qos_from_level(self.session.qos)?,
            clean_session: self.session.clean_session,
            max_retry_attempts: self.retry.max_attempts,
            retry_delay: Duration::from_millis(self.retry.delay_ms),
        })
    }
}

impl MqttSection {
    /// Get MQTT username from environment variable
    pub fn username(&self) -> Option<String> {
        get_env_var_optional(self.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn password(&self) -> Option<String> {
        get_env_var_optional(self.password_env.as_ref())
    }
}

fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}

/// Immutable description of the session every component reads from
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub server_uri: String,
    pub client_id: String,
    pub topics: Vec<String>,
    pub qos: QoS,
    pub clean_session: bool,
    pub max_retry_attempts: u32,
    pub retry_delay: Duration,
}

impl SessionConfig {
    /// Subscription records in configuration order
    pub fn subscriptions(&self) -> impl Iterator<Item = Subscription<'_>> + '_ {
        self.topics.iter().map(move |topic| Subscription {
            topic,
            qos: self.qos,
        })
    }
}

/// One topic paired with the QoS it is subscribed at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subscription<'a> {
    pub topic: &'a str,
    pub qos: QoS,
}

/// Map an integer QoS level onto the protocol enum
pub fn qos_from_level(level: u8) -> Result<QoS, ConfigError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ConfigError::InvalidQos(other)),
    }
}

const SUPPORTED_SCHEMES: [&str; 4] = ["tcp", "mqtt", "ssl", "mqtts"];

fn validate_server_uri(uri: &str) -> Result<(), ConfigError> {
    let url = Url::parse(uri).map_err(|e| ConfigError::InvalidServerUri(format!("{uri}: {e}")))?;

    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(ConfigError::InvalidServerUri(format!(
            "{uri}: unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidServerUri(format!("{uri}: missing host")));
    }

    Ok(())
}
