//! Pure connection configuration for the MQTT transport
//!
//! This module turns the session configuration into rumqttc options. Nothing
//! here performs I/O.

use crate::config::{MqttSection, SessionConfig};
use rumqttc::{MqttOptions, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid client id: {0:?}")]
    InvalidClientId(String),
    #[error("Client request failed")]
    RequestFailed(#[source] rumqttc::ClientError),
    #[error("Transport driver is not running")]
    DriverStopped,
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(String),
}

/// Where and how to reach the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `tcp://`, `mqtt://`, `ssl://` and `mqtts://` URIs (pure function)
pub fn parse_broker_url(uri: &str) -> Result<BrokerAddress, MqttError> {
    let url = Url::parse(uri).map_err(|_| MqttError::InvalidBrokerUrl(uri.to_string()))?;

    let tls = match url.scheme() {
        "tcp" | "mqtt" => false,
        "ssl" | "mqtts" => true,
        _ => return Err(MqttError::InvalidBrokerUrl(uri.to_string())),
    };

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(uri.to_string()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Build rumqttc options from the session configuration
pub fn configure_mqtt_options(
    session: &SessionConfig,
    mqtt: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let address = parse_broker_url(&session.server_uri)?;

    // rumqttc panics on these rather than returning an error
    if session.client_id.is_empty() || session.client_id.starts_with(' ') {
        return Err(MqttError::InvalidClientId(session.client_id.clone()));
    }

    let mut mqtt_options = MqttOptions::new(&session.client_id, address.host, address.port);
    mqtt_options.set_clean_session(session.clean_session);
    mqtt_options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs));

    if address.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = mqtt.username() {
        let password = mqtt.password().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    Ok(mqtt_options)
}
