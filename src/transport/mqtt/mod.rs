//! rumqttc-backed MQTT transport
//!
//! The module separates pure functions from I/O the same way throughout:
//!
//! - [`connection`] - broker URL parsing and rumqttc option construction
//! - [`message_handler`] - routing of rumqttc events to session notifications
//! - [`client`] - the driver task and the [`Transport`](crate::transport::Transport) impl
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_resubscriber::config::ClientConfig;
//! use mqtt_resubscriber::transport::{event_channel, mqtt::MqttClient, Transport};
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::default();
//! let session = config.session_config()?;
//! let (events_tx, mut events_rx) = event_channel();
//!
//! let client = MqttClient::new(&session, &config.mqtt, events_tx).await?;
//! client.connect().await?;
//! let outcome = events_rx.recv().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, parse_broker_url, BrokerAddress, MqttError};
pub use message_handler::{EventRoute, MessageHandler};
