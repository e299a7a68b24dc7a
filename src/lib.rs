//! MQTT Resubscriber - Rust Implementation
//!
//! A long-running MQTT subscriber that keeps a durable session alive across
//! broker outages.
//!
//! # Overview
//!
//! This crate provides:
//! - A connection supervisor with bounded, fixed-delay retry
//! - A session controller that (re-)subscribes on every connect and forwards
//!   messages to a host-supplied sink
//! - A rumqttc-backed transport that never reconnects on its own
//! - TOML configuration and structured logging
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_resubscriber::session::{ReconnectionDecision, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//!
//! // Five failures are tolerated, each followed by the same 2.5 s pause
//! assert_eq!(
//!     policy.decide(5, false),
//!     ReconnectionDecision::Proceed { delay: Duration::from_millis(2500) }
//! );
//!
//! // The sixth ends the session
//! assert_eq!(policy.decide(6, false), ReconnectionDecision::AbortMaxAttemptsExceeded);
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ClientConfig, ConfigError, Overrides, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use session::{
    ChannelSink, ConnectionState, LogSink, MessageSink, Session, SessionHandle,
};
pub use transport::mqtt::MqttClient;
pub use transport::{InboundMessage, Transport, TransportEvent};
