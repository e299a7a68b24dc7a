//! Mock implementations for testing
//!
//! Provides a recording [`Transport`] and a recording [`MessageSink`] so the
//! supervisor, controller and session loop can be exercised without a broker.

use crate::config::SessionConfig;
use crate::session::MessageSink;
use crate::transport::{InboundMessage, Transport};
use async_trait::async_trait;
use rumqttc::QoS;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Calls the session made on the transport, in order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect,
    Subscribe { topic: String, qos: QoS },
    Disconnect,
}

#[derive(Debug, Error)]
#[error("Mock transport failure: {0}")]
pub struct MockTransportError(pub &'static str);

/// Mock transport for testing
///
/// Clones share the same call history, so a test can keep one clone and hand
/// the other to the session.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub calls: Arc<Mutex<Vec<TransportCall>>>,
    pub fail_connect: bool,
    pub fail_subscribe: bool,
    pub fail_disconnect: bool,
    pub hang_disconnect: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `connect()` cannot even start
    pub fn with_connect_failure() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    pub fn with_subscribe_failure() -> Self {
        Self {
            fail_subscribe: true,
            ..Default::default()
        }
    }

    pub fn with_disconnect_failure() -> Self {
        Self {
            fail_disconnect: true,
            ..Default::default()
        }
    }

    /// `disconnect()` never completes
    pub fn with_hanging_disconnect() -> Self {
        Self {
            hang_disconnect: true,
            ..Default::default()
        }
    }

    pub async fn get_calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    pub async fn connect_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Connect)).await
    }

    pub async fn disconnect_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Disconnect)).await
    }

    /// Subscribe calls as `(topic, qos)` pairs
    pub async fn get_subscriptions(&self) -> Vec<(String, QoS)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::Subscribe { topic, qos } => Some((topic.clone(), *qos)),
                _ => None,
            })
            .collect()
    }

    async fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|call| predicate(*call)).count()
    }

    async fn record(&self, call: TransportCall) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&self) -> Result<(), Self::Error> {
        if self.fail_connect {
            return Err(MockTransportError("connect could not start"));
        }
        self.record(TransportCall::Connect).await;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        self.record(TransportCall::Subscribe {
            topic: topic.to_string(),
            qos,
        })
        .await;
        if self.fail_subscribe {
            return Err(MockTransportError("subscribe rejected"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        self.record(TransportCall::Disconnect).await;
        if self.hang_disconnect {
            std::future::pending::<()>().await;
        }
        if self.fail_disconnect {
            return Err(MockTransportError("disconnect failed"));
        }
        Ok(())
    }
}

/// Sink that keeps every dispatched message
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    messages: Arc<std::sync::Mutex<Vec<InboundMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<InboundMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl MessageSink for RecordingSink {
    fn dispatch(&self, message: &InboundMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.clone());
        }
    }
}

/// Three topics, QoS 1, five retries, 2.5 s delay
pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        server_uri: "tcp://localhost:1883".to_string(),
        client_id: "test-subscriber".to_string(),
        topics: vec![
            "/home/temp/int/raw".to_string(),
            "/home/pressure/raw".to_string(),
            "/home/temp/ext/raw".to_string(),
        ],
        qos: QoS::AtLeastOnce,
        clean_session: false,
        max_retry_attempts: 5,
        retry_delay: Duration::from_millis(2500),
    }
}
