//! Session controller: subscriptions and message dispatch
//!
//! The controller never connects or disconnects. It only subscribes, through
//! a non-owning reference to the supervisor's transport, and hands arriving
//! messages to the host's [`MessageSink`].

use crate::config::SessionConfig;
use crate::transport::{InboundMessage, SubscribeAck, Transport};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receiver of every message the session delivers
///
/// `dispatch` runs on the session task and must not block.
pub trait MessageSink: Send + Sync {
    fn dispatch(&self, message: &InboundMessage);
}

/// Logs each message's topic and payload
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn dispatch(&self, message: &InboundMessage) {
        info!(
            topic = %message.topic,
            qos = ?message.qos,
            retain = message.retain,
            "{}",
            message.payload_str()
        );
    }
}

/// Forwards messages to a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<InboundMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<InboundMessage>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl MessageSink for ChannelSink {
    fn dispatch(&self, message: &InboundMessage) {
        match self.tx.try_send(message.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(topic = %dropped.topic, "Message channel full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                warn!(topic = %dropped.topic, "Message channel closed, dropping message");
            }
        }
    }
}

/// Action-result half of the session
pub struct SessionController<T: Transport> {
    transport: Weak<T>,
    config: Arc<SessionConfig>,
    sink: Arc<dyn MessageSink>,
}

impl<T: Transport> SessionController<T> {
    pub fn new(transport: Weak<T>, config: Arc<SessionConfig>, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            transport,
            config,
            sink,
        }
    }

    /// Submit one subscription per configured topic, in order
    ///
    /// Returns how many requests were accepted by the transport. Rejected
    /// requests are logged and not retried.
    pub async fn on_connected(&self) -> usize {
        let Some(transport) = self.transport.upgrade() else {
            warn!("Transport gone, cannot subscribe");
            return 0;
        };

        let mut submitted = 0;
        for subscription in self.config.subscriptions() {
            info!(
                topic = subscription.topic,
                qos = ?subscription.qos,
                client_id = %self.config.client_id,
                "Subscribing to topic"
            );
            match transport.subscribe(subscription.topic, subscription.qos).await {
                Ok(()) => submitted += 1,
                Err(e) => {
                    warn!(topic = subscription.topic, error = %e, "Subscribe request failed");
                }
            }
        }
        submitted
    }

    pub fn on_subscribe_ack(&self, ack: &SubscribeAck) {
        if ack.is_success() {
            info!(packet_id = ack.packet_id, granted = ?ack.granted, "Subscribe succeeded");
            return;
        }

        for (index, granted) in ack.granted.iter().enumerate() {
            if granted.is_none() {
                warn!(packet_id = ack.packet_id, filter = index, "Subscribe failed");
            }
        }
        if ack.granted.is_empty() {
            warn!(packet_id = ack.packet_id, "Subscribe failed: empty acknowledgement");
        }
    }

    pub fn on_message(&self, message: &InboundMessage) {
        debug!(topic = %message.topic, bytes = message.payload.len(), "Message arrived");
        self.sink.dispatch(message);
    }

    pub fn on_delivery_complete(&self, packet_id: u16) {
        debug!(packet_id, "Delivery complete");
    }
}
