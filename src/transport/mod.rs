//! Transport capability consumed by the session
//!
//! The session core never speaks MQTT itself. It starts operations through
//! the [`Transport`] trait and learns their outcomes through
//! [`TransportEvent`]s delivered, in order, on the channel the transport was
//! constructed with.

use bytes::Bytes;
use rumqttc::QoS;
use tokio::sync::mpsc;

pub mod mqtt;

/// Capacity of the channel carrying transport notifications to the session
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Transport trait for the subscriber session
///
/// Every method only *starts* an operation; outcomes that the broker decides
/// (ConnAck, SubAck, connection loss) arrive later as events.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Begin a connection attempt
    ///
    /// Exactly one of [`TransportEvent::ConnectSucceeded`] or
    /// [`TransportEvent::ConnectFailed`] follows every `Ok` return. An `Err`
    /// means the attempt could not even be started.
    async fn connect(&self) -> Result<(), Self::Error>;

    /// Submit a subscription request; the broker's answer arrives as
    /// [`TransportEvent::SubscribeAcknowledged`]
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Disconnect from the broker, resolving once the disconnect completed
    async fn disconnect(&self) -> Result<(), Self::Error>;
}

/// Notifications produced by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The broker accepted the connection
    ConnectSucceeded,
    /// A connection attempt failed before the broker accepted it
    ConnectFailed { reason: String },
    /// An established connection dropped
    ConnectionLost { cause: String },
    /// A message was delivered on a subscribed topic
    MessageArrived(InboundMessage),
    /// The broker answered a subscription request
    SubscribeAcknowledged(SubscribeAck),
    /// An outgoing publish finished its QoS handshake
    DeliveryComplete { packet_id: u16 },
}

/// A message delivered by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
        }
    }

    /// Payload rendered for display; invalid UTF-8 is replaced, not rejected
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Broker response to a SUBSCRIBE request
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeAck {
    pub packet_id: u16,
    /// Granted QoS per requested filter, `None` where the broker refused it
    pub granted: Vec<Option<QoS>>,
}

impl SubscribeAck {
    pub fn is_success(&self) -> bool {
        !self.granted.is_empty() && self.granted.iter().all(Option::is_some)
    }
}

pub type EventSender = mpsc::Sender<TransportEvent>;
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// Create the channel a transport reports its events on
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Type alias for the rumqttc-backed transport
pub type MqttTransport = mqtt::MqttClient;
