//! Pure routing of rumqttc events
//!
//! The driver task polls the rumqttc event loop and hands every event to
//! [`MessageHandler::route_mqtt_event`], which decides what, if anything, the
//! session needs to hear about.

use crate::transport::{InboundMessage, SubscribeAck};
use rumqttc::{Event, Outgoing, Packet, SubscribeReasonCode};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived(InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                    qos: publish.qos,
                    retain: publish.retain,
                }),
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed(SubscribeAck {
                    packet_id: suback.pkid,
                    granted: suback
                        .return_codes
                        .iter()
                        .map(Self::granted_qos)
                        .collect(),
                }),
                Packet::PubAck(puback) => EventRoute::DeliveryComplete {
                    packet_id: puback.pkid,
                },
                Packet::PubComp(pubcomp) => EventRoute::DeliveryComplete {
                    packet_id: pubcomp.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    fn granted_qos(code: &SubscribeReasonCode) -> Option<rumqttc::QoS> {
        match code {
            SubscribeReasonCode::Success(qos) => Some(*qos),
            SubscribeReasonCode::Failure => None,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged by the broker
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived(InboundMessage),
    /// Subscription answered by the broker
    SubscriptionConfirmed(SubscribeAck),
    /// Outgoing publish acknowledged
    DeliveryComplete { packet_id: u16 },
    /// Our DISCONNECT has been written to the socket
    DisconnectSent,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}
