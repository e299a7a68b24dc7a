//! Impure I/O operations for the MQTT transport
//!
//! [`MqttClient`] owns a rumqttc [`AsyncClient`] and a driver task that polls
//! the rumqttc event loop. The driver only polls between a `connect()` request
//! and the end of that connection, so rumqttc never reconnects on its own:
//! reconnect timing belongs to the session supervisor.

use super::connection::{configure_mqtt_options, MqttError};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::{MqttSection, SessionConfig};
use crate::transport::{EventSender, Transport, TransportEvent};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// Smallest capacity of rumqttc's request queue
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Room for two rounds of subscriptions plus a DISCONNECT
///
/// Subscriptions submitted just before a connection drops stay queued until
/// the next connection, when a second round joins them.
fn request_capacity(topic_count: usize) -> usize {
    REQUEST_CHANNEL_CAPACITY.max(topic_count * 2 + 1)
}

type DisconnectReply = oneshot::Sender<Result<(), MqttError>>;

enum DriverCommand {
    Connect,
    Disconnect(DisconnectReply),
}

/// rumqttc-backed implementation of [`Transport`]
pub struct MqttClient {
    client: AsyncClient,
    commands: mpsc::Sender<DriverCommand>,
    driver_handle: JoinHandle<()>,
}

impl MqttClient {
    /// Build the client and spawn its driver task; events are reported on `events`
    pub async fn new(
        session: &SessionConfig,
        mqtt: &MqttSection,
        events: EventSender,
    ) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(session, mqtt)?;
        let (client, event_loop) =
            AsyncClient::new(mqtt_options, request_capacity(session.topics.len()));
        let (commands_tx, commands_rx) = mpsc::channel(4);

        let driver = EventLoopDriver {
            event_loop,
            client: client.clone(),
            commands: commands_rx,
            events,
            backlog: VecDeque::new(),
        };
        let span = crate::mqtt_span!(client_id = %session.client_id, server_uri = %session.server_uri);
        let driver_handle = tokio::spawn(driver.run().instrument(span));

        Ok(MqttClient {
            client,
            commands: commands_tx,
            driver_handle,
        })
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&self) -> Result<(), Self::Error> {
        self.commands
            .send(DriverCommand::Connect)
            .await
            .map_err(|_| MqttError::DriverStopped)
    }

    // Never waits for queue space; the queue only drains while a connection
    // is being polled.
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        self.client
            .try_subscribe(topic, qos)
            .map_err(MqttError::RequestFailed)
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(DriverCommand::Disconnect(reply_tx))
            .await
            .map_err(|_| MqttError::DriverStopped)?;
        reply_rx.await.map_err(|_| MqttError::DriverStopped)?
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        self.driver_handle.abort();
    }
}

/// Owns the rumqttc event loop and translates its events
///
/// Events wait in `backlog` until the session has room for them. The driver
/// keeps polling rumqttc and serving commands meanwhile, so a session that is
/// busy submitting requests never stalls the connection.
struct EventLoopDriver {
    event_loop: EventLoop,
    client: AsyncClient,
    commands: mpsc::Receiver<DriverCommand>,
    events: EventSender,
    backlog: VecDeque<TransportEvent>,
}

impl EventLoopDriver {
    async fn run(mut self) {
        debug!(target: "mqtt_transport", "MQTT transport driver started");

        loop {
            let command = tokio::select! {
                command = self.commands.recv() => command,

                permit = self.events.reserve(), if !self.backlog.is_empty() => {
                    if !forward(&mut self.backlog, permit) {
                        break;
                    }
                    continue;
                }
            };

            match command {
                Some(DriverCommand::Connect) => {
                    if !self.drive_connection().await {
                        break;
                    }
                }
                Some(DriverCommand::Disconnect(reply)) => {
                    debug!(target: "mqtt_transport", "Disconnect requested while idle");
                    let _ = reply.send(Ok(()));
                }
                None => break,
            }
        }

        debug!(target: "mqtt_transport", "MQTT transport driver stopped");
    }

    /// Poll one connection from CONNECT until it ends
    /// Returns false when the driver should stop altogether
    async fn drive_connection(&mut self) -> bool {
        let mut connected = false;
        let mut pending_disconnect: Option<DisconnectReply> = None;

        loop {
            tokio::select! {
                command = self.commands.recv(), if pending_disconnect.is_none() => {
                    match command {
                        Some(DriverCommand::Connect) => {
                            debug!(target: "mqtt_transport", "Connect requested while an attempt is active, ignoring");
                        }
                        Some(DriverCommand::Disconnect(reply)) if !connected => {
                            debug!(target: "mqtt_transport", "Disconnect requested before ConnAck, abandoning attempt");
                            let _ = reply.send(Ok(()));
                            return true;
                        }
                        Some(DriverCommand::Disconnect(reply)) => {
                            // The event loop is not polled while this branch runs, so
                            // the request must not wait for queue space.
                            match self.client.try_disconnect() {
                                Ok(()) => pending_disconnect = Some(reply),
                                Err(e) => {
                                    let _ = reply.send(Err(MqttError::RequestFailed(e)));
                                    return true;
                                }
                            }
                        }
                        None => return false,
                    }
                }

                permit = self.events.reserve(), if !self.backlog.is_empty() => {
                    if !forward(&mut self.backlog, permit) {
                        return false;
                    }
                }

                polled = self.event_loop.poll() => {
                    match polled {
                        Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                            EventRoute::ConnectionAcknowledged => {
                                connected = true;
                                self.backlog.push_back(TransportEvent::ConnectSucceeded);
                            }
                            EventRoute::MessageReceived(message) => {
                                self.backlog.push_back(TransportEvent::MessageArrived(message));
                            }
                            EventRoute::SubscriptionConfirmed(ack) => {
                                self.backlog.push_back(TransportEvent::SubscribeAcknowledged(ack));
                            }
                            EventRoute::DeliveryComplete { packet_id } => {
                                self.backlog.push_back(TransportEvent::DeliveryComplete { packet_id });
                            }
                            EventRoute::DisconnectSent => {
                                if let Some(reply) = pending_disconnect.take() {
                                    let _ = reply.send(Ok(()));
                                }
                                info!(target: "mqtt_transport", "DISCONNECT sent to broker");
                                return true;
                            }
                            EventRoute::InfrastructureEvent(event_str) => {
                                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                            }
                            EventRoute::OutgoingEvent => {}
                        },
                        Err(error) => {
                            if let Some(reply) = pending_disconnect.take() {
                                let _ = reply.send(Err(MqttError::DisconnectFailed(error.to_string())));
                                return true;
                            }

                            let event = if connected {
                                TransportEvent::ConnectionLost { cause: error.to_string() }
                            } else {
                                TransportEvent::ConnectFailed { reason: error.to_string() }
                            };
                            self.backlog.push_back(event);
                            return true;
                        }
                    }
                }
            }
        }
    }
}

/// Hand the oldest buffered event to the session; false once nobody is listening
fn forward(
    backlog: &mut VecDeque<TransportEvent>,
    permit: Result<mpsc::Permit<'_, TransportEvent>, mpsc::error::SendError<()>>,
) -> bool {
    match permit {
        Ok(permit) => {
            if let Some(event) = backlog.pop_front() {
                permit.send(event);
            }
            true
        }
        Err(_) => {
            warn!(target: "mqtt_transport", "Session event channel closed, stopping driver");
            false
        }
    }
}
