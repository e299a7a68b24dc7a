//! Resilient subscriber session
//!
//! A [`Session`] wires a [`ConnectionSupervisor`] and a [`SessionController`]
//! to one transport and runs them on a single task. Transport events are
//! handled strictly in arrival order:
//!
//! - lifecycle events (connect success or failure, connection loss) go to the
//!   supervisor
//! - subscription acknowledgements, messages and delivery notices go to the
//!   controller
//!
//! ```rust,no_run
//! use mqtt_resubscriber::config::ClientConfig;
//! use mqtt_resubscriber::session::{LogSink, Session};
//! use mqtt_resubscriber::transport::{event_channel, MqttTransport};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::default();
//! let session_config = config.session_config()?;
//! let (events_tx, events_rx) = event_channel();
//! let transport = MqttTransport::new(&session_config, &config.mqtt, events_tx).await?;
//!
//! let handle = Session::new(session_config, transport, events_rx, Arc::new(LogSink))
//!     .start()
//!     .await?;
//! handle.request_shutdown().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod controller;
pub mod handle;
pub mod state;
pub mod supervisor;

pub use controller::{ChannelSink, LogSink, MessageSink, SessionController};
pub use handle::{SessionHandle, SHUTDOWN_TIMEOUT};
pub use state::{ConnectionState, ReconnectionDecision, RetryPolicy};
pub use supervisor::ConnectionSupervisor;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::transport::{EventReceiver, Transport, TransportEvent};
use handle::SessionCommand;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, Instrument};

/// A subscriber session that has not been started yet
pub struct Session<T: Transport + 'static> {
    supervisor: ConnectionSupervisor<T>,
    controller: SessionController<T>,
    events: EventReceiver,
    shutdown_tx: watch::Sender<bool>,
    client_id: String,
}

impl<T: Transport + 'static> Session<T> {
    /// `events` must be the receiving end of the channel `transport` reports on
    pub fn new(
        config: SessionConfig,
        transport: T,
        events: EventReceiver,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        let config = Arc::new(config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = ConnectionSupervisor::new(transport, config.clone(), shutdown_rx);
        let controller = SessionController::new(supervisor.transport_ref(), config.clone(), sink);

        Self {
            supervisor,
            controller,
            events,
            shutdown_tx,
            client_id: config.client_id.clone(),
        }
    }

    /// Start connecting and hand the session over to its own task
    ///
    /// Fails without spawning anything when the first connect cannot start.
    pub async fn start(mut self) -> SessionResult<SessionHandle> {
        self.supervisor.start().await?;

        let state_rx = self.supervisor.subscribe_state();
        let shutdown_tx = self.shutdown_tx.clone();
        let (commands_tx, commands_rx) = mpsc::channel(4);
        let span = crate::session_span!(client_id = %self.client_id);
        let task = tokio::spawn(self.run(commands_rx).instrument(span));

        Ok(SessionHandle::new(state_rx, shutdown_tx, commands_tx, task))
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> SessionResult<()> {
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Shutdown) => {}
                        None => debug!("Session handle dropped, stopping"),
                    }
                    return self.supervisor.stop().await;
                }

                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => {
                        self.supervisor.terminate();
                        return Err(SessionError::TransportClosed);
                    }
                },
            }
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) -> SessionResult<()> {
        match event {
            TransportEvent::ConnectSucceeded => {
                if self.supervisor.on_connect_success() {
                    self.controller.on_connected().await;
                }
            }
            TransportEvent::ConnectFailed { reason } => {
                self.supervisor.on_connect_failure(&reason).await?;
            }
            TransportEvent::ConnectionLost { cause } => {
                self.supervisor.on_connection_lost(&cause).await?;
            }
            TransportEvent::MessageArrived(message) => self.controller.on_message(&message),
            TransportEvent::SubscribeAcknowledged(ack) => self.controller.on_subscribe_ack(&ack),
            TransportEvent::DeliveryComplete { packet_id } => {
                self.controller.on_delivery_complete(packet_id)
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{test_session_config, MockTransport, RecordingSink};
    use crate::transport::{event_channel, EventSender, InboundMessage};
    use rumqttc::QoS;
    use std::time::Duration;

    async fn started(
        transport: MockTransport,
        sink: RecordingSink,
    ) -> (SessionHandle, EventSender) {
        let (events_tx, events_rx) = event_channel();
        let handle = Session::new(test_session_config(), transport, events_rx, Arc::new(sink))
            .start()
            .await
            .unwrap();
        (handle, events_tx)
    }

    async fn wait_for_state(handle: &SessionHandle, wanted: ConnectionState) {
        let mut state_rx = handle.state_receiver();
        tokio::time::timeout(Duration::from_secs(5), state_rx.wait_for(|s| *s == wanted))
            .await
            .expect("state not reached in time")
            .expect("session dropped its state");
    }

    #[tokio::test]
    async fn test_start_failure_spawns_nothing() {
        let (_events_tx, events_rx) = event_channel();
        let result = Session::new(
            test_session_config(),
            MockTransport::with_connect_failure(),
            events_rx,
            Arc::new(LogSink),
        )
        .start()
        .await;

        assert!(matches!(result, Err(SessionError::ConnectStart { .. })));
    }

    #[tokio::test]
    async fn test_connect_success_subscribes() {
        let transport = MockTransport::new();
        let (handle, events_tx) = started(transport.clone(), RecordingSink::new()).await;

        events_tx.send(TransportEvent::ConnectSucceeded).await.unwrap();
        wait_for_state(&handle, ConnectionState::Connected).await;
        handle.request_shutdown().await.unwrap();

        assert_eq!(transport.get_subscriptions().await.len(), 3);
    }

    #[tokio::test]
    async fn test_message_reaches_sink() {
        let sink = RecordingSink::new();
        let (handle, events_tx) = started(MockTransport::new(), sink.clone()).await;
        let message = InboundMessage::new("/home/temp/int/raw", "21.5", QoS::AtLeastOnce);

        events_tx.send(TransportEvent::ConnectSucceeded).await.unwrap();
        events_tx
            .send(TransportEvent::MessageArrived(message.clone()))
            .await
            .unwrap();
        drop(events_tx);

        // The closed event stream ends the session after every queued event
        let result = handle.join().await;

        assert!(matches!(result, Err(SessionError::TransportClosed)));
        assert_eq!(sink.messages(), vec![message]);
    }

    #[tokio::test]
    async fn test_request_shutdown_terminates() {
        let transport = MockTransport::new();
        let (handle, _events_tx) = started(transport.clone(), RecordingSink::new()).await;
        let state_rx = handle.state_receiver();

        handle.request_shutdown().await.unwrap();

        assert_eq!(*state_rx.borrow(), ConnectionState::Terminated);
        assert_eq!(transport.disconnect_count().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_disconnects() {
        let transport = MockTransport::new();
        let (handle, _events_tx) = started(transport.clone(), RecordingSink::new()).await;
        let mut state_rx = handle.state_receiver();

        drop(handle);

        tokio::time::timeout(
            Duration::from_secs(5),
            state_rx.wait_for(|s| s.is_terminated()),
        )
        .await
        .expect("session should terminate")
        .expect("state published before the task ended");
        assert_eq!(transport.disconnect_count().await, 1);
    }
}
