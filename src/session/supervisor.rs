//! Connection supervisor
//!
//! Owns the connection state and the retry counter, and is the only component
//! that asks the transport to connect or disconnect. Each handler runs to
//! completion on the session task before the next event is looked at.

use super::state::{log_state_transition, ConnectionState, ReconnectionDecision, RetryPolicy};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::transport::Transport;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Lifecycle half of the session
pub struct ConnectionSupervisor<T: Transport> {
    transport: Arc<T>,
    config: Arc<SessionConfig>,
    policy: RetryPolicy,
    retry_count: u32,
    attempt_in_flight: bool,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn new(
        transport: T,
        config: Arc<SessionConfig>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport: Arc::new(transport),
            policy: RetryPolicy::from_config(&config),
            config,
            retry_count: 0,
            attempt_in_flight: false,
            state_tx,
            shutdown_rx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Read-only view of the connection state
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Consecutive failed attempts since the last success or loss
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Non-owning handle to the transport for the controller
    pub fn transport_ref(&self) -> Weak<T> {
        Arc::downgrade(&self.transport)
    }

    /// Begin the first connection attempt
    ///
    /// Fails only when the transport cannot even start connecting; the
    /// session is then Terminated.
    pub async fn start(&mut self) -> SessionResult<()> {
        info!(server_uri = %self.config.server_uri, "Connecting to the MQTT server...");
        self.transition(ConnectionState::Connecting);

        if let Err(e) = self.issue_connect().await {
            error!(server_uri = %self.config.server_uri, error = %e, "Unable to start connecting");
            self.transition(ConnectionState::Terminated);
            return Err(SessionError::connect_start(&self.config.server_uri, e));
        }
        Ok(())
    }

    /// Returns true when the controller should (re-)subscribe
    pub fn on_connect_success(&mut self) -> bool {
        if self.state().is_terminated() {
            debug!("Connect success after termination, ignoring");
            return false;
        }

        self.attempt_in_flight = false;
        self.retry_count = 0;
        self.transition(ConnectionState::Connected);
        true
    }

    /// Count the failure, then either retry after the delay or give up
    pub async fn on_connect_failure(&mut self, reason: &str) -> SessionResult<()> {
        if self.state().is_terminated() {
            debug!(reason, "Connect failure after termination, ignoring");
            return Ok(());
        }

        self.attempt_in_flight = false;
        self.retry_count = self.retry_count.saturating_add(1);
        warn!(
            reason,
            attempt = self.retry_count,
            max_attempts = self.policy.max_attempts,
            "Connection attempt failed"
        );

        match self.policy.decide(self.retry_count, self.shutdown_requested()) {
            ReconnectionDecision::Proceed { delay } => {
                self.transition(ConnectionState::Reconnecting);
                self.reconnect_after(delay).await
            }
            ReconnectionDecision::AbortShutdownRequested => {
                debug!("Shutdown requested, not retrying");
                Ok(())
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                error!(attempts = self.retry_count, "Giving up on the MQTT server");
                self.transition(ConnectionState::Terminated);
                Err(SessionError::RetriesExhausted {
                    attempts: self.retry_count,
                })
            }
        }
    }

    /// Reconnect with a fresh retry budget; ignored unless Connected
    pub async fn on_connection_lost(&mut self, cause: &str) -> SessionResult<()> {
        if self.state() != ConnectionState::Connected {
            debug!(cause, state = %self.state(), "Connection lost outside Connected, ignoring");
            return Ok(());
        }

        warn!(cause, "Connection lost");
        self.retry_count = 0;
        self.transition(ConnectionState::Reconnecting);

        match self.policy.decide(self.retry_count, self.shutdown_requested()) {
            ReconnectionDecision::Proceed { delay } => self.reconnect_after(delay).await,
            ReconnectionDecision::AbortShutdownRequested => {
                debug!("Shutdown requested, not reconnecting");
                Ok(())
            }
            // Unreachable with a zero count and max_attempts >= 1
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                self.transition(ConnectionState::Terminated);
                Err(SessionError::RetriesExhausted { attempts: 0 })
            }
        }
    }

    /// Disconnect and terminate; returns the disconnect outcome
    ///
    /// A second call after termination does nothing.
    pub async fn stop(&mut self) -> SessionResult<()> {
        if self.state().is_terminated() {
            return Ok(());
        }

        info!("Disconnecting from the MQTT server...");
        let outcome = self.transport.disconnect().await;
        self.attempt_in_flight = false;
        self.transition(ConnectionState::Terminated);

        match outcome {
            Ok(()) => {
                info!("Disconnected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Disconnect failed");
                Err(SessionError::disconnect(e))
            }
        }
    }

    /// Terminate without talking to the transport
    pub fn terminate(&mut self) {
        self.attempt_in_flight = false;
        self.transition(ConnectionState::Terminated);
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    async fn reconnect_after(&mut self, delay: Duration) -> SessionResult<()> {
        if !self.interruptible_sleep(delay).await {
            debug!("Shutdown requested during retry delay, reconnect abandoned");
            return Ok(());
        }

        info!(attempt = self.retry_count + 1, "Reconnecting...");
        if let Err(e) = self.issue_connect().await {
            error!(error = %e, "Unable to issue reconnect");
            self.transition(ConnectionState::Terminated);
            return Err(SessionError::reconnect(e));
        }
        Ok(())
    }

    async fn issue_connect(&mut self) -> Result<(), T::Error> {
        if self.attempt_in_flight {
            debug!("Connection attempt already outstanding");
            return Ok(());
        }
        self.transport.connect().await?;
        self.attempt_in_flight = true;
        Ok(())
    }

    /// Sleep for `delay`; false when shutdown was requested first
    async fn interruptible_sleep(&mut self, delay: Duration) -> bool {
        if *self.shutdown_rx.borrow_and_update() {
            return false;
        }

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = self.shutdown_rx.changed() => match changed {
                    Ok(()) => {
                        if *self.shutdown_rx.borrow_and_update() {
                            return false;
                        }
                    }
                    // Nobody can request shutdown any more
                    Err(_) => {
                        (&mut sleep).await;
                        return true;
                    }
                },
            }
        }
    }

    /// Move to `to` unless Terminated
    fn transition(&mut self, to: ConnectionState) {
        let from = self.state();
        if from.is_terminated() || from == to {
            return;
        }
        self.state_tx.send_replace(to);
        log_state_transition(from, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{test_session_config, MockTransport, TransportCall};

    fn supervisor_with(
        transport: MockTransport,
    ) -> (ConnectionSupervisor<MockTransport>, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor =
            ConnectionSupervisor::new(transport, Arc::new(test_session_config()), shutdown_rx);
        (supervisor, shutdown_tx)
    }

    #[tokio::test]
    async fn test_start_issues_one_connect() {
        let transport = MockTransport::new();
        let (mut supervisor, _shutdown) = supervisor_with(transport.clone());

        supervisor.start().await.unwrap();

        assert_eq!(supervisor.state(), ConnectionState::Connecting);
        assert_eq!(transport.get_calls().await, vec![TransportCall::Connect]);
    }

    #[tokio::test]
    async fn test_start_failure_terminates() {
        let transport = MockTransport::with_connect_failure();
        let (mut supervisor, _shutdown) = supervisor_with(transport);

        let result = supervisor.start().await;

        assert!(matches!(result, Err(SessionError::ConnectStart { .. })));
        assert_eq!(supervisor.state(), ConnectionState::Terminated);
    }

    #[tokio::test]
    async fn test_connect_success_resets_counter() {
        let (mut supervisor, _shutdown) = supervisor_with(MockTransport::new());
        supervisor.start().await.unwrap();
        supervisor.retry_count = 3;

        assert!(supervisor.on_connect_success());
        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert_eq!(supervisor.retry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_waits_fixed_delay_then_reconnects() {
        let transport = MockTransport::new();
        let (mut supervisor, _shutdown) = supervisor_with(transport.clone());
        supervisor.start().await.unwrap();

        let before = tokio::time::Instant::now();
        supervisor.on_connect_failure("refused").await.unwrap();

        assert!(before.elapsed() >= Duration::from_millis(2500));
        assert_eq!(supervisor.state(), ConnectionState::Reconnecting);
        assert_eq!(supervisor.retry_count(), 1);
        assert_eq!(transport.connect_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_past_max_is_fatal() {
        let transport = MockTransport::new();
        let (mut supervisor, _shutdown) = supervisor_with(transport.clone());
        supervisor.start().await.unwrap();

        for _ in 0..5 {
            supervisor.on_connect_failure("refused").await.unwrap();
        }
        assert_eq!(supervisor.state(), ConnectionState::Reconnecting);

        let result = supervisor.on_connect_failure("refused").await;

        assert!(matches!(
            result,
            Err(SessionError::RetriesExhausted { attempts: 6 })
        ));
        assert_eq!(supervisor.state(), ConnectionState::Terminated);
        // One initial connect plus five retries
        assert_eq!(transport.connect_count().await, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_resets_counter() {
        let transport = MockTransport::new();
        let (mut supervisor, _shutdown) = supervisor_with(transport.clone());
        supervisor.start().await.unwrap();
        supervisor.on_connect_failure("refused").await.unwrap();
        supervisor.on_connect_success();

        supervisor.on_connection_lost("network").await.unwrap();

        assert_eq!(supervisor.retry_count(), 0);
        assert_eq!(supervisor.state(), ConnectionState::Reconnecting);
        assert_eq!(transport.connect_count().await, 3);
    }

    #[tokio::test]
    async fn test_connection_lost_ignored_unless_connected() {
        let transport = MockTransport::new();
        let (mut supervisor, _shutdown) = supervisor_with(transport.clone());
        supervisor.start().await.unwrap();

        supervisor.on_connection_lost("network").await.unwrap();

        assert_eq!(supervisor.state(), ConnectionState::Connecting);
        assert_eq!(transport.connect_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_retry_delay() {
        let transport = MockTransport::new();
        let (mut supervisor, shutdown_tx) = supervisor_with(transport.clone());
        supervisor.start().await.unwrap();

        let flag = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            shutdown_tx.send_replace(true);
            shutdown_tx
        });

        let before = tokio::time::Instant::now();
        supervisor.on_connect_failure("refused").await.unwrap();

        assert!(before.elapsed() < Duration::from_millis(2500));
        assert_eq!(transport.connect_count().await, 1);
        let _shutdown_tx = flag.await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_after_shutdown_flag_does_not_retry() {
        let transport = MockTransport::new();
        let (mut supervisor, shutdown_tx) = supervisor_with(transport.clone());
        supervisor.start().await.unwrap();
        shutdown_tx.send_replace(true);

        supervisor.on_connect_failure("refused").await.unwrap();

        assert_eq!(transport.connect_count().await, 1);
    }

    #[tokio::test]
    async fn test_stop_disconnects_and_terminates() {
        let transport = MockTransport::new();
        let (mut supervisor, _shutdown) = supervisor_with(transport.clone());
        supervisor.start().await.unwrap();
        supervisor.on_connect_success();

        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();

        assert_eq!(supervisor.state(), ConnectionState::Terminated);
        assert_eq!(transport.disconnect_count().await, 1);
    }

    #[tokio::test]
    async fn test_stop_failure_still_terminates() {
        let transport = MockTransport::with_disconnect_failure();
        let (mut supervisor, _shutdown) = supervisor_with(transport);
        supervisor.start().await.unwrap();

        let result = supervisor.stop().await;

        assert!(matches!(result, Err(SessionError::Disconnect(_))));
        assert_eq!(supervisor.state(), ConnectionState::Terminated);
    }

    #[tokio::test]
    async fn test_terminated_is_absorbing() {
        let transport = MockTransport::new();
        let (mut supervisor, _shutdown) = supervisor_with(transport.clone());
        supervisor.start().await.unwrap();
        supervisor.stop().await.unwrap();

        assert!(!supervisor.on_connect_success());
        supervisor.on_connect_failure("late").await.unwrap();
        supervisor.on_connection_lost("late").await.unwrap();

        assert_eq!(supervisor.state(), ConnectionState::Terminated);
        assert_eq!(transport.connect_count().await, 1);
    }

    #[tokio::test]
    async fn test_state_watch_sees_transitions() {
        let (mut supervisor, _shutdown) = supervisor_with(MockTransport::new());
        let state_rx = supervisor.subscribe_state();
        assert_eq!(*state_rx.borrow(), ConnectionState::Disconnected);

        supervisor.start().await.unwrap();
        supervisor.on_connect_success();

        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);
    }
}
