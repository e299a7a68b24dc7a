//! Pure connection state and retry decisions
//!
//! Nothing in this module performs I/O; the supervisor asks it what to do and
//! then does it.

use crate::config::SessionConfig;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Connection state owned by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing started yet
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Broker accepted the connection
    Connected,
    /// Waiting to retry, or retrying, after a failure or loss
    Reconnecting,
    /// Session over; no transition leaves this state
    Terminated,
}

impl ConnectionState {
    pub fn is_terminated(self) -> bool {
        matches!(self, ConnectionState::Terminated)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Bounded retry with a fixed delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures tolerated before giving up
    pub max_attempts: u32,
    /// Pause before every reconnect attempt
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            delay: config.retry_delay,
        }
    }

    /// Decide what to do after `failures` consecutive failed attempts (pure function)
    ///
    /// A lost connection is decided with `failures == 0`, so it always gets a retry.
    pub fn decide(&self, failures: u32, shutdown_requested: bool) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if failures > self.max_attempts {
            return ReconnectionDecision::AbortMaxAttemptsExceeded;
        }

        ReconnectionDecision::Proceed { delay: self.delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(2500),
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectionDecision {
    /// Reconnect after `delay`
    Proceed { delay: Duration },
    /// Shutdown requested, stay quiet
    AbortShutdownRequested,
    /// Retry budget spent
    AbortMaxAttemptsExceeded,
}

/// Log connection state transition
pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
    match (from, to) {
        (_, ConnectionState::Connected) if from != ConnectionState::Connected => {
            info!("Connection success");
        }
        (ConnectionState::Connected, ConnectionState::Reconnecting) => {
            warn!("Connection lost, reconnecting");
        }
        (_, ConnectionState::Reconnecting) => {
            info!("Reconnecting...");
        }
        (_, ConnectionState::Terminated) => {
            info!(from = %from, "Session terminated");
        }
        _ => {
            info!("Connection state: {} -> {}", from, to);
        }
    }
}
