//! Host-facing handle to a running session

use super::state::ConnectionState;
use crate::error::{SessionError, SessionResult};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

/// Upper bound on how long `request_shutdown` waits for the disconnect
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests the host can make of the session task
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Shutdown,
}

/// Handle returned by [`Session::start`](super::Session::start)
///
/// Dropping the handle without calling [`request_shutdown`](Self::request_shutdown)
/// also ends the session with a disconnect.
pub struct SessionHandle {
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    commands: mpsc::Sender<SessionCommand>,
    task: JoinHandle<SessionResult<()>>,
}

impl SessionHandle {
    pub(crate) fn new(
        state: watch::Receiver<ConnectionState>,
        shutdown: watch::Sender<bool>,
        commands: mpsc::Sender<SessionCommand>,
        task: JoinHandle<SessionResult<()>>,
    ) -> Self {
        Self {
            state,
            shutdown,
            commands,
            task,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch receiver for following state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Resolve once the session reaches Terminated on its own
    pub async fn terminated(&mut self) -> ConnectionState {
        let waited = self
            .state
            .wait_for(|state| state.is_terminated())
            .await
            .map(|state| *state);
        match waited {
            Ok(state) => state,
            // The session task is gone; whatever it last published is final
            Err(_) => *self.state.borrow(),
        }
    }

    /// Disconnect and end the session
    ///
    /// Waits at most [`SHUTDOWN_TIMEOUT`]. If the session already ended on its
    /// own, its outcome is returned instead.
    pub async fn request_shutdown(self) -> SessionResult<()> {
        self.request_shutdown_within(SHUTDOWN_TIMEOUT).await
    }

    pub async fn request_shutdown_within(mut self, timeout: Duration) -> SessionResult<()> {
        info!("Shutdown requested");
        self.shutdown.send_replace(true);

        if self.commands.send(SessionCommand::Shutdown).await.is_err() {
            debug!("Session task already finished");
        }

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                error!(?timeout, "Shutdown did not complete in time");
                self.task.abort();
                Err(SessionError::ShutdownTimeout(timeout))
            }
        }
    }

    /// Wait for the session task to end without asking it to
    pub async fn join(self) -> SessionResult<()> {
        flatten(self.task.await)
    }
}

fn flatten(joined: Result<SessionResult<()>, JoinError>) -> SessionResult<()> {
    joined.map_err(|e| SessionError::session_gone(e.to_string()))?
}
