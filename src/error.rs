//! Session error types
//!
//! Every transport failure is converted into a [`SessionError`] at the point
//! where the supervisor or controller calls into the transport. Nothing past
//! that boundary sees a raw transport error.

use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unrecovered failures that end the session with a non-zero exit status
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Unable to start connecting to {server_uri}")]
    ConnectStart {
        server_uri: String,
        #[source]
        source: BoxError,
    },

    #[error("Connection attempts exhausted after {attempts} failures")]
    RetriesExhausted { attempts: u32 },

    #[error("Unable to issue reconnect")]
    Reconnect(#[source] BoxError),

    #[error("Disconnect failed")]
    Disconnect(#[source] BoxError),

    #[error("Disconnect did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Transport event stream closed unexpectedly")]
    TransportClosed,

    #[error("Session task ended unexpectedly: {message}")]
    SessionGone { message: String },
}

impl SessionError {
    pub fn connect_start<E>(server_uri: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectStart {
            server_uri: server_uri.to_string(),
            source: Box::new(source),
        }
    }

    pub fn reconnect<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Reconnect(Box::new(source))
    }

    pub fn disconnect<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Disconnect(Box::new(source))
    }

    pub fn session_gone<S: Into<String>>(message: S) -> Self {
        Self::SessionGone {
            message: message.into(),
        }
    }

    /// Process exit status for this failure
    ///
    /// Every unrecovered failure maps to 1; 0 is reserved for a clean shutdown.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_retries_exhausted_display() {
        let error = SessionError::RetriesExhausted { attempts: 6 };
        assert_eq!(
            error.to_string(),
            "Connection attempts exhausted after 6 failures"
        );
    }

    #[test]
    fn test_connect_start_keeps_source() {
        let error = SessionError::connect_start(
            "tcp://nowhere:1883",
            io::Error::new(io::ErrorKind::Other, "driver gone"),
        );

        assert!(error.to_string().contains("tcp://nowhere:1883"));
        let source = error.source().expect("source should be preserved");
        assert_eq!(source.to_string(), "driver gone");
    }

    #[test]
    fn test_disconnect_constructor() {
        let error = SessionError::disconnect(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert!(matches!(error, SessionError::Disconnect(_)));
        assert_eq!(error.to_string(), "Disconnect failed");
    }

    #[test]
    fn test_every_variant_exits_non_zero() {
        let errors = vec![
            SessionError::Config(crate::config::ConfigError::InvalidQos(9)),
            SessionError::connect_start("tcp://x:1", io::Error::new(io::ErrorKind::Other, "x")),
            SessionError::RetriesExhausted { attempts: 1 },
            SessionError::reconnect(io::Error::new(io::ErrorKind::Other, "x")),
            SessionError::disconnect(io::Error::new(io::ErrorKind::Other, "x")),
            SessionError::ShutdownTimeout(Duration::from_secs(1)),
            SessionError::TransportClosed,
            SessionError::session_gone("panicked"),
        ];

        for error in errors {
            assert_eq!(error.exit_code(), 1, "unexpected exit code for {error}");
        }
    }
}
