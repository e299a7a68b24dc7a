//! Observability for the subscriber session
//!
//! Structured logging only; every connection lifecycle step is reported as a
//! log line.

pub mod logging;

pub use logging::{init_logging, init_logging_with_verbosity, LogFormat};

// Span macros for structured logging
pub use logging::{mqtt_span, session_span};
