//! Testing utilities and mock implementations
//!
//! This module provides mocks for exercising the session without an MQTT
//! broker.

pub mod mocks;

pub use mocks::*;
