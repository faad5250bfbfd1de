//! Serial transport boundary.
//!
//! The motor controller talks to exactly one device over a half-duplex,
//! byte-oriented serial line. Everything above this crate goes through the
//! [`SerialTransport`] trait so the protocol engine can be exercised against
//! scripted devices in tests and against a real port in production.

pub mod error;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use serial::{SerialConfig, SerialPortTransport};
pub use traits::SerialTransport;
