//! Serial motor control and backend sessions for remotely operated rovers.
//!
//! A rover drives up to four DC motors through a microcontroller on a serial
//! line and is operated remotely through two WebSocket sessions: one for
//! commands and telemetry, one for a JPEG video stream.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial port boundary
//! - [`frame`]: motor command frames, checksums and device replies
//! - [`motor`]: the serialized command channel, motor state and the rover
//!   command translator
//! - [`session`]: auto-reconnecting command and media sessions (behind the
//!   `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use roverlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use roverlink_frame::*;
}

/// Re-export motor control types.
pub mod motor {
    pub use roverlink_motor::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use roverlink_session::*;
}
