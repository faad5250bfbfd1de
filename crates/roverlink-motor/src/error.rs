use std::path::PathBuf;

use roverlink_frame::{FrameError, MotorId};
use roverlink_transport::TransportError;

/// Errors returned by [`MotorCommandChannel`](crate::MotorCommandChannel).
///
/// A device that stays silent or answers without the success marker is not an
/// error; see [`ExchangeOutcome`](crate::ExchangeOutcome).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// No serial device is attached.
    #[error("no serial device attached")]
    NotConnected,

    /// The batch was rejected before any I/O.
    #[error("invalid batch: {0}")]
    InvalidBatch(#[from] FrameError),

    /// The transport failed after all write attempts.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from validating or persisting a [`MotorMapping`](crate::MotorMapping).
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// Left and right resolve to the same physical motor.
    #[error("left and right both map to motor {0}")]
    SameMotor(MotorId),

    #[error("mapping file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("mapping JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
