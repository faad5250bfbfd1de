use crate::motor::MotorId;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A batch frame must address between 2 and 4 motors.
    #[error("batch frame needs 2-4 entries, got {count}")]
    BatchSize { count: usize },

    /// The same motor appears more than once in a batch.
    #[error("motor {0} appears more than once in batch")]
    DuplicateMotor(MotorId),

    /// A motor id outside 1-4.
    #[error("invalid motor id {0} (expected 1-4)")]
    InvalidMotorId(u8),

    /// A directive code outside 0-2.
    #[error("invalid directive code {0} (expected 0-2)")]
    InvalidDirective(u8),

    /// The frame does not start or end with the expected delimiter.
    #[error("invalid frame marker 0x{found:02X} at offset {offset}")]
    InvalidMarker { offset: usize, found: u8 },

    /// The trailing checksum does not match the frame body.
    #[error("checksum mismatch (expected 0x{expected:02X}, got 0x{actual:02X})")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
