use std::fmt;
use std::io;

use roverlink_frame::FrameError;
use roverlink_motor::{ChannelError, ExchangeOutcome, MappingError};
use roverlink_transport::TransportError;

// Exit codes shared by every subcommand.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Write(source) | TransportError::Read(source) => io_error(context, source),
        TransportError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::NotConnected => CliError::new(FAILURE, format!("{context}: {err}")),
        ChannelError::InvalidBatch(err) => frame_error(context, err),
        ChannelError::Transport(err) => transport_error(context, err),
    }
}

pub fn mapping_error(context: &str, err: MappingError) -> CliError {
    match err {
        MappingError::Io { source, .. } => io_error(context, source),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

/// Exit code for a completed exchange.
pub fn outcome_code(outcome: &ExchangeOutcome) -> i32 {
    match outcome {
        ExchangeOutcome::Acked(_) => SUCCESS,
        ExchangeOutcome::NotAcked(_) => FAILURE,
        ExchangeOutcome::TimedOut => TIMEOUT,
    }
}

#[cfg(test)]
mod tests {
    use roverlink_frame::MotorId;

    use super::*;

    #[test]
    fn transport_write_timeout_maps_to_timeout() {
        let err = TransportError::Write(io::Error::new(io::ErrorKind::TimedOut, "stalled"));
        assert_eq!(transport_error("send", err).code, TIMEOUT);
        assert_eq!(transport_error("send", TransportError::Closed).code, FAILURE);
    }

    #[test]
    fn invalid_batch_is_data_invalid() {
        let err = ChannelError::InvalidBatch(FrameError::DuplicateMotor(MotorId::M2));
        let cli = channel_error("drive", err);
        assert_eq!(cli.code, DATA_INVALID);
        assert!(cli.message.starts_with("drive: "));
    }

    #[test]
    fn outcomes_map_to_codes() {
        assert_eq!(outcome_code(&ExchangeOutcome::Acked("OK".into())), SUCCESS);
        assert_eq!(outcome_code(&ExchangeOutcome::NotAcked("ERR".into())), FAILURE);
        assert_eq!(outcome_code(&ExchangeOutcome::TimedOut), TIMEOUT);
    }
}
