use std::fmt;

use roverlink_frame::{MotorDirective, MotorId, MotorStatus};
use serde::Serialize;

/// Observable state of one motor channel.
///
/// `speed` and `last_directive` reflect operator intent and change before the
/// device answers. `status` only changes on a device acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorState {
    pub id: MotorId,
    pub speed: u8,
    pub last_directive: MotorDirective,
    pub status: MotorStatus,
}

impl MotorState {
    /// Full speed, stopped.
    pub fn new(id: MotorId) -> Self {
        Self {
            id,
            speed: u8::MAX,
            last_directive: MotorDirective::Stop,
            status: MotorStatus::Stopped,
        }
    }

    pub(crate) fn initial_table() -> [MotorState; 4] {
        MotorId::ALL.map(MotorState::new)
    }

    /// Forget everything the device told us; the configured speed is kept.
    pub(crate) fn reset_after_loss(&mut self) {
        self.last_directive = MotorDirective::Stop;
        self.status = MotorStatus::Unknown;
    }
}

/// Whether a serial device is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeviceLink {
    Disconnected,
    Connected { label: String },
    /// A write-level fault dropped the transport.
    Lost { reason: String },
}

impl DeviceLink {
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceLink::Connected { .. })
    }
}

impl fmt::Display for DeviceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceLink::Disconnected => f.write_str("disconnected"),
            DeviceLink::Connected { label } => write!(f, "connected ({label})"),
            DeviceLink::Lost { reason } => write!(f, "lost ({reason})"),
        }
    }
}

/// The most recent reply seen from the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum LastResponse {
    /// Nothing received yet.
    #[default]
    None,
    /// Trimmed reply text.
    Reply(String),
    /// The last exchange failed at the transport.
    Error,
}

impl fmt::Display for LastResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastResponse::None => f.write_str("-"),
            LastResponse::Reply(text) => f.write_str(text),
            LastResponse::Error => f.write_str("Error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub link: DeviceLink,
    pub last_response: LastResponse,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            link: DeviceLink::Disconnected,
            last_response: LastResponse::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_motor_state() {
        let table = MotorState::initial_table();
        for (slot, state) in table.iter().enumerate() {
            assert_eq!(state.id.index(), slot);
            assert_eq!(state.speed, 255);
            assert_eq!(state.last_directive, MotorDirective::Stop);
            assert_eq!(state.status, MotorStatus::Stopped);
        }
    }

    #[test]
    fn loss_keeps_speed() {
        let mut state = MotorState::new(MotorId::M2);
        state.speed = 40;
        state.last_directive = MotorDirective::Forward;
        state.status = MotorStatus::Forward;
        state.reset_after_loss();
        assert_eq!(state.speed, 40);
        assert_eq!(state.last_directive, MotorDirective::Stop);
        assert_eq!(state.status, MotorStatus::Unknown);
    }

    #[test]
    fn last_response_rendering() {
        assert_eq!(LastResponse::None.to_string(), "-");
        assert_eq!(LastResponse::Reply("OK".into()).to_string(), "OK");
        assert_eq!(LastResponse::Error.to_string(), "Error");
    }
}
