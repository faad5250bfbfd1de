//! Motor identities and directive codes understood by the firmware.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Stable identity of one physical motor channel (1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct MotorId(u8);

impl MotorId {
    pub const M1: MotorId = MotorId(1);
    pub const M2: MotorId = MotorId(2);
    pub const M3: MotorId = MotorId(3);
    pub const M4: MotorId = MotorId(4);

    /// All motors in ascending order.
    pub const ALL: [MotorId; 4] = [Self::M1, Self::M2, Self::M3, Self::M4];

    pub fn new(id: u8) -> Result<Self, FrameError> {
        match id {
            1..=4 => Ok(Self(id)),
            other => Err(FrameError::InvalidMotorId(other)),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot, handy for fixed-size per-motor tables.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// ASCII digit sent on the wire.
    pub fn digit(self) -> u8 {
        b'0' + self.0
    }

    pub(crate) fn from_digit(digit: u8) -> Result<Self, FrameError> {
        Self::new(digit.wrapping_sub(b'0'))
    }
}

impl TryFrom<u8> for MotorId {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MotorId> for u8 {
    fn from(id: MotorId) -> Self {
        id.0
    }
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// Command code for one motor. These are the only codes the device accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum MotorDirective {
    Stop = 0,
    Forward = 1,
    Backward = 2,
}

impl MotorDirective {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// ASCII digit sent on the wire.
    pub fn digit(self) -> u8 {
        b'0' + self.code()
    }

    /// The opposite travel direction; STOP stays STOP.
    pub fn reversed(self) -> Self {
        match self {
            MotorDirective::Stop => MotorDirective::Stop,
            MotorDirective::Forward => MotorDirective::Backward,
            MotorDirective::Backward => MotorDirective::Forward,
        }
    }

    /// Short label used in packet logs.
    pub fn label(self) -> &'static str {
        match self {
            MotorDirective::Stop => "STOP",
            MotorDirective::Forward => "FWD",
            MotorDirective::Backward => "BWD",
        }
    }

    pub(crate) fn from_digit(digit: u8) -> Result<Self, FrameError> {
        Self::try_from(digit.wrapping_sub(b'0'))
    }
}

impl TryFrom<u8> for MotorDirective {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MotorDirective::Stop),
            1 => Ok(MotorDirective::Forward),
            2 => Ok(MotorDirective::Backward),
            other => Err(FrameError::InvalidDirective(other)),
        }
    }
}

/// Device-confirmed state of a motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MotorStatus {
    Stopped,
    Forward,
    Backward,
    Unknown,
}

impl From<MotorDirective> for MotorStatus {
    fn from(directive: MotorDirective) -> Self {
        match directive {
            MotorDirective::Stop => MotorStatus::Stopped,
            MotorDirective::Forward => MotorStatus::Forward,
            MotorDirective::Backward => MotorStatus::Backward,
        }
    }
}

impl MotorStatus {
    pub fn is_moving(self) -> bool {
        matches!(self, MotorStatus::Forward | MotorStatus::Backward)
    }
}

impl fmt::Display for MotorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MotorStatus::Stopped => "STOPPED",
            MotorStatus::Forward => "FORWARD",
            MotorStatus::Backward => "BACKWARD",
            MotorStatus::Unknown => "UNKNOWN",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_id_range() {
        assert!(MotorId::new(0).is_err());
        assert_eq!(MotorId::new(3).unwrap(), MotorId::M3);
        assert!(matches!(MotorId::new(5), Err(FrameError::InvalidMotorId(5))));
    }

    #[test]
    fn digits_are_ascii() {
        assert_eq!(MotorId::M1.digit(), b'1');
        assert_eq!(MotorId::M4.digit(), b'4');
        assert_eq!(MotorDirective::Stop.digit(), b'0');
        assert_eq!(MotorDirective::Backward.digit(), b'2');
    }

    #[test]
    fn status_follows_directive() {
        assert_eq!(MotorStatus::from(MotorDirective::Stop), MotorStatus::Stopped);
        assert_eq!(MotorStatus::from(MotorDirective::Forward), MotorStatus::Forward);
        assert_eq!(MotorStatus::from(MotorDirective::Backward), MotorStatus::Backward);
    }

    #[test]
    fn motor_id_converts_through_u8() {
        assert_eq!(u8::from(MotorId::M2), 2);
        assert_eq!(MotorId::try_from(4u8).unwrap().index(), 3);
        assert!(MotorId::try_from(9u8).is_err());
    }

    #[test]
    fn reversed_swaps_travel_only() {
        assert_eq!(MotorDirective::Forward.reversed(), MotorDirective::Backward);
        assert_eq!(MotorDirective::Backward.reversed(), MotorDirective::Forward);
        assert_eq!(MotorDirective::Stop.reversed(), MotorDirective::Stop);
    }
}
