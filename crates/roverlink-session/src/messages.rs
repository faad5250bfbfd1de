//! JSON message schema for both backend channels.
//!
//! Every text message is an object with a `type` discriminator. Inbound enums
//! end in an `Unknown` arm so that message types added on the server side are
//! ignored instead of failing to parse.

use bytes::{BufMut, Bytes, BytesMut};
use roverlink_motor::{DriveSummary, MotorMapping, RoverCommand};
use serde::{Deserialize, Serialize};

/// Leading byte of a binary media message carrying one JPEG image.
pub const MEDIA_FRAME_TYPE: u8 = 0x01;

/// Server to client, command channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandInbound {
    Registered {
        #[serde(rename = "roverId")]
        rover_id: String,
    },
    HeartbeatAck,
    CommandAck,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// The command fields travel flat next to `type`.
    Command(RoverCommand),
    MotorConfig {
        mapping: MotorMapping,
    },
    MotorConfigAck,
    #[serde(other)]
    Unknown,
}

/// Client to server, command channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandOutbound {
    Register {
        name: String,
    },
    Heartbeat,
    MotorConfigUpdate {
        #[serde(rename = "roverId")]
        rover_id: String,
        mapping: MotorMapping,
    },
    Telemetry {
        #[serde(rename = "roverId")]
        rover_id: String,
        data: TelemetryData,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryData {
    /// 0-100.
    pub speed: i32,
    pub heading: i32,
    /// `moving` or `idle`.
    pub status: String,
}

impl Default for TelemetryData {
    fn default() -> Self {
        Self {
            speed: 0,
            heading: 0,
            status: "idle".to_string(),
        }
    }
}

impl From<DriveSummary> for TelemetryData {
    fn from(summary: DriveSummary) -> Self {
        Self {
            speed: i32::from(summary.speed_percent),
            heading: 0,
            status: if summary.moving { "moving" } else { "idle" }.to_string(),
        }
    }
}

/// Server to client, media channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaInbound {
    Registered,
    HeartbeatAck,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    StartStream,
    StopStream,
    #[serde(other)]
    Unknown,
}

/// Client to server, media channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaOutbound {
    Register {
        #[serde(rename = "roverId")]
        rover_id: String,
    },
    Heartbeat,
}

/// `[0x01][jpeg]`.
pub fn encode_media_frame(image: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + image.len());
    buf.put_u8(MEDIA_FRAME_TYPE);
    buf.put_slice(image);
    buf.freeze()
}
