use std::sync::Arc;

use roverlink_frame::{MotorDirective, MotorId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::channel::{ExchangeOutcome, MotorCommandChannel};
use crate::error::{MappingError, Result};
use crate::mapping::{MappingStore, MotorMapping};

/// Speed used when a command carries none, in percent.
pub const DEFAULT_SPEED_PERCENT: i32 = 50;

/// Rotation used when a rotate command carries no angle.
pub const DEFAULT_ROTATE_DEGREES: i32 = 90;

/// A rover-level command as sent by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoverCommand {
    /// `move`, `stop`, `rotate` or `calibrate`.
    pub action: String,
    /// `forward`, `backward`, `left` or `right`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degrees: Option<i32>,
}

impl RoverCommand {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    pub fn with_speed(mut self, speed: i32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_degrees(mut self, degrees: i32) -> Self {
        self.degrees = Some(degrees);
        self
    }

    pub fn action(&self) -> RoverAction {
        match (self.action.as_str(), self.direction.as_deref()) {
            ("move", Some("forward")) => RoverAction::MoveForward,
            ("move", Some("backward")) => RoverAction::MoveBackward,
            ("move", Some("left")) => RoverAction::MoveLeft,
            ("move", Some("right")) => RoverAction::MoveRight,
            ("stop", _) => RoverAction::Stop,
            ("calibrate", _) => RoverAction::Calibrate,
            ("rotate", _) => RoverAction::Rotate {
                degrees: self.degrees.unwrap_or(DEFAULT_ROTATE_DEGREES),
            },
            _ => RoverAction::Unknown,
        }
    }

    /// `"<action> <direction>"`, for status displays.
    pub fn summary(&self) -> String {
        match &self.direction {
            Some(direction) => format!("{} {}", self.action, direction),
            None => self.action.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoverAction {
    MoveForward,
    MoveBackward,
    /// Pivot in place to the left.
    MoveLeft,
    MoveRight,
    Stop,
    Calibrate,
    Rotate {
        degrees: i32,
    },
    /// Anything else, including a `move` without a known direction.
    Unknown,
}

/// Directives for the left and right side, before mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrivePlan {
    pub left: MotorDirective,
    pub right: MotorDirective,
}

impl DrivePlan {
    const fn new(left: MotorDirective, right: MotorDirective) -> Self {
        Self { left, right }
    }

    /// Resolve sides to physical motors, honoring reversal flags.
    pub fn commands(&self, mapping: &MotorMapping) -> [(MotorId, MotorDirective); 2] {
        let side = |directive: MotorDirective, reversed: bool| {
            if reversed {
                directive.reversed()
            } else {
                directive
            }
        };
        [
            (mapping.left, side(self.left, mapping.left_reversed)),
            (mapping.right, side(self.right, mapping.right_reversed)),
        ]
    }
}

/// Map an action to side directives. Unknown actions yield `None`.
pub fn plan(action: RoverAction) -> Option<DrivePlan> {
    use MotorDirective::{Backward, Forward, Stop};

    let plan = match action {
        RoverAction::MoveForward => DrivePlan::new(Forward, Forward),
        RoverAction::MoveBackward => DrivePlan::new(Backward, Backward),
        RoverAction::MoveLeft => DrivePlan::new(Backward, Forward),
        RoverAction::MoveRight => DrivePlan::new(Forward, Backward),
        RoverAction::Stop | RoverAction::Calibrate => DrivePlan::new(Stop, Stop),
        RoverAction::Rotate { degrees } if degrees > 0 => DrivePlan::new(Forward, Backward),
        RoverAction::Rotate { .. } => DrivePlan::new(Backward, Forward),
        // Newer backends may send actions this rover does not know; ignore them.
        RoverAction::Unknown => return None,
    };
    Some(plan)
}

/// Percent (0-100, default 50) to PWM duty (0-255), rounded.
pub fn scale_speed(percent: Option<i32>) -> u8 {
    let percent = i64::from(percent.unwrap_or(DEFAULT_SPEED_PERCENT));
    let duty = (percent * 255 + 50) / 100;
    duty.clamp(0, i64::from(u8::MAX)) as u8
}

/// What the mapped drive motors are doing, for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveSummary {
    /// Mean configured speed of the two mapped motors, 0-100.
    pub speed_percent: u8,
    /// Whether the device confirmed either side moving.
    pub moving: bool,
}

/// Turns [`RoverCommand`]s into motor batches using the current mapping.
pub struct RoverCommandTranslator {
    channel: MotorCommandChannel,
    mapping: watch::Sender<MotorMapping>,
    store: Arc<dyn MappingStore>,
}

impl RoverCommandTranslator {
    /// Start with whatever mapping the store holds.
    pub fn new(channel: MotorCommandChannel, store: Arc<dyn MappingStore>) -> Self {
        let mapping = store.load();
        info!(left = %mapping.left, right = %mapping.right, "motor mapping in use");
        Self {
            channel,
            mapping: watch::Sender::new(mapping),
            store,
        }
    }

    pub fn channel(&self) -> &MotorCommandChannel {
        &self.channel
    }

    pub fn mapping(&self) -> MotorMapping {
        *self.mapping.borrow()
    }

    pub fn subscribe_mapping(&self) -> watch::Receiver<MotorMapping> {
        self.mapping.subscribe()
    }

    /// Switch to a new mapping and persist it.
    ///
    /// An invalid mapping is rejected and the current one stays. A mapping
    /// that fails to persist still applies for this run.
    pub fn apply_mapping(&self, mapping: MotorMapping) -> std::result::Result<(), MappingError> {
        mapping.validate()?;
        self.mapping.send_replace(mapping);
        info!(
            left = %mapping.left,
            right = %mapping.right,
            left_reversed = mapping.left_reversed,
            right_reversed = mapping.right_reversed,
            "motor mapping applied"
        );
        self.store.save(&mapping)
    }

    /// Execute a rover command. Returns `Ok(None)` for ignored commands.
    ///
    /// Blocks for one serial exchange.
    pub fn execute(&self, command: &RoverCommand) -> Result<Option<ExchangeOutcome>> {
        let action = command.action();
        let Some(drive) = plan(action) else {
            debug!(command = %command.summary(), "ignoring unknown rover command");
            return Ok(None);
        };

        let mapping = self.mapping();
        let speed = scale_speed(command.speed);
        self.channel.set_speed(mapping.left, i32::from(speed));
        self.channel.set_speed(mapping.right, i32::from(speed));

        let commands = drive.commands(&mapping);
        info!(
            ?action,
            left = %commands[0].0,
            left_directive = commands[0].1.label(),
            right = %commands[1].0,
            right_directive = commands[1].1.label(),
            speed,
            "rover command"
        );
        self.channel.send_batch(&commands).map(Some)
    }

    pub fn drive_summary(&self) -> DriveSummary {
        let mapping = self.mapping();
        let left = self.channel.motor(mapping.left);
        let right = self.channel.motor(mapping.right);
        let mean = (u32::from(left.speed) + u32::from(right.speed)) / 2;
        DriveSummary {
            speed_percent: ((mean * 100 + 127) / 255) as u8,
            moving: left.status.is_moving() || right.status.is_moving(),
        }
    }
}

impl std::fmt::Debug for RoverCommandTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoverCommandTranslator")
            .field("mapping", &*self.mapping.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use roverlink_frame::{decode_command, MotorStatus};
    use roverlink_transport::SerialTransport;

    use super::*;
    use crate::mapping::MemoryStore;

    /// Acknowledges everything and keeps what was written.
    #[derive(Clone, Default)]
    struct AckingDevice {
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl SerialTransport for AckingDevice {
        fn write(&mut self, bytes: &[u8], _timeout: Duration) -> roverlink_transport::Result<()> {
            self.written.lock().expect("lock").push(bytes.to_vec());
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> roverlink_transport::Result<usize> {
            buf[..2].copy_from_slice(b"OK");
            Ok(2)
        }

        fn close(&mut self) -> roverlink_transport::Result<()> {
            Ok(())
        }
    }

    fn translator(device: &AckingDevice) -> RoverCommandTranslator {
        let channel = MotorCommandChannel::new();
        channel.attach(device.clone(), "acking");
        RoverCommandTranslator::new(channel, Arc::new(MemoryStore::new()))
    }

    fn last_frame(device: &AckingDevice) -> Vec<(MotorId, MotorDirective, u8)> {
        let written = device.written.lock().expect("lock");
        let mut buf = bytes::BytesMut::from(written.last().expect("a frame was written").as_slice());
        decode_command(&mut buf)
            .expect("valid frame")
            .expect("complete frame")
            .entries()
            .iter()
            .map(|e| (e.motor, e.directive, e.speed))
            .collect()
    }

    #[test]
    fn move_left_pivots_at_full_speed() {
        let device = AckingDevice::default();
        let translator = translator(&device);

        let command = RoverCommand::new("move").with_direction("left").with_speed(100);
        let outcome = translator.execute(&command).expect("exchange should succeed");
        assert!(outcome.expect("command is known").is_acked());

        assert_eq!(
            last_frame(&device),
            vec![
                (MotorId::M3, MotorDirective::Backward, 255),
                (MotorId::M4, MotorDirective::Forward, 255),
            ]
        );
        assert_eq!(translator.channel().motor(MotorId::M3).status, MotorStatus::Backward);
    }

    #[test]
    fn rotate_sign_selects_pivot() {
        let ccw = RoverCommand::new("rotate").with_degrees(-45).action();
        assert_eq!(
            plan(ccw),
            Some(DrivePlan::new(MotorDirective::Backward, MotorDirective::Forward))
        );

        let default = RoverCommand::new("rotate").action();
        assert_eq!(default, RoverAction::Rotate { degrees: 90 });
        assert_eq!(
            plan(default),
            Some(DrivePlan::new(MotorDirective::Forward, MotorDirective::Backward))
        );

        let zero = RoverCommand::new("rotate").with_degrees(0).action();
        assert_eq!(plan(zero).map(|p| p.left), Some(MotorDirective::Backward));
    }

    #[test]
    fn stop_and_calibrate_stop_both() {
        for action in ["stop", "calibrate"] {
            let planned = plan(RoverCommand::new(action).action()).expect("known action");
            assert_eq!(planned.left, MotorDirective::Stop);
            assert_eq!(planned.right, MotorDirective::Stop);
        }
    }

    #[test]
    fn unknown_commands_are_ignored() {
        let device = AckingDevice::default();
        let translator = translator(&device);

        for command in [
            RoverCommand::new("dance"),
            RoverCommand::new("move"),
            RoverCommand::new("move").with_direction("up"),
        ] {
            assert_eq!(command.action(), RoverAction::Unknown);
            assert!(translator.execute(&command).expect("no error").is_none());
        }
        assert!(device.written.lock().expect("lock").is_empty());
        assert_eq!(translator.channel().motor(MotorId::M3).speed, 255);
    }

    #[test]
    fn speed_scaling() {
        assert_eq!(scale_speed(None), 128);
        assert_eq!(scale_speed(Some(0)), 0);
        assert_eq!(scale_speed(Some(100)), 255);
        assert_eq!(scale_speed(Some(20)), 51);
        assert_eq!(scale_speed(Some(-5)), 0);
        assert_eq!(scale_speed(Some(250)), 255);
    }

    #[test]
    fn reversed_side_is_flipped() {
        let device = AckingDevice::default();
        let translator = translator(&device);
        let mapping = MotorMapping::new(MotorId::M1, MotorId::M2)
            .expect("valid")
            .with_reversed(false, true);
        translator.apply_mapping(mapping).expect("apply");

        translator
            .execute(&RoverCommand::new("move").with_direction("forward").with_speed(20))
            .expect("exchange");
        assert_eq!(
            last_frame(&device),
            vec![
                (MotorId::M1, MotorDirective::Forward, 51),
                (MotorId::M2, MotorDirective::Backward, 51),
            ]
        );
    }

    #[test]
    fn apply_mapping_persists_and_rejects_same_motor() {
        let store = Arc::new(MemoryStore::new());
        let translator = RoverCommandTranslator::new(MotorCommandChannel::new(), store.clone());
        assert_eq!(translator.mapping(), MotorMapping::default());

        let mapping = MotorMapping::new(MotorId::M2, MotorId::M1).expect("valid");
        translator.apply_mapping(mapping).expect("apply");
        assert_eq!(store.saved(), Some(mapping));

        let same = MotorMapping {
            left: MotorId::M4,
            right: MotorId::M4,
            ..mapping
        };
        assert!(translator.apply_mapping(same).is_err());
        assert_eq!(translator.mapping(), mapping);
    }

    #[test]
    fn inbound_json_shape() {
        let command: RoverCommand = serde_json::from_str(
            r#"{"action":"move","direction":"backward","speed":40,"extra":true}"#,
        )
        .expect("parse");
        assert_eq!(command.action(), RoverAction::MoveBackward);
        assert_eq!(command.speed, Some(40));
        assert_eq!(command.summary(), "move backward");
    }

    #[test]
    fn drive_summary_reflects_mapped_motors() {
        let device = AckingDevice::default();
        let translator = translator(&device);
        let idle = translator.drive_summary();
        assert_eq!(idle.speed_percent, 100);
        assert!(!idle.moving);

        translator
            .execute(&RoverCommand::new("move").with_direction("forward"))
            .expect("exchange");
        let moving = translator.drive_summary();
        assert_eq!(moving.speed_percent, 50);
        assert!(moving.moving);
    }
}
