use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use roverlink_frame::{CommandEntry, MotorDirective, MotorId};
use roverlink_motor::{
    JsonFileStore, MappingStore, MemoryStore, MotorCommandChannel, MotorMapping,
    RoverCommandTranslator,
};
use roverlink_session::BackendConfig;
use roverlink_transport::{SerialConfig, SerialPortTransport};

use crate::exit::{mapping_error, transport_error, CliResult};
use crate::output::OutputFormat;

pub mod drive;
pub mod encode;
pub mod motor;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect the device to the backend and serve until Ctrl-C.
    Run(RunArgs),
    /// Execute one rover command against the device.
    Drive(DriveArgs),
    /// Send one directive to a single motor.
    Motor(MotorArgs),
    /// Print the wire bytes of a command frame.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Drive(args) => drive::run(args, format),
        Command::Motor(args) => motor::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial device of the motor controller.
    #[arg(long, env = "ROVERLINK_DEVICE", default_value = "/dev/ttyUSB0")]
    pub device: String,
    /// Serial baud rate.
    #[arg(long, env = "ROVERLINK_BAUD", default_value_t = SerialConfig::DEFAULT_BAUD_RATE)]
    pub baud: u32,
}

impl DeviceArgs {
    /// Open the device and attach it to a fresh command channel.
    pub fn open(&self) -> CliResult<MotorCommandChannel> {
        let config = SerialConfig::new(self.device.as_str(), self.baud);
        let transport = SerialPortTransport::open(&config)
            .map_err(|err| transport_error("device open failed", err))?;
        let channel = MotorCommandChannel::new();
        channel.attach(transport, config.path);
        Ok(channel)
    }
}

#[derive(Args, Debug, Default)]
pub struct MappingArgs {
    /// JSON file holding the left/right motor mapping.
    #[arg(long, env = "ROVERLINK_MAPPING_FILE", value_name = "FILE")]
    pub mapping_file: Option<PathBuf>,
    /// Motor driving the left side (1-4).
    #[arg(long, value_parser = parse_motor)]
    pub left: Option<MotorId>,
    /// Motor driving the right side (1-4).
    #[arg(long, value_parser = parse_motor)]
    pub right: Option<MotorId>,
    /// Swap forward and backward on the left side.
    #[arg(long)]
    pub left_reversed: bool,
    /// Swap forward and backward on the right side.
    #[arg(long)]
    pub right_reversed: bool,
}

impl MappingArgs {
    pub fn store(&self) -> Arc<dyn MappingStore> {
        match &self.mapping_file {
            Some(path) => Arc::new(JsonFileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        }
    }

    /// The mapping requested on the command line, on top of `current`.
    pub fn requested(&self, current: MotorMapping) -> CliResult<Option<MotorMapping>> {
        let overridden =
            self.left.is_some() || self.right.is_some() || self.left_reversed || self.right_reversed;
        if !overridden {
            return Ok(None);
        }
        let mapping = MotorMapping::new(
            self.left.unwrap_or(current.left),
            self.right.unwrap_or(current.right),
        )
        .map_err(|err| mapping_error("invalid motor mapping", err))?;
        Ok(Some(
            mapping.with_reversed(self.left_reversed, self.right_reversed),
        ))
    }

    /// Build a translator over `channel`, applying any requested mapping.
    pub fn translator(&self, channel: MotorCommandChannel) -> CliResult<RoverCommandTranslator> {
        let translator = RoverCommandTranslator::new(channel, self.store());
        if let Some(mapping) = self.requested(translator.mapping())? {
            translator
                .apply_mapping(mapping)
                .map_err(|err| mapping_error("motor mapping not saved", err))?;
        }
        Ok(translator)
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    #[command(flatten)]
    pub mapping: MappingArgs,
    /// Backend host name or address.
    #[arg(long, env = "ROVERLINK_SERVER")]
    pub server: String,
    /// Backend command channel port.
    #[arg(long, default_value_t = BackendConfig::DEFAULT_COMMAND_PORT)]
    pub command_port: u16,
    /// Backend media channel port.
    #[arg(long, default_value_t = BackendConfig::DEFAULT_MEDIA_PORT)]
    pub media_port: u16,
    /// Name this rover registers with.
    #[arg(long, default_value = BackendConfig::DEFAULT_ROVER_NAME)]
    pub name: String,
    /// Start streaming as soon as the media channel registers.
    #[arg(long)]
    pub stream: bool,
    /// JPEG image to stream in place of a camera.
    #[arg(long, value_name = "JPEG")]
    pub still: Option<PathBuf>,
    /// Send telemetry at this interval (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub telemetry_interval: Option<String>,
}

impl RunArgs {
    pub fn backend(&self) -> BackendConfig {
        BackendConfig {
            server: self.server.clone(),
            command_port: self.command_port,
            media_port: self.media_port,
            rover_name: self.name.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct DriveArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    #[command(flatten)]
    pub mapping: MappingArgs,
    /// Rover action: move, stop, calibrate or rotate.
    pub action: String,
    /// Direction for `move`: forward, backward, left or right.
    #[arg(long, short = 'd')]
    pub direction: Option<String>,
    /// Speed in percent (0-100). Default: 50.
    #[arg(long, short = 's', allow_negative_numbers = true)]
    pub speed: Option<i32>,
    /// Degrees for `rotate`. Default: 90.
    #[arg(long, allow_negative_numbers = true)]
    pub degrees: Option<i32>,
}

#[derive(Args, Debug)]
pub struct MotorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Motor to command (1-4 or M1-M4).
    #[arg(value_parser = parse_motor)]
    pub motor: MotorId,
    /// stop, forward or backward.
    #[arg(value_parser = parse_directive)]
    pub directive: MotorDirective,
    /// PWM duty (0-255). Default: the motor's configured speed.
    #[arg(long, short = 's')]
    pub speed: Option<u8>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Entries as MOTOR:DIRECTIVE[:SPEED], e.g. 3:forward:200. One entry
    /// encodes a single-motor frame, 2-4 entries a batch.
    #[arg(required = true, value_parser = parse_entry)]
    pub entries: Vec<CommandEntry>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_motor(input: &str) -> Result<MotorId, String> {
    let digits = input
        .strip_prefix('M')
        .or_else(|| input.strip_prefix('m'))
        .unwrap_or(input);
    let id: u8 = digits
        .parse()
        .map_err(|_| format!("invalid motor {input:?} (expected 1-4 or M1-M4)"))?;
    MotorId::new(id).map_err(|err| err.to_string())
}

pub fn parse_directive(input: &str) -> Result<MotorDirective, String> {
    match input.to_ascii_lowercase().as_str() {
        "stop" | "0" => Ok(MotorDirective::Stop),
        "forward" | "fwd" | "1" => Ok(MotorDirective::Forward),
        "backward" | "bwd" | "2" => Ok(MotorDirective::Backward),
        _ => Err(format!(
            "invalid directive {input:?} (expected stop, forward or backward)"
        )),
    }
}

pub fn parse_entry(input: &str) -> Result<CommandEntry, String> {
    let parts: Vec<&str> = input.split(':').collect();
    let (motor, directive, speed) = match parts.as_slice() {
        [motor, directive] => (*motor, *directive, None),
        [motor, directive, speed] => (*motor, *directive, Some(*speed)),
        _ => return Err(format!("expected MOTOR:DIRECTIVE[:SPEED], got {input:?}")),
    };
    let speed = match speed {
        Some(speed) => speed
            .parse()
            .map_err(|_| format!("invalid speed {speed:?} (expected 0-255)"))?,
        None => u8::MAX,
    };
    Ok(CommandEntry::new(
        parse_motor(motor)?,
        parse_directive(directive)?,
        speed,
    ))
}
