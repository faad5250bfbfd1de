mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "roverlink", version, about = "Rover motor control and backend link")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "ROVERLINK_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_subcommand() {
        let cli = Cli::try_parse_from([
            "roverlink",
            "run",
            "--server",
            "10.0.0.5",
            "--device",
            "/dev/ttyACM0",
            "--stream",
            "--telemetry-interval",
            "5s",
        ])
        .expect("run args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.backend().command_url(), "ws://10.0.0.5:8080/ws");
        assert_eq!(args.backend().rover_name, "ATRover");
        assert_eq!(args.device.device, "/dev/ttyACM0");
        assert!(args.stream);
    }

    #[test]
    fn parses_drive_with_negative_degrees() {
        let cli = Cli::try_parse_from([
            "roverlink",
            "drive",
            "rotate",
            "--degrees",
            "-45",
            "--left",
            "M1",
            "--right",
            "2",
        ])
        .expect("drive args should parse");

        let Command::Drive(args) = cli.command else {
            panic!("expected drive");
        };
        assert_eq!(args.degrees, Some(-45));
        assert_eq!(args.mapping.left.map(u8::from), Some(1));
    }

    #[test]
    fn rejects_invalid_motor() {
        let err = Cli::try_parse_from(["roverlink", "motor", "7", "forward"])
            .expect_err("motor 7 should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn encode_requires_entries() {
        let err = Cli::try_parse_from(["roverlink", "encode"]).expect_err("no entries");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }
}
