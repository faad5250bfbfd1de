use roverlink_motor::RoverCommand;

use crate::cmd::DriveArgs;
use crate::exit::{channel_error, outcome_code, CliError, CliResult, USAGE};
use crate::output::{print_drive, OutputFormat};

pub fn run(args: DriveArgs, format: OutputFormat) -> CliResult<i32> {
    let command = rover_command(&args);
    let channel = args.device.open()?;
    let translator = args.mapping.translator(channel.clone())?;

    let result = translator.execute(&command);
    let device = channel.device();
    let motors = channel.motors();
    channel.detach();

    let outcome = result.map_err(|err| channel_error("drive failed", err))?;
    print_drive(&command.summary(), outcome.as_ref(), &device, &motors, format);
    match outcome {
        Some(outcome) => Ok(outcome_code(&outcome)),
        None => Err(CliError::new(
            USAGE,
            format!("unknown rover command: {}", command.summary()),
        )),
    }
}

fn rover_command(args: &DriveArgs) -> RoverCommand {
    let mut command = RoverCommand::new(args.action.as_str());
    if let Some(direction) = &args.direction {
        command = command.with_direction(direction.as_str());
    }
    if let Some(speed) = args.speed {
        command = command.with_speed(speed);
    }
    if let Some(degrees) = args.degrees {
        command = command.with_degrees(degrees);
    }
    command
}
