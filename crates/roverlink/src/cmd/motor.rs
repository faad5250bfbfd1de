use roverlink_frame::{MotorDirective, MotorId};

use crate::cmd::MotorArgs;
use crate::exit::{channel_error, outcome_code, CliResult};
use crate::output::{print_drive, OutputFormat};

pub fn run(args: MotorArgs, format: OutputFormat) -> CliResult<i32> {
    let channel = args.device.open()?;
    if let Some(speed) = args.speed {
        channel.set_speed(args.motor, i32::from(speed));
    }

    let result = channel.send_single(args.motor, args.directive);
    let device = channel.device();
    let motors = channel.motors();
    channel.detach();

    let outcome = result.map_err(|err| channel_error("motor command failed", err))?;
    print_drive(
        &exchange_label(args.motor, args.directive),
        Some(&outcome),
        &device,
        &motors,
        format,
    );
    Ok(outcome_code(&outcome))
}

/// `"M3 FWD"`.
fn exchange_label(motor: MotorId, directive: MotorDirective) -> String {
    format!("{motor} {}", directive.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_names_motor_and_directive() {
        assert_eq!(exchange_label(MotorId::M3, MotorDirective::Forward), "M3 FWD");
        assert_eq!(exchange_label(MotorId::M1, MotorDirective::Stop), "M1 STOP");
    }
}
