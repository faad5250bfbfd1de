use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use roverlink_frame::{hex_dump, CommandFrame};
use roverlink_motor::{DeviceState, ExchangeOutcome, MotorState};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EntryOutput {
    motor: u8,
    directive: &'static str,
    speed: u8,
}

#[derive(Serialize)]
struct FrameOutput {
    kind: &'static str,
    size: usize,
    hex: String,
    entries: Vec<EntryOutput>,
}

pub fn print_frame(frame: &CommandFrame, wire: &[u8], format: OutputFormat) {
    let kind = frame_kind(frame);
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                kind,
                size: wire.len(),
                hex: hex_dump(wire),
                entries: frame
                    .entries()
                    .iter()
                    .map(|entry| EntryOutput {
                        motor: entry.motor.get(),
                        directive: entry.directive.label(),
                        speed: entry.speed,
                    })
                    .collect(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["MOTOR", "DIRECTIVE", "SPEED"]);
            for entry in frame.entries() {
                table.add_row(vec![
                    entry.motor.to_string(),
                    entry.directive.label().to_string(),
                    entry.speed.to_string(),
                ]);
            }
            println!("{table}");
            println!("{kind} frame, {} bytes: {}", wire.len(), hex_dump(wire));
        }
        OutputFormat::Pretty => {
            println!("{kind} size={} bytes={}", wire.len(), hex_dump(wire));
        }
        OutputFormat::Raw => print_raw(wire),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DriveOutput<'a> {
    command: &'a str,
    outcome: &'static str,
    reply: Option<&'a str>,
    device: &'a DeviceState,
    motors: &'a [MotorState; 4],
}

/// Print one device exchange. `command` labels what was sent.
pub fn print_drive(
    command: &str,
    outcome: Option<&ExchangeOutcome>,
    device: &DeviceState,
    motors: &[MotorState; 4],
    format: OutputFormat,
) {
    let (label, reply) = describe_outcome(outcome);
    match format {
        OutputFormat::Json => print_json(&DriveOutput {
            command,
            outcome: label,
            reply,
            device,
            motors,
        }),
        OutputFormat::Table => {
            println!(
                "{command} -> {label} (device {}, last response {})",
                device.link,
                device.last_response
            );
            println!("{}", motor_table(motors));
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "command={command} outcome={label} reply={}",
                reply.unwrap_or("-")
            );
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput<'a> {
    device: &'a DeviceState,
    motors: &'a [MotorState; 4],
}

/// Final device and motor state, printed when `run` shuts down.
pub fn print_status(device: &DeviceState, motors: &[MotorState; 4], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StatusOutput { device, motors }),
        OutputFormat::Table => {
            println!(
                "device {} (last response {})",
                device.link, device.last_response
            );
            println!("{}", motor_table(motors));
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            let motors: Vec<String> = motors
                .iter()
                .map(|m| format!("{}={}@{}", m.id, m.status, m.speed))
                .collect();
            println!("device={} motors={}", device.link, motors.join(","));
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn motor_table(motors: &[MotorState; 4]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["MOTOR", "SPEED", "LAST SENT", "STATUS"]);
    for motor in motors {
        table.add_row(vec![
            motor.id.to_string(),
            motor.speed.to_string(),
            motor.last_directive.label().to_string(),
            motor.status.to_string(),
        ]);
    }
    table
}

fn frame_kind(frame: &CommandFrame) -> &'static str {
    match frame {
        CommandFrame::Single(_) => "single",
        CommandFrame::Batch(_) => "batch",
    }
}

fn describe_outcome(outcome: Option<&ExchangeOutcome>) -> (&'static str, Option<&str>) {
    match outcome {
        None => ("ignored", None),
        Some(ExchangeOutcome::Acked(reply)) => ("acked", Some(reply.as_str())),
        Some(ExchangeOutcome::NotAcked(reply)) => ("not_acked", Some(reply.as_str())),
        Some(ExchangeOutcome::TimedOut) => ("timed_out", None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(describe_outcome(None), ("ignored", None));
        let acked = ExchangeOutcome::Acked("OK".into());
        assert_eq!(describe_outcome(Some(&acked)), ("acked", Some("OK")));
        assert_eq!(
            describe_outcome(Some(&ExchangeOutcome::TimedOut)),
            ("timed_out", None)
        );
    }
}
