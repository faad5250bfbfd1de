use std::fmt::Write as _;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::motor::{MotorDirective, MotorId};

/// Opening delimiter.
pub const START_MARKER: u8 = b'<';

/// Closing delimiter.
pub const END_MARKER: u8 = b'>';

/// Second byte of every batch frame.
pub const BATCH_MARKER: u8 = b'D';

/// Wire size of a single-motor frame.
pub const SINGLE_FRAME_LEN: usize = 6;

/// Smallest batch the firmware accepts.
pub const MIN_BATCH: usize = 2;

/// Largest batch the firmware accepts.
pub const MAX_BATCH: usize = 4;

/// One motor's part of a command: who, what, and how fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub motor: MotorId,
    pub directive: MotorDirective,
    /// PWM duty, 0-255.
    pub speed: u8,
}

impl CommandEntry {
    pub fn new(motor: MotorId, directive: MotorDirective, speed: u8) -> Self {
        Self {
            motor,
            directive,
            speed,
        }
    }

    fn wire_bytes(&self) -> [u8; 3] {
        [self.motor.digit(), self.directive.digit(), self.speed]
    }
}

/// A command frame as it travels to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFrame {
    Single(CommandEntry),
    /// 2-4 entries in ascending motor order.
    Batch(Vec<CommandEntry>),
}

impl CommandFrame {
    /// Build a batch frame. Entries are re-sorted by motor id; sizes outside
    /// 2-4 and repeated motors are rejected.
    pub fn batch(entries: impl Into<Vec<CommandEntry>>) -> Result<Self> {
        Ok(CommandFrame::Batch(normalize_batch(entries.into())?))
    }

    /// Entries addressed by this frame, in wire order.
    pub fn entries(&self) -> &[CommandEntry] {
        match self {
            CommandFrame::Single(entry) => std::slice::from_ref(entry),
            CommandFrame::Batch(entries) => entries,
        }
    }

    /// Total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        match self {
            CommandFrame::Single(_) => SINGLE_FRAME_LEN,
            CommandFrame::Batch(entries) => batch_wire_size(entries.len()),
        }
    }
}

fn batch_wire_size(count: usize) -> usize {
    3 + count * 3 + 2
}

fn normalize_batch(mut entries: Vec<CommandEntry>) -> Result<Vec<CommandEntry>> {
    if !(MIN_BATCH..=MAX_BATCH).contains(&entries.len()) {
        return Err(FrameError::BatchSize {
            count: entries.len(),
        });
    }
    entries.sort_by_key(|entry| entry.motor);
    if let Some(pair) = entries.windows(2).find(|pair| pair[0].motor == pair[1].motor) {
        return Err(FrameError::DuplicateMotor(pair[0].motor));
    }
    Ok(entries)
}

/// XOR checksum of a single-motor frame.
pub fn single_checksum(entry: &CommandEntry) -> u8 {
    entry.wire_bytes().iter().fold(0, |acc, b| acc ^ b)
}

/// Running XOR over `'D'`, the count digit and every triplet byte.
pub fn batch_checksum(entries: &[CommandEntry]) -> u8 {
    let count_digit = b'0' + entries.len() as u8;
    entries
        .iter()
        .flat_map(CommandEntry::wire_bytes)
        .fold(BATCH_MARKER ^ count_digit, |acc, b| acc ^ b)
}

/// Encode a single-motor frame.
///
/// Wire format:
/// ```text
/// ┌─────┬────────┬─────────┬───────┬──────────┬─────┐
/// │ '<' │ id (1B)│ cmd (1B)│ speed │ chk (1B) │ '>' │
/// │     │ ASCII  │ ASCII   │ raw   │ XOR      │     │
/// └─────┴────────┴─────────┴───────┴──────────┴─────┘
/// ```
pub fn encode_single(entry: &CommandEntry, dst: &mut BytesMut) {
    dst.reserve(SINGLE_FRAME_LEN);
    dst.put_u8(START_MARKER);
    dst.put_slice(&entry.wire_bytes());
    dst.put_u8(single_checksum(entry));
    dst.put_u8(END_MARKER);
}

/// Encode a batch frame.
///
/// Wire format:
/// ```text
/// ┌─────┬─────┬─────────┬──────────────────────┬──────────┬─────┐
/// │ '<' │ 'D' │ n (1B)  │ (id cmd speed) × n   │ chk (1B) │ '>' │
/// │     │     │ ASCII   │ ascending motor id   │ XOR      │     │
/// └─────┴─────┴─────────┴──────────────────────┴──────────┴─────┘
/// ```
///
/// Entries may be passed in any order; they are written sorted by motor id.
pub fn encode_batch(entries: &[CommandEntry], dst: &mut BytesMut) -> Result<()> {
    let entries = normalize_batch(entries.to_vec())?;
    let count_digit = b'0' + entries.len() as u8;

    dst.reserve(batch_wire_size(entries.len()));
    dst.put_u8(START_MARKER);
    dst.put_u8(BATCH_MARKER);
    dst.put_u8(count_digit);
    for entry in &entries {
        dst.put_slice(&entry.wire_bytes());
    }
    dst.put_u8(batch_checksum(&entries));
    dst.put_u8(END_MARKER);
    Ok(())
}

/// Encode any command frame.
pub fn encode_command(frame: &CommandFrame, dst: &mut BytesMut) -> Result<()> {
    match frame {
        CommandFrame::Single(entry) => {
            encode_single(entry, dst);
            Ok(())
        }
        CommandFrame::Batch(entries) => encode_batch(entries, dst),
    }
}

/// Decode a command frame from a buffer (device side of the protocol).
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_command(src: &mut BytesMut) -> Result<Option<CommandFrame>> {
    if src.is_empty() {
        return Ok(None);
    }
    if src[0] != START_MARKER {
        return Err(FrameError::InvalidMarker {
            offset: 0,
            found: src[0],
        });
    }
    if src.len() < 2 {
        return Ok(None);
    }

    if src[1] == BATCH_MARKER {
        decode_batch(src)
    } else {
        decode_single(src)
    }
}

fn decode_single(src: &mut BytesMut) -> Result<Option<CommandFrame>> {
    if src.len() < SINGLE_FRAME_LEN {
        return Ok(None);
    }
    check_end_marker(src, SINGLE_FRAME_LEN)?;

    let entry = decode_entry(&src[1..4])?;
    let expected = single_checksum(&entry);
    check_checksum(expected, src[4])?;

    src.advance(SINGLE_FRAME_LEN);
    Ok(Some(CommandFrame::Single(entry)))
}

fn decode_batch(src: &mut BytesMut) -> Result<Option<CommandFrame>> {
    if src.len() < 3 {
        return Ok(None);
    }
    let count = usize::from(src[2].wrapping_sub(b'0'));
    if !(MIN_BATCH..=MAX_BATCH).contains(&count) {
        return Err(FrameError::BatchSize { count });
    }

    let total = batch_wire_size(count);
    if src.len() < total {
        return Ok(None);
    }
    check_end_marker(src, total)?;

    let entries = src[3..3 + count * 3]
        .chunks_exact(3)
        .map(decode_entry)
        .collect::<Result<Vec<_>>>()?;
    check_checksum(batch_checksum(&entries), src[total - 2])?;

    src.advance(total);
    Ok(Some(CommandFrame::Batch(entries)))
}

fn decode_entry(triplet: &[u8]) -> Result<CommandEntry> {
    Ok(CommandEntry {
        motor: MotorId::from_digit(triplet[0])?,
        directive: MotorDirective::from_digit(triplet[1])?,
        speed: triplet[2],
    })
}

fn check_end_marker(src: &BytesMut, total: usize) -> Result<()> {
    let found = src[total - 1];
    if found != END_MARKER {
        return Err(FrameError::InvalidMarker {
            offset: total - 1,
            found,
        });
    }
    Ok(())
}

fn check_checksum(expected: u8, actual: u8) -> Result<()> {
    if expected != actual {
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// A device reply, trimmed to its ASCII text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
}

impl Reply {
    /// The firmware acknowledges with `OK`; anything carrying an `O` counts.
    ///
    /// This is substring containment, not a prefix match, so `"NO"` is also a
    /// success. Device compatibility tests depend on exactly this rule.
    pub fn is_success(&self) -> bool {
        self.text.contains('O')
    }
}

/// Decode raw reply bytes. Never fails; a reply without the success marker is
/// a normal negative outcome.
pub fn decode_reply(raw: &[u8]) -> Reply {
    Reply {
        text: String::from_utf8_lossy(raw).trim().to_string(),
    }
}

/// Uppercase hex rendering for packet logs, e.g. `3C 31 31 FF CE 3E`.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}
