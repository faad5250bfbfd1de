//! Motor command framing for the rover serial protocol.
//!
//! Frames are short, fixed-layout byte strings delimited by `<` and `>`:
//! - single motor: `< id cmd speed chk >` (6 bytes)
//! - batch of 2-4 motors: `< 'D' n (id cmd speed)*n chk >`
//!
//! `id`, `cmd` and `n` travel as ASCII digits, `speed` as a raw PWM byte, and
//! `chk` is the XOR of every byte between the opening marker and itself.
//! Device replies are loose ASCII; any reply containing `O` is a success.

pub mod codec;
pub mod error;
pub mod motor;

pub use codec::{
    batch_checksum, decode_command, decode_reply, encode_batch, encode_command, encode_single,
    hex_dump, single_checksum, CommandEntry, CommandFrame, Reply, BATCH_MARKER, END_MARKER,
    MAX_BATCH, MIN_BATCH, SINGLE_FRAME_LEN, START_MARKER,
};
pub use error::{FrameError, Result};
pub use motor::{MotorDirective, MotorId, MotorStatus};
