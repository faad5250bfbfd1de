use bytes::BytesMut;
use roverlink_frame::{encode_command, CommandEntry, CommandFrame};

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = build_frame(args.entries)?;
    let mut wire = BytesMut::with_capacity(frame.wire_size());
    encode_command(&frame, &mut wire).map_err(|err| frame_error("encode failed", err))?;
    print_frame(&frame, &wire, format);
    Ok(SUCCESS)
}

fn build_frame(entries: Vec<CommandEntry>) -> CliResult<CommandFrame> {
    if entries.len() == 1 {
        return Ok(CommandFrame::Single(entries[0]));
    }
    CommandFrame::batch(entries).map_err(|err| frame_error("invalid batch", err))
}
