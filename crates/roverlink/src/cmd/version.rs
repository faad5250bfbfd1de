use roverlink_frame::{MAX_BATCH, MIN_BATCH};
use roverlink_transport::SerialConfig;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("roverlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: roverlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("ROVERLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: session={}, cli=true",
        cfg!(feature = "session")
    );
    println!("serial_default_baud: {}", SerialConfig::DEFAULT_BAUD_RATE);
    println!("batch_entries: {MIN_BATCH}-{MAX_BATCH}");

    Ok(SUCCESS)
}
