use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use roverlink_motor::RoverCommandTranslator;
use roverlink_session::{
    BackendConfig, CommandHandler, CommandRole, CommandSession, FrameSource, MediaRole,
    MediaSession, SessionCoordinator, TelemetryData, WsDialer,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cmd::RunArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_status, OutputFormat};

/// JPEG start-of-image marker.
const JPEG_MAGIC: [u8; 2] = [0xFF, 0xD8];

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let telemetry = args
        .telemetry_interval
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    let source = frame_source(args.still.as_deref())?;
    let backend = args.backend();

    let channel = args.device.open()?;
    let translator = match args.mapping.translator(channel.clone()) {
        Ok(translator) => Arc::new(translator),
        Err(err) => {
            channel.detach();
            return Err(err);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("roverlink")
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    let result = runtime.block_on(serve(backend, translator, source, args.stream, telemetry));
    drop(runtime);

    channel.detach();
    print_status(&channel.device(), &channel.motors(), format);
    result.map(|()| SUCCESS)
}

async fn serve(
    backend: BackendConfig,
    translator: Arc<RoverCommandTranslator>,
    source: Arc<dyn FrameSource>,
    stream: bool,
    telemetry: Option<Duration>,
) -> CliResult<()> {
    let dialer = Arc::new(WsDialer);
    let handler: Arc<dyn CommandHandler> = translator.clone();
    let command = Arc::new(CommandSession::new(
        CommandRole::new(backend.rover_name.clone(), handler),
        dialer.clone(),
    ));
    let media = Arc::new(MediaSession::new(MediaRole::new(source), dialer));

    info!(
        command = %backend.command_url(),
        media = %backend.media_url(),
        rover = %backend.rover_name,
        "starting backend sessions"
    );
    let coordinator = SessionCoordinator::new(Arc::clone(&command), Arc::clone(&media), backend);
    coordinator.connect();
    if stream {
        media.start_streaming();
    }
    let reporter = telemetry.map(|period| {
        tokio::spawn(report_telemetry(
            Arc::clone(&command),
            Arc::clone(&translator),
            period,
        ))
    });

    let signal = tokio::signal::ctrl_c().await;
    info!("shutting down");
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    media.stop_streaming();
    coordinator.disconnect();
    signal.map_err(|err| io_error("signal handler setup failed", err))
}

async fn report_telemetry(
    command: Arc<CommandSession>,
    translator: Arc<RoverCommandTranslator>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if command.identity().is_none() {
            continue;
        }
        let data = TelemetryData::from(translator.drive_summary());
        if let Err(err) = command.send_telemetry(data) {
            debug!(error = %err, "telemetry skipped");
        }
    }
}

/// Serves the same image on every frame tick.
struct StillImage {
    image: Bytes,
}

impl FrameSource for StillImage {
    fn start(&self) {
        info!(bytes = self.image.len(), "streaming still image");
    }

    fn capture(&self) -> Option<Bytes> {
        Some(self.image.clone())
    }
}

/// No camera configured; streams nothing.
struct NoCamera;

impl FrameSource for NoCamera {
    fn start(&self) {
        warn!("stream requested but no image source configured");
    }

    fn capture(&self) -> Option<Bytes> {
        None
    }
}

fn frame_source(still: Option<&Path>) -> CliResult<Arc<dyn FrameSource>> {
    let Some(path) = still else {
        return Ok(Arc::new(NoCamera));
    };
    let image = std::fs::read(path)
        .map_err(|err| io_error(&format!("failed to read {}", path.display()), err))?;
    if !image.starts_with(&JPEG_MAGIC) {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{} is not a JPEG image", path.display()),
        ));
    }
    Ok(Arc::new(StillImage {
        image: Bytes::from(image),
    }))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_file(tag: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "roverlink-run-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::write(&path, contents).expect("temp file should be writable");
        path
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("5s").expect("5s"), Duration::from_secs(5));
        assert_eq!(
            parse_duration("500ms").expect("500ms"),
            Duration::from_millis(500)
        );
        assert_eq!(parse_duration("2").expect("2"), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0ms").expect_err("zero").code, USAGE);
        assert_eq!(parse_duration("soon").expect_err("word").code, USAGE);
        assert_eq!(parse_duration("").expect_err("empty").code, USAGE);
    }

    #[test]
    fn still_image_must_be_jpeg() {
        let jpeg = temp_file("jpeg", &[0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        let source = frame_source(Some(&jpeg)).expect("jpeg accepted");
        assert_eq!(
            source.capture().as_deref(),
            Some(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00][..])
        );

        let png = temp_file("png", b"\x89PNG\r\n");
        let err = frame_source(Some(&png)).err().expect("png rejected");
        assert_eq!(err.code, DATA_INVALID);

        let _ = std::fs::remove_file(jpeg);
        let _ = std::fs::remove_file(png);
    }

    #[test]
    fn no_still_means_no_frames() {
        let source = frame_source(None).expect("no camera");
        assert!(source.capture().is_none());
    }
}
