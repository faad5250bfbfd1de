use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::messages::{encode_media_frame, MediaInbound, MediaOutbound};
use crate::session::{BackendSession, DisconnectReason, Outbox, SessionRole};

/// Pause between captured frames while streaming (about 15 fps).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(66);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingState {
    Idle,
    Streaming,
    Error,
}

impl fmt::Display for StreamingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StreamingState::Idle => "idle",
            StreamingState::Streaming => "streaming",
            StreamingState::Error => "error",
        };
        f.write_str(text)
    }
}

/// Capture collaborator supplying encoded images.
pub trait FrameSource: Send + Sync + 'static {
    /// Called when streaming begins (camera bind).
    fn start(&self) {}

    /// Called when streaming ends (camera unbind).
    fn stop(&self) {}

    /// The latest encoded image, or `None` if nothing is ready.
    fn capture(&self) -> Option<Bytes>;
}

/// A request to stream that arrived before registration.
#[derive(Debug)]
struct StreamIntent;

#[derive(Debug, Default)]
struct StreamControl {
    registered: bool,
    /// Consumed exactly once, by the next `registered`.
    pending: Option<StreamIntent>,
    pump: Option<CancellationToken>,
}

/// Media-channel behavior: registration by rover id and frame pumping.
pub struct MediaRole {
    rover_id: Mutex<Option<String>>,
    control: Mutex<StreamControl>,
    streaming: watch::Sender<StreamingState>,
    source: Arc<dyn FrameSource>,
}

impl MediaRole {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            rover_id: Mutex::new(None),
            control: Mutex::new(StreamControl::default()),
            streaming: watch::Sender::new(StreamingState::Idle),
            source,
        }
    }

    pub fn rover_id(&self) -> Option<String> {
        lock(&self.rover_id).clone()
    }

    pub fn is_registered(&self) -> bool {
        lock(&self.control).registered
    }

    fn set_rover_id(&self, rover_id: String) {
        *lock(&self.rover_id) = Some(rover_id);
    }

    fn set_streaming(&self, next: StreamingState) {
        self.streaming.send_if_modified(|state| {
            let changed = *state != next;
            *state = next;
            changed
        });
    }

    /// Start now if registered, otherwise remember the request.
    fn request_start(&self, outbox: &Outbox) {
        let mut control = lock(&self.control);
        if control.registered && outbox.is_open() {
            self.begin(&mut control, outbox);
        } else {
            debug!(session = Self::NAME, "deferring stream start until registered");
            control.pending = Some(StreamIntent);
        }
    }

    fn request_stop(&self) {
        let mut control = lock(&self.control);
        control.pending = None;
        self.end(&mut control);
        self.set_streaming(StreamingState::Idle);
    }

    fn begin(&self, control: &mut StreamControl, outbox: &Outbox) {
        if control.pump.is_some() {
            return;
        }
        let token = CancellationToken::new();
        control.pump = Some(token.clone());
        self.source.start();
        self.set_streaming(StreamingState::Streaming);
        info!(session = Self::NAME, "streaming started");
        tokio::spawn(pump(Arc::clone(&self.source), outbox.clone(), token));
    }

    /// Stop the pump if running. Returns whether it was.
    fn end(&self, control: &mut StreamControl) -> bool {
        match control.pump.take() {
            Some(token) => {
                token.cancel();
                self.source.stop();
                info!(session = Self::NAME, "streaming stopped");
                true
            }
            None => false,
        }
    }
}

async fn pump(source: Arc<dyn FrameSource>, outbox: Outbox, token: CancellationToken) {
    let mut ticker = time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sent: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if !outbox.is_open() {
                    continue;
                }
                if let Some(image) = source.capture() {
                    if outbox.send_binary(encode_media_frame(&image)) {
                        sent += 1;
                    }
                }
            }
        }
    }
    debug!(session = MediaRole::NAME, frames = sent, "frame pump finished");
}

impl SessionRole for MediaRole {
    const NAME: &'static str = "media";

    fn registration(&self) -> Result<String> {
        let rover_id = self.rover_id().ok_or(SessionError::MissingIdentity)?;
        Ok(serde_json::to_string(&MediaOutbound::Register { rover_id })?)
    }

    fn heartbeat(&self) -> Result<String> {
        Ok(serde_json::to_string(&MediaOutbound::Heartbeat)?)
    }

    fn on_text(&self, text: &str, outbox: &Outbox) {
        let message = match serde_json::from_str::<MediaInbound>(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(session = Self::NAME, error = %err, "dropping malformed message");
                return;
            }
        };

        match message {
            MediaInbound::Registered => {
                info!(session = Self::NAME, "registered");
                let mut control = lock(&self.control);
                control.registered = true;
                if control.pending.take().is_some() {
                    self.begin(&mut control, outbox);
                }
            }
            MediaInbound::HeartbeatAck => debug!(session = Self::NAME, "heartbeat ack"),
            MediaInbound::Error { message } => {
                warn!(
                    session = Self::NAME,
                    error = message.as_deref().unwrap_or(text),
                    "backend error"
                );
                self.set_streaming(StreamingState::Error);
            }
            MediaInbound::StartStream => {
                info!(session = Self::NAME, "backend requested stream start");
                self.request_start(outbox);
            }
            MediaInbound::StopStream => {
                info!(session = Self::NAME, "backend requested stream stop");
                self.request_stop();
            }
            MediaInbound::Unknown => {
                debug!(session = Self::NAME, "ignoring unknown message type");
            }
        }
    }

    fn on_disconnected(&self, reason: DisconnectReason) {
        let mut control = lock(&self.control);
        control.registered = false;
        let was_streaming = self.end(&mut control);
        match reason {
            DisconnectReason::Local => control.pending = None,
            // Resume once the reconnected session registers again.
            DisconnectReason::Remote if was_streaming => control.pending = Some(StreamIntent),
            DisconnectReason::Remote => {}
        }
        self.set_streaming(StreamingState::Idle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The media channel session.
pub type MediaSession = BackendSession<MediaRole>;

impl BackendSession<MediaRole> {
    /// Connect and register with the rover id from the command session.
    pub fn connect_with_identity(&self, url: impl Into<String>, rover_id: impl Into<String>) {
        self.role().set_rover_id(rover_id.into());
        self.connect(url);
    }

    /// Stream now if registered; otherwise as soon as registration completes.
    pub fn start_streaming(&self) {
        self.role().request_start(self.outbox());
    }

    /// Stop streaming and drop any deferred start.
    pub fn stop_streaming(&self) {
        self.role().request_stop();
    }

    pub fn streaming_state(&self) -> StreamingState {
        *self.role().streaming.borrow()
    }

    pub fn subscribe_streaming(&self) -> watch::Receiver<StreamingState> {
        self.role().streaming.subscribe()
    }
}
